// 该文件是 Shanan （山南西风） 项目的一部分。
// src/sampling.rs - 视频定间隔采样
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  ensemble::{ClassifyError, EnsembleClassifier},
  frame::frame_timestamp_seconds,
  model::Model,
  verdict::{Sequencer, Status, Verdict, VerdictKind, VideoMetrics},
};

#[derive(Error, Debug)]
pub enum SampleError {
  #[error("采样配置无效: {0}")]
  InvalidConfiguration(String),
  #[error("视频流在采样到任何帧之前结束")]
  NoFramesSampled,
  #[error("第 {frame_number} 帧推理失败: {source}")]
  Model {
    frame_number: u64,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("第 {frame_number} 帧分类失败: {source}")]
  Classify {
    frame_number: u64,
    #[source]
    source: ClassifyError,
  },
}

/// 一段视频的采样结果
#[derive(Debug, Clone)]
pub struct VideoInspection {
  pub summary: Verdict,
  pub frames: Vec<Verdict>,
}

/// 定间隔采样器
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
  interval_ms: u64,
  fps: f64,
  frame_interval: u64,
}

impl Sampler {
  pub fn new(interval_ms: u64, fps: f64) -> Result<Self, SampleError> {
    if !(fps.is_finite() && fps > 0.0) {
      return Err(SampleError::InvalidConfiguration(format!("帧率必须为正数, 实际为 {}", fps)));
    }
    if interval_ms == 0 {
      return Err(SampleError::InvalidConfiguration("采样间隔不能为 0".to_string()));
    }

    // 采样间隔短于一帧时退化为逐帧采样
    let frame_interval = ((fps * interval_ms as f64 / 1000.0).round() as u64).max(1);
    debug!(
      "采样参数: 帧率 {:.2}, 间隔 {}ms, 每 {} 帧采样一次",
      fps, interval_ms, frame_interval
    );

    Ok(Self {
      interval_ms,
      fps,
      frame_interval,
    })
  }

  pub fn frame_interval(&self) -> u64 {
    self.frame_interval
  }

  pub fn interval_ms(&self) -> u64 {
    self.interval_ms
  }

  pub fn fps(&self) -> f64 {
    self.fps
  }

  /// 对帧序列按间隔采样并逐帧分类，最后合成视频汇总判定
  ///
  /// 未被采样的帧不会送入模型。
  pub fn sample<I, M>(
    &self,
    unit_id: &str,
    frames: I,
    model: &M,
    classifier: &EnsembleClassifier,
    board_area: f64,
    sequencer: &mut Sequencer,
  ) -> Result<VideoInspection, SampleError>
  where
    I: IntoIterator<Item = M::Input>,
    M: Model,
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let mut verdicts = Vec::new();

    for (frame_number, frame) in frames
      .into_iter()
      .enumerate()
      .step_by(self.frame_interval as usize)
    {
      let frame_number = frame_number as u64;
      let detections = model
        .infer(&frame)
        .map_err(|e| SampleError::Model {
          frame_number,
          source: Box::new(e),
        })?
        .into_vec();
      let classification = classifier
        .classify(&detections, board_area)
        .map_err(|source| SampleError::Classify {
          frame_number,
          source,
        })?;

      let timestamp_seconds = frame_timestamp_seconds(frame_number, self.fps);
      debug!(
        "{} 第 {} 帧 ({:.2}s): {} 个检测, 判定 {}",
        unit_id,
        frame_number,
        timestamp_seconds,
        detections.len(),
        classification.status
      );
      verdicts.push(Verdict::frame(
        unit_id,
        sequencer.next_index(),
        frame_number,
        timestamp_seconds,
        detections,
        classification,
      ));
    }

    if verdicts.is_empty() {
      return Err(SampleError::NoFramesSampled);
    }

    let summary = self.summarize(unit_id, &verdicts, sequencer.next_index());
    info!(
      "{} 采样完成: {} 帧, 判定 {}",
      unit_id,
      verdicts.len(),
      summary.status
    );

    Ok(VideoInspection {
      summary,
      frames: verdicts,
    })
  }

  fn summarize(&self, unit_id: &str, frames: &[Verdict], sequence_index: u64) -> Verdict {
    let status = if frames.iter().any(|v| v.status == Status::Fail) {
      Status::Fail
    } else if frames.iter().any(|v| v.status == Status::Questionable) {
      Status::Questionable
    } else {
      Status::Pass
    };

    let processed_frames = frames.len();
    let frames_with_defects = frames.iter().filter(|v| !v.detections.is_empty()).count();
    let total_defects = frames.iter().map(|v| v.detections.len()).sum();
    let ensemble_score = frames.iter().map(|v| v.ensemble_score).fold(0.0, f64::max);
    let area_coverage_ratio = frames
      .iter()
      .map(|v| v.area_coverage_ratio)
      .fold(0.0, f64::max);
    let sampled_seconds = frames
      .last()
      .and_then(Verdict::frame_number)
      .map_or(0.0, |n| frame_timestamp_seconds(n, self.fps));

    Verdict {
      unit_id: unit_id.to_string(),
      sequence_index,
      status,
      ensemble_score,
      detections: Vec::new(),
      area_coverage_ratio,
      created_at: Utc::now(),
      kind: VerdictKind::VideoSummary {
        metrics: VideoMetrics {
          total_defects,
          defect_density: frames_with_defects as f64 / processed_frames as f64,
          processed_frames,
          frames_with_defects,
          frame_interval: self.frame_interval,
          fps: self.fps,
          sampled_seconds,
        },
      },
    }
  }
}
