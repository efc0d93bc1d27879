// 该文件是 Shanan （山南西风） 项目的一部分。
// src/verdict.rs - 检测单元判定结果
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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ensemble::{Assessment, Classification};
use crate::model::DetectionRecord;

/// 判定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
  Pass,
  Questionable,
  Fail,
}

impl Status {
  pub fn as_str(&self) -> &'static str {
    match self {
      Status::Pass => "PASS",
      Status::Questionable => "QUESTIONABLE",
      Status::Fail => "FAIL",
    }
  }
}

impl std::fmt::Display for Status {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 视频汇总指标
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetrics {
  pub total_defects: usize,
  /// 有缺陷的采样帧占比
  pub defect_density: f64,
  pub processed_frames: usize,
  pub frames_with_defects: usize,
  pub frame_interval: u64,
  pub fps: f64,
  /// 最后一个采样帧的时间戳
  pub sampled_seconds: f64,
}

/// 判定的具体形态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VerdictKind {
  Image {
    #[serde(flatten)]
    assessment: Assessment,
  },
  #[serde(rename_all = "camelCase")]
  Frame {
    frame_number: u64,
    timestamp_seconds: f64,
    #[serde(flatten)]
    assessment: Assessment,
  },
  VideoSummary { metrics: VideoMetrics },
}

/// 单个检测单元的判定，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
  pub unit_id: String,
  pub sequence_index: u64,
  pub status: Status,
  pub ensemble_score: f64,
  pub detections: Vec<DetectionRecord>,
  pub area_coverage_ratio: f64,
  pub created_at: DateTime<Utc>,
  #[serde(flatten)]
  pub kind: VerdictKind,
}

impl Verdict {
  pub fn image(
    unit_id: impl Into<String>,
    sequence_index: u64,
    detections: Vec<DetectionRecord>,
    classification: Classification,
  ) -> Self {
    Self {
      unit_id: unit_id.into(),
      sequence_index,
      status: classification.status,
      ensemble_score: classification.score,
      detections,
      area_coverage_ratio: classification.area_coverage_ratio,
      created_at: Utc::now(),
      kind: VerdictKind::Image {
        assessment: classification.assessment,
      },
    }
  }

  pub fn frame(
    unit_id: impl Into<String>,
    sequence_index: u64,
    frame_number: u64,
    timestamp_seconds: f64,
    detections: Vec<DetectionRecord>,
    classification: Classification,
  ) -> Self {
    Self {
      unit_id: unit_id.into(),
      sequence_index,
      status: classification.status,
      ensemble_score: classification.score,
      detections,
      area_coverage_ratio: classification.area_coverage_ratio,
      created_at: Utc::now(),
      kind: VerdictKind::Frame {
        frame_number,
        timestamp_seconds,
        assessment: classification.assessment,
      },
    }
  }

  pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
    self.created_at = created_at;
    self
  }

  pub fn is_fail(&self) -> bool {
    self.status == Status::Fail
  }

  pub fn assessment(&self) -> Option<&Assessment> {
    match &self.kind {
      VerdictKind::Image { assessment } | VerdictKind::Frame { assessment, .. } => Some(assessment),
      VerdictKind::VideoSummary { .. } => None,
    }
  }

  pub fn frame_number(&self) -> Option<u64> {
    match &self.kind {
      VerdictKind::Frame { frame_number, .. } => Some(*frame_number),
      _ => None,
    }
  }
}

/// 运行内的序号分配器，由唯一的写入方持有
#[derive(Debug, Default)]
pub struct Sequencer {
  next: u64,
  units: u64,
}

impl Sequencer {
  pub fn next_index(&mut self) -> u64 {
    let index = self.next;
    self.next += 1;
    index
  }

  /// 未提供编号时的单元编号，格式 PCB-001
  pub fn next_unit_id(&mut self) -> String {
    self.units += 1;
    format!("PCB-{:03}", self.units)
  }

  pub fn reset(&mut self) {
    self.next = 0;
    self.units = 0;
  }
}
