// 该文件是 Shanan （山南西风） 项目的一部分。
// src/aggregator.rs - 判定流聚合
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

//! 判定流聚合器
//!
//! 单写多读：[`StreamWriter`] 不可克隆，是唯一的写入路径；
//! [`StreamReader`] 可以任意克隆，读取时拿到的是不可变快照。

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::verdict::{Status, Verdict};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
  #[error("判定序号乱序: 上一个 {last}, 当前 {got}")]
  OutOfOrder { last: u64, got: u64 },
}

/// 运行中的累计计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counts {
  pub pass_count: u64,
  pub questionable_count: u64,
  pub fail_count: u64,
  pub total_count: u64,
}

impl Counts {
  fn record(&mut self, status: Status) {
    match status {
      Status::Pass => self.pass_count += 1,
      Status::Questionable => self.questionable_count += 1,
      Status::Fail => self.fail_count += 1,
    }
    self.total_count += 1;
  }

  /// 合格率 pass / total，尚无数据时为 None
  pub fn quality_efficiency(&self) -> Option<f64> {
    (self.total_count > 0).then(|| self.pass_count as f64 / self.total_count as f64)
  }

  /// 累计缺陷率（百分比）
  pub fn defect_rate(&self) -> Option<f64> {
    (self.total_count > 0).then(|| self.fail_count as f64 / self.total_count as f64 * 100.0)
  }
}

#[derive(Debug, Default)]
struct RunState {
  epoch: u64,
  history: Arc<Vec<Verdict>>,
  counts: Counts,
}

/// 某一时刻的历史快照
#[derive(Debug, Clone)]
pub struct Snapshot {
  pub epoch: u64,
  pub counts: Counts,
  history: Arc<Vec<Verdict>>,
}

impl Snapshot {
  pub fn history(&self) -> &[Verdict] {
    &self.history
  }

  pub fn is_empty(&self) -> bool {
    self.history.is_empty()
  }

  pub fn len(&self) -> usize {
    self.history.len()
  }
}

/// 创建一条判定流，返回唯一写端与读端
pub fn verdict_stream() -> (StreamWriter, StreamReader) {
  let shared = Arc::new(RwLock::new(RunState::default()));
  (
    StreamWriter {
      shared: shared.clone(),
    },
    StreamReader { shared },
  )
}

#[derive(Debug)]
pub struct StreamWriter {
  shared: Arc<RwLock<RunState>>,
}

impl StreamWriter {
  fn state(&self) -> RwLockWriteGuard<'_, RunState> {
    self.shared.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// 追加判定，返回追加后的计数
  pub fn append(&mut self, verdict: Verdict) -> Result<Counts, AppendError> {
    let mut state = self.state();
    if let Some(last) = state.history.last()
      && verdict.sequence_index <= last.sequence_index
    {
      return Err(AppendError::OutOfOrder {
        last: last.sequence_index,
        got: verdict.sequence_index,
      });
    }

    state.counts.record(verdict.status);
    // 仍有快照持有旧历史时才会复制
    Arc::make_mut(&mut state.history).push(verdict);
    debug!("判定流长度: {}", state.history.len());
    Ok(state.counts)
  }

  /// 清空本次运行，返回新的运行纪元
  pub fn reset(&mut self) -> u64 {
    let mut state = self.state();
    state.epoch += 1;
    state.history = Arc::new(Vec::new());
    state.counts = Counts::default();
    info!("判定流已重置, 纪元 {}", state.epoch);
    state.epoch
  }

  pub fn reader(&self) -> StreamReader {
    StreamReader {
      shared: self.shared.clone(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct StreamReader {
  shared: Arc<RwLock<RunState>>,
}

impl StreamReader {
  fn state(&self) -> RwLockReadGuard<'_, RunState> {
    self.shared.read().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn snapshot(&self) -> Snapshot {
    let state = self.state();
    Snapshot {
      epoch: state.epoch,
      counts: state.counts,
      history: state.history.clone(),
    }
  }

  pub fn counts(&self) -> Counts {
    self.state().counts
  }

  pub fn epoch(&self) -> u64 {
    self.state().epoch
  }

  /// 快照是否仍属于当前运行
  pub fn is_current(&self, epoch: u64) -> bool {
    self.epoch() == epoch
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ensemble::EnsembleClassifier;
  use crate::model::DetectionRecord;

  fn verdict(seq: u64, fail: bool) -> Verdict {
    let classifier = EnsembleClassifier::default();
    let detections = if fail {
      vec![DetectionRecord::from_bbox("spur", 0.9, [0.0, 0.0, 1.0, 1.0])]
    } else {
      Vec::new()
    };
    let classification = classifier.classify(&detections, 1000.0).unwrap();
    Verdict::image(format!("PCB-{:03}", seq), seq, detections, classification)
  }

  #[test]
  fn counts_track_appends() {
    let (mut writer, reader) = verdict_stream();
    assert_eq!(reader.counts().quality_efficiency(), None);

    for seq in 0..4 {
      writer.append(verdict(seq, seq == 3)).unwrap();
    }
    let counts = reader.counts();
    assert_eq!(counts.total_count, 4);
    assert_eq!(counts.pass_count, 3);
    assert_eq!(counts.fail_count, 1);
    assert_eq!(counts.quality_efficiency(), Some(0.75));
    assert_eq!(counts.defect_rate(), Some(25.0));
  }

  #[test]
  fn out_of_order_is_rejected() {
    let (mut writer, reader) = verdict_stream();
    writer.append(verdict(5, false)).unwrap();
    assert_eq!(
      writer.append(verdict(5, false)),
      Err(AppendError::OutOfOrder { last: 5, got: 5 })
    );
    assert_eq!(
      writer.append(verdict(2, false)),
      Err(AppendError::OutOfOrder { last: 5, got: 2 })
    );
    assert_eq!(reader.snapshot().len(), 1);
  }

  #[test]
  fn snapshots_are_immutable() {
    let (mut writer, reader) = verdict_stream();
    writer.append(verdict(0, false)).unwrap();
    let before = reader.snapshot();
    writer.append(verdict(1, true)).unwrap();
    let after = reader.snapshot();

    assert_eq!(before.len(), 1);
    assert_eq!(before.counts.total_count, 1);
    assert_eq!(after.len(), 2);
    assert_eq!(after.history()[1].sequence_index, 1);
  }

  #[test]
  fn reset_clears_history_and_advances_epoch() {
    let (mut writer, reader) = verdict_stream();
    writer.append(verdict(0, true)).unwrap();
    let stale = reader.snapshot();

    let epoch = writer.reset();
    assert_eq!(epoch, 1);
    assert!(reader.snapshot().is_empty());
    assert_eq!(reader.counts(), Counts::default());
    assert!(!reader.is_current(stale.epoch));
    assert_eq!(stale.len(), 1);

    // 新运行可以重新从 0 编号
    writer.append(verdict(0, false)).unwrap();
    assert!(reader.is_current(reader.snapshot().epoch));
  }

  #[test]
  fn reader_sees_appends_from_another_thread() {
    let (mut writer, reader) = verdict_stream();
    let handle = std::thread::spawn(move || {
      for seq in 0..100 {
        writer.append(verdict(seq, seq % 10 == 9)).unwrap();
      }
    });
    handle.join().unwrap();
    let snapshot = reader.snapshot();
    assert_eq!(snapshot.len(), 100);
    assert_eq!(snapshot.counts.fail_count, 10);
  }
}
