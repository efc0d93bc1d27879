// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 记录帧定义
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

use serde::{Deserialize, Serialize};

use crate::model::DetectionRecord;

/// 已记录检测结果的帧
///
/// 静态图片视为只有一帧的输入。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
  #[serde(default)]
  pub detections: Vec<DetectionRecord>,
}

impl From<Vec<DetectionRecord>> for RecordedFrame {
  fn from(detections: Vec<DetectionRecord>) -> Self {
    Self { detections }
  }
}

/// 帧号对应的时间戳（秒）
pub fn frame_timestamp_seconds(frame_number: u64, fps: f64) -> f64 {
  frame_number as f64 / fps
}
