// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测模型边界与检测记录
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

use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::frame::RecordedFrame;

/// 外部缺陷检测模型
///
/// 质检核心不关心模型如何推理，只消费其输出的检测记录。
pub trait Model {
  type Input;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<DetectResult, Self::Error>;
}

/// 单个检测记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  /// 缺陷类型标签
  #[serde(rename = "type")]
  pub kind: String,
  /// 置信度 [0, 1]
  pub confidence: f64,
  pub bbox: [f64; 4], // [x1, y1, x2, y2]
  /// 面积，与板面积同一单位
  pub area: f64,
}

impl DetectionRecord {
  /// 由边界框构造，面积取边界框面积
  pub fn from_bbox(kind: impl Into<String>, confidence: f64, bbox: [f64; 4]) -> Self {
    let area = (bbox[2] - bbox[0]).max(0.0) * (bbox[3] - bbox[1]).max(0.0);
    Self {
      kind: kind.into(),
      confidence,
      bbox,
      area,
    }
  }

  pub fn defect_kind(&self) -> DefectKind {
    DefectKind::from_tag(&self.kind)
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectionRecord]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn into_vec(self) -> Vec<DetectionRecord> {
    self.items.into_vec()
  }
}

impl From<Vec<DetectionRecord>> for DetectResult {
  fn from(items: Vec<DetectionRecord>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn from_tag(tag: &str) -> Self;
}

/// PCB 缺陷类别
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DefectKind {
  FalseCopper,
  MissingHole,
  MouseBite,
  OpenCircuit,
  PinHole,
  Scratch,
  ShortCircuit,
  Spur,
  Other(String),
}

impl WithLabel for DefectKind {
  fn to_label_str(&self) -> String {
    match self {
      DefectKind::FalseCopper => "False Copper".to_string(),
      DefectKind::MissingHole => "Missing Hole".to_string(),
      DefectKind::MouseBite => "Mouse Bite".to_string(),
      DefectKind::OpenCircuit => "Open Circuit".to_string(),
      DefectKind::PinHole => "Pin Hole".to_string(),
      DefectKind::Scratch => "Scratch".to_string(),
      DefectKind::ShortCircuit => "Short Circuit".to_string(),
      DefectKind::Spur => "Spur".to_string(),
      DefectKind::Other(tag) => title_case(tag),
    }
  }

  fn from_tag(tag: &str) -> Self {
    // 标签可能带下划线或连字符，如 missing_hole / missing-hole
    let normalized: String = tag
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .map(|c| c.to_ascii_lowercase())
      .collect();
    match normalized.as_str() {
      "falsecopper" => DefectKind::FalseCopper,
      "missinghole" => DefectKind::MissingHole,
      "mousebite" => DefectKind::MouseBite,
      "opencircuit" | "open" => DefectKind::OpenCircuit,
      "pinhole" => DefectKind::PinHole,
      "scratch" => DefectKind::Scratch,
      "shortcircuit" | "short" => DefectKind::ShortCircuit,
      "spur" => DefectKind::Spur,
      _ => DefectKind::Other(tag.to_string()),
    }
  }
}

fn title_case(tag: &str) -> String {
  tag
    .split(['_', '-', ' '])
    .filter(|word| !word.is_empty())
    .map(|word| {
      let mut chars = word.chars();
      match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
      }
    })
    .collect::<Vec<String>>()
    .join(" ")
}

/// 回放模型：直接返回帧中记录的检测结果
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayModel;

impl Model for ReplayModel {
  type Input = RecordedFrame;
  type Error = Infallible;

  fn infer(&self, input: &Self::Input) -> Result<DetectResult, Self::Error> {
    debug!("回放 {} 个检测记录", input.detections.len());
    Ok(DetectResult::from(input.detections.clone()))
  }
}
