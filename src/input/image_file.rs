// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_file.rs - 图像检测记录输入
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

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::DetectionRecord};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("查询参数 {key} 无效: {value}")]
  InvalidQuery { key: &'static str, value: String },
}

/// 单张板卡图像的检测记录
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUnit {
  #[serde(default)]
  pub unit_id: Option<String>,
  #[serde(default)]
  pub board_area: Option<f64>,
  #[serde(default)]
  pub detections: Vec<DetectionRecord>,
}

/// `image:///path/units.json[?board_area=F]`
///
/// 文件内容为 [`ImageUnit`] 数组，按顺序逐个产出。
#[derive(Debug)]
pub struct ImageFileInput {
  units: std::vec::IntoIter<ImageUnit>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let query: HashMap<_, _> = url.query_pairs().collect();
    let board_area = query
      .get("board_area")
      .map(|v| {
        v.parse::<f64>().map_err(|_| ImageFileInputError::InvalidQuery {
          key: "board_area",
          value: v.to_string(),
        })
      })
      .transpose()?;

    let content = std::fs::read_to_string(url.path())?;
    let mut units: Vec<ImageUnit> = serde_json::from_str(&content)?;
    if let Some(area) = board_area {
      for unit in units.iter_mut().filter(|u| u.board_area.is_none()) {
        unit.board_area = Some(area);
      }
    }
    debug!("读取图像记录 {}: {} 个单元", url.path(), units.len());

    Ok(Self {
      units: units.into_iter(),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = ImageUnit;

  fn next(&mut self) -> Option<Self::Item> {
    self.units.next()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn url_for(file: &tempfile::NamedTempFile, query: &str) -> Url {
    format!("image://{}?{}", file.path().display(), query)
      .parse()
      .unwrap()
  }

  #[test]
  fn reads_units_in_order() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"[
        {{ "unitId": "A", "boardArea": 50, "detections": [
          {{ "type": "spur", "confidence": 0.9, "bbox": [0, 0, 2, 2], "area": 4 }}
        ] }},
        {{ "detections": [] }}
      ]"#
    )
    .unwrap();

    let units: Vec<_> = ImageFileInput::from_url(&url_for(&file, "board_area=200"))
      .unwrap()
      .collect();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].unit_id.as_deref(), Some("A"));
    // 文件中的板面积优先于查询参数
    assert_eq!(units[0].board_area, Some(50.0));
    assert_eq!(units[0].detections[0].kind, "spur");
    assert_eq!(units[1].unit_id, None);
    assert_eq!(units[1].board_area, Some(200.0));
  }

  #[test]
  fn rejects_bad_input() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ not json").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url_for(&file, "")),
      Err(ImageFileInputError::JsonError(_))
    ));
    assert!(matches!(
      ImageFileInput::from_url(&url_for(&file, "board_area=wide")),
      Err(ImageFileInputError::InvalidQuery { .. })
    ));
    assert!(matches!(
      ImageFileInput::from_url(&"video:///tmp/x.json".parse().unwrap()),
      Err(ImageFileInputError::SchemeMismatch(_))
    ));
    assert!(matches!(
      ImageFileInput::from_url(&"image:///nonexistent/units.json".parse().unwrap()),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
