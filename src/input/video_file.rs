// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/video_file.rs - 视频逐帧检测记录输入
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
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RecordedFrame};

/// 文件与查询参数都未给出帧率时使用
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Error, Debug)]
pub enum VideoFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("查询参数 {key} 无效: {value}")]
  InvalidQuery { key: &'static str, value: String },
}

/// 一段视频的逐帧检测记录，帧按解码顺序排列
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUnit {
  #[serde(default)]
  pub unit_id: Option<String>,
  #[serde(default)]
  pub fps: Option<f64>,
  #[serde(default)]
  pub interval_ms: Option<u64>,
  #[serde(default)]
  pub board_area: Option<f64>,
  #[serde(default)]
  pub frames: Vec<RecordedFrame>,
}

impl VideoUnit {
  pub fn fps(&self) -> f64 {
    self.fps.unwrap_or(DEFAULT_FPS)
  }
}

/// `video:///path/frames.json[?fps=F&interval_ms=N&board_area=F]`
///
/// 查询参数覆盖文件中的同名字段。
#[derive(Debug)]
pub struct VideoFileInput {
  unit: Option<VideoUnit>,
}

impl FromUrlWithScheme for VideoFileInput {
  const SCHEME: &'static str = "video";
}

fn parse_query<T: FromStr>(
  query: &HashMap<String, String>,
  key: &'static str,
) -> Result<Option<T>, VideoFileInputError> {
  query
    .get(key)
    .map(|v| {
      v.parse::<T>().map_err(|_| VideoFileInputError::InvalidQuery {
        key,
        value: v.clone(),
      })
    })
    .transpose()
}

impl FromUrl for VideoFileInput {
  type Error = VideoFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(VideoFileInputError::SchemeMismatch(url.scheme().to_string()));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (k.into_owned(), v.into_owned()))
      .collect();
    let fps = parse_query::<f64>(&query, "fps")?;
    let interval_ms = parse_query::<u64>(&query, "interval_ms")?;
    let board_area = parse_query::<f64>(&query, "board_area")?;

    let content = std::fs::read_to_string(url.path())?;
    let mut unit: VideoUnit = serde_json::from_str(&content)?;
    unit.fps = fps.or(unit.fps);
    unit.interval_ms = interval_ms.or(unit.interval_ms);
    unit.board_area = board_area.or(unit.board_area);

    debug!(
      "读取视频记录 {}: {} 帧, 帧率 {:.2}",
      url.path(),
      unit.frames.len(),
      unit.fps()
    );

    Ok(Self { unit: Some(unit) })
  }
}

impl Iterator for VideoFileInput {
  type Item = VideoUnit;

  fn next(&mut self) -> Option<Self::Item> {
    self.unit.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn url_for(file: &tempfile::NamedTempFile, query: &str) -> Url {
    format!("video://{}?{}", file.path().display(), query)
      .parse()
      .unwrap()
  }

  fn write_video(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
  }

  #[test]
  fn query_overrides_file_values() {
    let file = write_video(
      r#"{ "unitId": "VID-7", "fps": 25, "boardArea": 10,
           "frames": [ {}, { "detections": [] } ] }"#,
    );
    let unit = VideoFileInput::from_url(&url_for(&file, "fps=10&interval_ms=500"))
      .unwrap()
      .next()
      .unwrap();
    assert_eq!(unit.unit_id.as_deref(), Some("VID-7"));
    assert_eq!(unit.fps(), 10.0);
    assert_eq!(unit.interval_ms, Some(500));
    assert_eq!(unit.board_area, Some(10.0));
    assert_eq!(unit.frames.len(), 2);
  }

  #[test]
  fn yields_one_unit() {
    let file = write_video(r#"{ "frames": [] }"#);
    let mut input = VideoFileInput::from_url(&url_for(&file, "")).unwrap();
    let unit = input.next().unwrap();
    assert_eq!(unit.fps(), DEFAULT_FPS);
    assert!(unit.frames.is_empty());
    assert!(input.next().is_none());
  }

  #[test]
  fn invalid_query_value() {
    let file = write_video(r#"{ "frames": [] }"#);
    assert!(matches!(
      VideoFileInput::from_url(&url_for(&file, "interval_ms=-5")),
      Err(VideoFileInputError::InvalidQuery {
        key: "interval_ms",
        ..
      })
    ));
  }
}
