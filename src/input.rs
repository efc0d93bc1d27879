// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 检测单元输入
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

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

mod image_file;
mod video_file;

pub use self::image_file::{ImageFileInput, ImageFileInputError, ImageUnit};
pub use self::video_file::{DEFAULT_FPS, VideoFileInput, VideoFileInputError, VideoUnit};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像记录输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("视频记录输入错误: {0}")]
  VideoFileInputError(#[from] VideoFileInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 某个输入无法打开
#[derive(Error, Debug)]
#[error("无法打开输入 {url}: {source}")]
pub struct OpenError {
  pub url: Url,
  #[source]
  pub source: InputError,
}

/// 一个待检测单元
#[derive(Debug, Clone, PartialEq)]
pub enum InspectionUnit {
  Image(ImageUnit),
  Video(VideoUnit),
}

impl InspectionUnit {
  pub fn unit_id(&self) -> Option<&str> {
    match self {
      InspectionUnit::Image(unit) => unit.unit_id.as_deref(),
      InspectionUnit::Video(unit) => unit.unit_id.as_deref(),
    }
  }

  pub fn board_area(&self) -> Option<f64> {
    match self {
      InspectionUnit::Image(unit) => unit.board_area,
      InspectionUnit::Video(unit) => unit.board_area,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputItem {
  Unit(InspectionUnit),
  /// 操作员重置，清空本次运行
  Reset,
}

/// `reset://`
#[derive(Debug, Default)]
pub struct ResetMarker {
  fired: bool,
}

impl FromUrlWithScheme for ResetMarker {
  const SCHEME: &'static str = "reset";
}

impl FromUrl for ResetMarker {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::default())
  }
}

impl Iterator for ResetMarker {
  type Item = InputItem;

  fn next(&mut self) -> Option<Self::Item> {
    if self.fired {
      return None;
    }
    self.fired = true;
    Some(InputItem::Reset)
  }
}

pub enum InputWrapper {
  ImageFile(ImageFileInput),
  VideoFile(VideoFileInput),
  Reset(ResetMarker),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      scheme if scheme == ImageFileInput::SCHEME => {
        Ok(InputWrapper::ImageFile(ImageFileInput::from_url(url)?))
      }
      scheme if scheme == VideoFileInput::SCHEME => {
        Ok(InputWrapper::VideoFile(VideoFileInput::from_url(url)?))
      }
      scheme if scheme == ResetMarker::SCHEME => Ok(InputWrapper::Reset(ResetMarker::from_url(url)?)),
      scheme => Err(InputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = InputItem;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ImageFile(input) => input
        .next()
        .map(|unit| InputItem::Unit(InspectionUnit::Image(unit))),
      InputWrapper::VideoFile(input) => input
        .next()
        .map(|unit| InputItem::Unit(InspectionUnit::Video(unit))),
      InputWrapper::Reset(marker) => marker.next(),
    }
  }
}

/// 按顺序打开的输入队列
///
/// 输入在轮到它时才打开；打开失败只影响该输入，队列继续向后推进。
pub struct InputQueue {
  pending: VecDeque<Url>,
  current: Option<InputWrapper>,
}

impl InputQueue {
  pub fn new(urls: impl IntoIterator<Item = Url>) -> Self {
    Self {
      pending: urls.into_iter().collect(),
      current: None,
    }
  }
}

impl Iterator for InputQueue {
  type Item = Result<InputItem, OpenError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some(input) = self.current.as_mut() {
        if let Some(item) = input.next() {
          return Some(Ok(item));
        }
        self.current = None;
      }

      let url = self.pending.pop_front()?;
      match InputWrapper::from_url(&url) {
        Ok(input) => {
          info!("打开输入: {}", url);
          self.current = Some(input);
        }
        Err(source) => {
          warn!("无法打开输入 {}: {}", url, source);
          return Some(Err(OpenError { url, source }));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn temp_json(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
  }

  #[test]
  fn dispatches_on_scheme() {
    assert!(matches!(
      InputWrapper::from_url(&"reset://".parse().unwrap()),
      Ok(InputWrapper::Reset(_))
    ));
    assert!(matches!(
      InputWrapper::from_url(&"rtsp://camera/1".parse().unwrap()),
      Err(InputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }

  #[test]
  fn queue_continues_past_broken_input() {
    let images = temp_json(r#"[ { "unitId": "A" }, { "unitId": "B" } ]"#);
    let video = temp_json(r#"{ "unitId": "V", "frames": [ {} ] }"#);
    let urls: Vec<Url> = vec![
      format!("image://{}", images.path().display()).parse().unwrap(),
      "image:///nonexistent/units.json".parse().unwrap(),
      "reset://".parse().unwrap(),
      format!("video://{}", video.path().display()).parse().unwrap(),
    ];

    let mut ids = Vec::new();
    let mut failures = Vec::new();
    let mut resets = 0;
    for item in InputQueue::new(urls) {
      match item {
        Ok(InputItem::Unit(unit)) => ids.push(unit.unit_id().unwrap_or_default().to_string()),
        Ok(InputItem::Reset) => resets += 1,
        Err(e) => failures.push(e.url.path().to_string()),
      }
    }
    assert_eq!(ids, vec!["A", "B", "V"]);
    assert_eq!(failures, vec!["/nonexistent/units.json"]);
    assert_eq!(resets, 1);
  }
}
