// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 检测结果输出
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

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::report::{Event, RunReport};
use crate::{FromUrl, FromUrlWithScheme};

pub trait Render<Record>: Sized {
  type Error;
  fn render_result(&self, record: &Record) -> Result<(), Self::Error>;
}

mod json_report;
mod jsonl_record;
mod log_output;

pub use self::json_report::{JsonReportOutput, JsonReportOutputError};
pub use self::jsonl_record::{JsonlRecordOutput, JsonlRecordOutputError};
pub use self::log_output::LogOutput;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 报告输出错误: {0}")]
  JsonReportOutputError(#[from] JsonReportOutputError),
  #[error("JSONL 记录输出错误: {0}")]
  JsonlRecordOutputError(#[from] JsonlRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Log(LogOutput),
  JsonReport(JsonReportOutput),
  JsonlRecord(JsonlRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      JsonReportOutput::SCHEME => {
        let output = JsonReportOutput::from_url(url)?;
        Ok(OutputWrapper::JsonReport(output))
      }
      JsonlRecordOutput::SCHEME => {
        let output = JsonlRecordOutput::from_url(url)?;
        Ok(OutputWrapper::JsonlRecord(output))
      }
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Render<Event> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, event: &Event) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_result(event).map_err(|never| match never {}),
      OutputWrapper::JsonReport(_) => Ok(()),
      OutputWrapper::JsonlRecord(output) => output.render_result(event).map_err(OutputError::from),
    }
  }
}

impl Render<RunReport> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, report: &RunReport) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_result(report).map_err(|never| match never {}),
      OutputWrapper::JsonReport(output) => output.render_result(report).map_err(OutputError::from),
      OutputWrapper::JsonlRecord(output) => output.render_result(report).map_err(OutputError::from),
    }
  }
}

/// 同时写往多个输出端
#[derive(Default)]
pub struct Outputs(Vec<OutputWrapper>);

impl Outputs {
  pub fn from_urls<'a>(urls: impl IntoIterator<Item = &'a Url>) -> Result<Self, OutputError> {
    urls
      .into_iter()
      .map(OutputWrapper::from_url)
      .collect::<Result<Vec<_>, _>>()
      .map(Outputs)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl<R> Render<R> for Outputs
where
  OutputWrapper: Render<R, Error = OutputError>,
{
  type Error = OutputError;

  /// 每个输出端都会收到记录；有失败时返回第一个错误
  fn render_result(&self, record: &R) -> Result<(), Self::Error> {
    let mut first_error = None;
    for output in &self.0 {
      if let Err(e) = output.render_result(record) {
        warn!("输出失败: {}", e);
        first_error.get_or_insert(e);
      }
    }
    first_error.map_or(Ok(()), Err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dispatches_on_scheme() {
    let urls: Vec<Url> = vec!["log://".parse().unwrap()];
    assert_eq!(Outputs::from_urls(&urls).unwrap().len(), 1);

    let urls: Vec<Url> = vec!["log://".parse().unwrap(), "rtsp://0.0.0.0:8554/live".parse().unwrap()];
    assert!(matches!(
      Outputs::from_urls(&urls),
      Err(OutputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
