// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/json_report.rs - JSON 报告输出
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, output::Render, report::RunReport};

/// `json:///path/report.json`，运行结束时写出完整报告
pub struct JsonReportOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum JsonReportOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonReportOutputError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(JsonReportOutput {
      path: PathBuf::from(uri.path()),
    })
  }
}

impl Render<RunReport> for JsonReportOutput {
  type Error = JsonReportOutputError;

  fn render_result(&self, report: &RunReport) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(&self.path, content)?;
    info!("保存报告到文件: {}", self.path.display());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::aggregator::Counts;
  use crate::spc::SpcReport;

  #[test]
  fn writes_report_creating_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/run/report.json");
    let url: Url = format!("json://{}", path.display()).parse().unwrap();
    let output = JsonReportOutput::from_url(&url).unwrap();

    let report = RunReport::new(3, Counts::default(), SpcReport::empty());
    output.render_result(&report).unwrap();

    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["epoch"], 3);
    assert_eq!(value["failures"], serde_json::json!([]));
  }
}
