// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/jsonl_record.rs - JSONL 事件记录
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

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  report::{Event, RunReport},
  verdict::Status,
};

#[derive(Error, Debug)]
pub enum JsonlRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// `jsonl:///path/events.jsonl[?always]`
///
/// 每个事件一行，追加写入。默认跳过合格判定，带 `always` 时全部记录。
pub struct JsonlRecordOutput {
  path: PathBuf,
  writer: Mutex<BufWriter<File>>,
  always: bool,
}

impl FromUrlWithScheme for JsonlRecordOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonlRecordOutput {
  type Error = JsonlRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonlRecordOutputError::SchemeMismatch);
    }

    let path = PathBuf::from(uri.path());
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(JsonlRecordOutput {
      path,
      writer: Mutex::new(BufWriter::new(file)),
      always,
    })
  }
}

impl JsonlRecordOutput {
  fn keep(&self, event: &Event) -> bool {
    match event {
      Event::Verdict { verdict, .. } => self.always || verdict.status != Status::Pass,
      _ => true,
    }
  }
}

impl Render<Event> for JsonlRecordOutput {
  type Error = JsonlRecordOutputError;

  fn render_result(&self, event: &Event) -> Result<(), Self::Error> {
    if !self.keep(event) {
      return Ok(());
    }

    let line = serde_json::to_string(event)?;
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(writer, "{}", line)?;
    writer.flush()?;
    Ok(())
  }
}

impl Render<RunReport> for JsonlRecordOutput {
  type Error = JsonlRecordOutputError;

  fn render_result(&self, _report: &RunReport) -> Result<(), Self::Error> {
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    writer.flush()?;
    debug!("事件记录已写入: {}", self.path.display());
    Ok(())
  }
}
