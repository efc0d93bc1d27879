// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 质检分析主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shanan_qc::{
  config::Config,
  input::InputQueue,
  model::ReplayModel,
  output::Outputs,
  task::{InspectionTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  let config = match &args.config {
    Some(path) => Config::from_path(path)
      .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
    None => Config::default(),
  };
  let config = args.apply(config);

  for input in &args.input {
    info!("输入来源: {}", input);
  }
  for output in &args.output {
    info!("输出路径: {}", output);
  }

  let outputs = Outputs::from_urls(&args.output)?;
  let report = InspectionTask::new(config)
    .with_max_units(args.max_units)
    .with_interrupt(true)
    .run_task(InputQueue::new(args.input), ReplayModel, outputs)?;

  info!(
    "共处理 {} 个判定, {} 个失败单元",
    report.counts.total_count,
    report.failures.len()
  );

  Ok(())
}
