// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use shanan_qc::config::Config;

/// Shanan 质检分析参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 输入来源，可重复，按顺序处理
  /// - image:///path/units.json[?board_area=F]
  /// - video:///path/frames.json[?fps=F&interval_ms=N&board_area=F]
  /// - reset://
  #[arg(long, value_name = "SOURCE", required = true)]
  pub input: Vec<Url>,

  /// 输出，可重复
  /// - log://
  /// - json:///path/report.json
  /// - jsonl:///path/events.jsonl[?always]
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Vec<Url>,

  /// 默认板面积，覆盖配置文件
  #[arg(long, value_name = "AREA")]
  pub board_area: Option<f64>,

  /// 视频默认采样间隔（毫秒），覆盖配置文件
  #[arg(long, value_name = "MS")]
  pub interval_ms: Option<u64>,

  /// 每追加多少个判定重算一次 SPC，覆盖配置文件
  #[arg(long, value_name = "N")]
  pub recompute_every: Option<usize>,

  /// 最多处理的检测单元数
  #[arg(long, value_name = "COUNT")]
  pub max_units: Option<usize>,
}

impl Args {
  /// 命令行参数覆盖配置文件
  pub fn apply(&self, mut config: Config) -> Config {
    if let Some(area) = self.board_area {
      config.board_area = area;
    }
    if let Some(interval_ms) = self.interval_ms {
      config.interval_ms = interval_ms;
    }
    if let Some(every) = self.recompute_every {
      config.recompute_every = every;
    }
    config
  }
}
