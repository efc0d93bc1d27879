// 该文件是 Shanan （山南西风） 项目的一部分。
// src/report.rs - 运行事件与最终报告
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

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregator::Counts;
use crate::spc::SpcReport;
use crate::verdict::Verdict;

/// 交给输出端的运行事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
  Verdict {
    verdict: Verdict,
    counts: Counts,
  },
  VideoSummary {
    verdict: Verdict,
  },
  Spc {
    epoch: u64,
    report: SpcReport,
  },
  #[serde(rename_all = "camelCase")]
  Failure {
    unit_id: String,
    reason: String,
  },
  Reset {
    epoch: u64,
  },
}

/// 运行结束时的汇总报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
  pub generated_at: DateTime<Utc>,
  pub epoch: u64,
  pub counts: Counts,
  pub quality_efficiency: Option<f64>,
  /// 累计缺陷率（百分比）
  pub defect_rate: Option<f64>,
  pub spc: SpcReport,
  pub video_summaries: Vec<Verdict>,
  pub failures: Vec<Failure>,
  /// 是否因中断提前结束
  pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
  pub unit_id: String,
  pub reason: String,
}

impl RunReport {
  pub fn new(epoch: u64, counts: Counts, spc: SpcReport) -> Self {
    Self {
      generated_at: Utc::now(),
      epoch,
      counts,
      quality_efficiency: counts.quality_efficiency(),
      defect_rate: counts.defect_rate(),
      spc,
      video_summaries: Vec::new(),
      failures: Vec::new(),
      interrupted: false,
    }
  }
}
