// 该文件是 Shanan （山南西风） 项目的一部分。
// src/spc.rs - 统计过程控制
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

//! 统计过程控制（SPC）
//!
//! 每次都对完整历史重新计算，不做增量更新。控制图是缺陷率的 p 图：
//! 中心线取整段运行的总体缺陷率，标准误使用二项近似。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::verdict::Verdict;

/// 目标批次数
pub const BATCH_COUNT: usize = 10;
pub const CONTROL_SIGMA: f64 = 3.0;
pub const WARNING_SIGMA: f64 = 2.0;
/// 连续同侧的批次数，达到即视为趋势
pub const TREND_RUN: usize = 7;

const PERCENT: f64 = 100.0;

/// 过程能力参数（百分点）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpcConfig {
  pub tolerance: f64,
  pub target: f64,
}

impl Default for SpcConfig {
  fn default() -> Self {
    Self {
      tolerance: 5.0,
      target: 0.0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlLimits {
  pub center_line: f64,
  pub upper_control_limit: f64,
  pub lower_control_limit: f64,
  pub upper_warning_limit: f64,
  pub lower_warning_limit: f64,
}

impl ControlLimits {
  /// 以中心线（百分比）和样本量计算二项近似的控制限与警戒限，结果截断到 [0, 100]
  pub fn binomial(center_line: f64, sample_size: usize) -> Self {
    let p = center_line / PERCENT;
    let standard_error = (p * (1.0 - p)).max(0.0) / sample_size.max(1) as f64;
    let standard_error = standard_error.sqrt() * PERCENT;

    let upper = |k: f64| (center_line + k * standard_error).min(PERCENT);
    let lower = |k: f64| (center_line - k * standard_error).max(0.0);

    Self {
      center_line,
      upper_control_limit: upper(CONTROL_SIGMA),
      lower_control_limit: lower(CONTROL_SIGMA),
      upper_warning_limit: upper(WARNING_SIGMA),
      lower_warning_limit: lower(WARNING_SIGMA),
    }
  }

  pub fn is_out_of_control(&self, rate: f64) -> bool {
    rate > self.upper_control_limit || rate < self.lower_control_limit
  }

  pub fn is_in_warning_zone(&self, rate: f64) -> bool {
    !self.is_out_of_control(rate)
      && (rate > self.upper_warning_limit || rate < self.lower_warning_limit)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
  Stable,
  Increasing,
  Decreasing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpcBatch {
  pub batch_index: usize,
  pub sample_size: usize,
  pub defect_count: usize,
  pub defect_rate: f64,
  /// 批次最后一个判定的时间
  pub timestamp: DateTime<Utc>,
  pub first_sequence: u64,
  pub last_sequence: u64,
  /// 按本批次样本量计算的控制限
  pub limits: ControlLimits,
  pub out_of_control: bool,
  pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
  pub severity: Severity,
  pub batch_index: usize,
  pub message: String,
  pub observed_rate: f64,
  pub limit: f64,
  pub timestamp: DateTime<Utc>,
}

/// 一次重算的完整结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpcReport {
  pub total_count: usize,
  pub batch_size: usize,
  pub overall_rate: f64,
  /// 按名义批次大小计算的整段运行控制限，无数据时为空
  pub limits: Option<ControlLimits>,
  pub batches: Vec<SpcBatch>,
  pub alerts: Vec<Alert>,
  /// 总体缺陷率为 0% 或 100% 时无定义
  pub cpk: Option<f64>,
}

impl SpcReport {
  pub fn empty() -> Self {
    Self {
      total_count: 0,
      batch_size: 0,
      overall_rate: 0.0,
      limits: None,
      batches: Vec::new(),
      alerts: Vec::new(),
      cpk: None,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.total_count == 0
  }

  pub fn out_of_control(&self) -> impl Iterator<Item = &SpcBatch> {
    self.batches.iter().filter(|b| b.out_of_control)
  }
}

#[derive(Debug, Clone, Default)]
pub struct SpcEngine {
  config: SpcConfig,
}

impl SpcEngine {
  pub fn new(config: SpcConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &SpcConfig {
    &self.config
  }

  /// 对完整历史重新计算批次、控制限与告警
  ///
  /// 纯函数：相同的历史总是得到相同的结果。
  pub fn recompute(&self, history: &[Verdict]) -> SpcReport {
    if history.is_empty() {
      return SpcReport::empty();
    }

    let total_count = history.len();
    let batch_size = batch_size(total_count);
    let total_fails = history.iter().filter(|v| v.is_fail()).count();
    let overall_rate = rate(total_fails, total_count);

    let mut batches: Vec<SpcBatch> = history
      .chunks(batch_size)
      .enumerate()
      .filter_map(|(batch_index, chunk)| {
        let first = chunk.first()?;
        let last = chunk.last()?;
        let defect_count = chunk.iter().filter(|v| v.is_fail()).count();
        let defect_rate = rate(defect_count, chunk.len());
        let limits = ControlLimits::binomial(overall_rate, chunk.len());
        Some(SpcBatch {
          batch_index,
          sample_size: chunk.len(),
          defect_count,
          defect_rate,
          timestamp: last.created_at,
          first_sequence: first.sequence_index,
          last_sequence: last.sequence_index,
          out_of_control: limits.is_out_of_control(defect_rate),
          limits,
          trend: Trend::Stable,
        })
      })
      .collect();

    let trends: Vec<Trend> = (0..batches.len())
      .map(|idx| trend_at(&batches, idx, overall_rate))
      .collect();
    for (batch, trend) in batches.iter_mut().zip(trends) {
      batch.trend = trend;
    }

    let alerts = batches
      .iter()
      .filter(|b| b.defect_rate > b.limits.upper_control_limit)
      .map(|b| Alert {
        severity: Severity::Critical,
        batch_index: b.batch_index,
        message: format!(
          "批次 {} 缺陷率 {:.2}% 超出控制上限 {:.2}%",
          b.batch_index, b.defect_rate, b.limits.upper_control_limit
        ),
        observed_rate: b.defect_rate,
        limit: b.limits.upper_control_limit,
        timestamp: b.timestamp,
      })
      .collect();

    SpcReport {
      total_count,
      batch_size,
      overall_rate,
      limits: Some(ControlLimits::binomial(overall_rate, batch_size)),
      batches,
      alerts,
      cpk: self.cpk(overall_rate, total_count),
    }
  }

  /// 简化的单侧过程能力指数
  pub fn cpk(&self, overall_rate: f64, total_count: usize) -> Option<f64> {
    if total_count == 0 {
      return None;
    }
    let sigma = (overall_rate * (PERCENT - overall_rate) / total_count as f64)
      .max(0.0)
      .sqrt();
    let denominator = 3.0 * sigma;
    if denominator <= 0.0 {
      return None;
    }
    let margin = self.config.tolerance - (overall_rate - self.config.target).abs();
    Some((margin / denominator).max(0.0))
  }
}

/// 名义批次大小：把历史分成约 BATCH_COUNT 段
pub fn batch_size(total_count: usize) -> usize {
  (total_count / BATCH_COUNT).max(1)
}

fn rate(count: usize, size: usize) -> f64 {
  count as f64 / size as f64 * PERCENT
}

fn trend_at(batches: &[SpcBatch], idx: usize, center_line: f64) -> Trend {
  if idx + 1 < TREND_RUN {
    return Trend::Stable;
  }
  let window = &batches[idx + 1 - TREND_RUN..=idx];
  if window.iter().all(|b| b.defect_rate > center_line) {
    Trend::Increasing
  } else if window.iter().all(|b| b.defect_rate < center_line) {
    Trend::Decreasing
  } else {
    Trend::Stable
  }
}
