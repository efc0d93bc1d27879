// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Render},
  report::{Event, RunReport},
  spc::Trend,
  verdict::Status,
};

/// `log://`，以 tracing 事件输出
#[derive(Debug, Default)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(LogOutput)
  }
}

impl Render<Event> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, event: &Event) -> Result<(), Self::Error> {
    match event {
      Event::Verdict { verdict, counts } => {
        let line = format!(
          "{} #{}: {} (分数 {:.2}, {} 个缺陷, 覆盖率 {:.4}) 合格 {}/{}",
          verdict.unit_id,
          verdict.sequence_index,
          verdict.status,
          verdict.ensemble_score,
          verdict.detections.len(),
          verdict.area_coverage_ratio,
          counts.pass_count,
          counts.total_count
        );
        match verdict.status {
          Status::Fail => warn!("{}", line),
          _ => info!("{}", line),
        }
      }
      Event::VideoSummary { verdict } => {
        info!(
          "视频 {} 汇总: {} (最高分数 {:.2})",
          verdict.unit_id, verdict.status, verdict.ensemble_score
        );
      }
      Event::Spc { epoch, report } => {
        if let Some(limits) = &report.limits {
          info!(
            "SPC[{}]: {} 个判定, {} 批, 中心线 {:.2}%, UCL {:.2}%, LCL {:.2}%",
            epoch,
            report.total_count,
            report.batches.len(),
            limits.center_line,
            limits.upper_control_limit,
            limits.lower_control_limit
          );
        }
        if let Some(batch) = report.batches.last()
          && batch.trend != Trend::Stable
        {
          warn!("SPC[{}]: 批次 {} 出现趋势 {:?}", epoch, batch.batch_index, batch.trend);
        }
        for alert in &report.alerts {
          error!("SPC[{}] 告警: {}", epoch, alert.message);
        }
      }
      Event::Failure { unit_id, reason } => {
        error!("{} 检测失败: {}", unit_id, reason);
      }
      Event::Reset { epoch } => {
        info!("运行已重置, 纪元 {}", epoch);
      }
    }
    Ok(())
  }
}

impl Render<RunReport> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, report: &RunReport) -> Result<(), Self::Error> {
    info!(
      "运行结束: 共 {} 个判定, 合格 {}, 存疑 {}, 不合格 {}",
      report.counts.total_count,
      report.counts.pass_count,
      report.counts.questionable_count,
      report.counts.fail_count
    );
    if let Some(efficiency) = report.quality_efficiency {
      info!("合格率 {:.2}%", efficiency * 100.0);
    }
    if let Some(cpk) = report.spc.cpk {
      info!("过程能力 Cpk = {:.3}", cpk);
    }
    if !report.failures.is_empty() {
      warn!("{} 个检测单元失败", report.failures.len());
    }
    Ok(())
  }
}
