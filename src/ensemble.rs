// 该文件是 Shanan （山南西风） 项目的一部分。
// src/ensemble.rs - 集成评分分类器
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{DetectionRecord, WithLabel};
use crate::verdict::Status;

/// 严重缺陷分数线
const SEVERE_SCORE: f64 = 10.0;
// 置信度分布的分档
const DISTRIBUTION_HIGH: f64 = 0.7;
const DISTRIBUTION_LOW: f64 = 0.4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
  #[error("配置无效: {0}")]
  InvalidConfiguration(String),
}

impl ClassifyError {
  fn invalid(msg: impl Into<String>) -> Self {
    ClassifyError::InvalidConfiguration(msg.into())
  }
}

/// 集成评分权重与阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnsembleWeights {
  pub high_confidence_weight: f64,
  pub density_weight: f64,
  pub avg_confidence_weight: f64,
  pub area_coverage_weight: f64,
  pub high_confidence_threshold: f64,
  pub pass_threshold: f64,
  pub questionable_threshold: f64,
}

impl Default for EnsembleWeights {
  fn default() -> Self {
    Self {
      high_confidence_weight: 4.0,
      density_weight: 2.0,
      avg_confidence_weight: 2.0,
      area_coverage_weight: 3.0,
      high_confidence_threshold: 0.75,
      pass_threshold: 2.0,
      questionable_threshold: 5.0,
    }
  }
}

impl EnsembleWeights {
  pub fn validate(&self) -> Result<(), ClassifyError> {
    let weights = [
      ("highConfidenceWeight", self.high_confidence_weight),
      ("densityWeight", self.density_weight),
      ("avgConfidenceWeight", self.avg_confidence_weight),
      ("areaCoverageWeight", self.area_coverage_weight),
    ];
    for (name, weight) in weights {
      if !(weight.is_finite() && weight > 0.0) {
        return Err(ClassifyError::invalid(format!("{} 必须为正数, 实际为 {}", name, weight)));
      }
    }

    if !(0.0..=1.0).contains(&self.high_confidence_threshold) {
      return Err(ClassifyError::invalid(format!(
        "highConfidenceThreshold 必须位于 [0, 1], 实际为 {}",
        self.high_confidence_threshold
      )));
    }

    if !(self.pass_threshold.is_finite() && self.pass_threshold >= 0.0) {
      return Err(ClassifyError::invalid(format!(
        "passThreshold 不能为负, 实际为 {}",
        self.pass_threshold
      )));
    }

    if !(self.questionable_threshold.is_finite()
      && self.questionable_threshold > self.pass_threshold)
    {
      return Err(ClassifyError::invalid(format!(
        "questionableThreshold ({}) 必须大于 passThreshold ({})",
        self.questionable_threshold, self.pass_threshold
      )));
    }

    Ok(())
  }

  /// 分数到状态的两刀切分：(-, pass] / (pass, questionable] / (questionable, +)
  pub fn status_for(&self, score: f64) -> Status {
    if score <= self.pass_threshold {
      Status::Pass
    } else if score <= self.questionable_threshold {
      Status::Questionable
    } else {
      Status::Fail
    }
  }

  pub fn max_score(&self) -> f64 {
    self.high_confidence_weight
      + self.density_weight
      + self.avg_confidence_weight
      + self.area_coverage_weight
  }

  /// 由各项信号档位计算加权分
  pub fn score(&self, levels: &SignalLevels) -> ScoreBreakdown {
    ScoreBreakdown {
      high_confidence: self.high_confidence_weight * indicator(levels.high_confidence),
      density: self.density_weight * levels.density,
      avg_confidence: self.avg_confidence_weight * indicator(levels.avg_confidence),
      area_coverage: self.area_coverage_weight * levels.area_coverage,
    }
  }
}

fn indicator(flag: bool) -> f64 {
  if flag { 1.0 } else { 0.0 }
}

/// 单调分档函数
///
/// 由严格递增的分割点 `c_1 < ... < c_k` 描述，取值 `x` 的档位序号为满足
/// `x >= c_i` 的分割点个数，档位水平为 `序号 / k`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Buckets {
  cut_points: Vec<f64>,
}

impl Buckets {
  pub fn new(cut_points: Vec<f64>) -> Result<Self, ClassifyError> {
    let buckets = Self { cut_points };
    buckets.validate()?;
    Ok(buckets)
  }

  pub fn validate(&self) -> Result<(), ClassifyError> {
    let Some(first) = self.cut_points.first() else {
      return Err(ClassifyError::invalid("分档分割点不能为空"));
    };
    // 首个分割点为正，保证零值落在第 0 档
    if !(first.is_finite() && *first > 0.0) {
      return Err(ClassifyError::invalid(format!("首个分割点必须为正数, 实际为 {}", first)));
    }
    for pair in self.cut_points.windows(2) {
      if !(pair[1].is_finite() && pair[1] > pair[0]) {
        return Err(ClassifyError::invalid(format!(
          "分割点必须严格递增: {:?}",
          self.cut_points
        )));
      }
    }
    Ok(())
  }

  pub fn cut_points(&self) -> &[f64] {
    &self.cut_points
  }

  pub fn index(&self, value: f64) -> usize {
    self.cut_points.iter().filter(|&&cut| value >= cut).count()
  }

  pub fn level(&self, value: f64) -> f64 {
    if self.cut_points.is_empty() {
      return 0.0;
    }
    self.index(value) as f64 / self.cut_points.len() as f64
  }
}

/// 检测数量与面积覆盖率的分档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketConfig {
  pub density: Buckets,
  pub coverage: Buckets,
}

impl Default for BucketConfig {
  fn default() -> Self {
    Self {
      density: Buckets {
        cut_points: vec![1.0, 3.0],
      },
      coverage: Buckets {
        cut_points: vec![0.01, 0.05],
      },
    }
  }
}

impl BucketConfig {
  pub fn validate(&self) -> Result<(), ClassifyError> {
    self.density.validate()?;
    self.coverage.validate()
  }
}

/// 四项信号的档位
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalLevels {
  pub high_confidence: bool,
  pub density: f64,
  pub avg_confidence: bool,
  pub area_coverage: f64,
}

/// 各项加权分
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
  pub high_confidence: f64,
  pub density: f64,
  pub avg_confidence: f64,
  pub area_coverage: f64,
}

impl ScoreBreakdown {
  pub fn total(&self) -> f64 {
    self.high_confidence + self.density + self.avg_confidence + self.area_coverage
  }
}

/// 置信度分布：高 (> 0.7) / 中 [0.4, 0.7] / 低 (< 0.4)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceDistribution {
  pub high_ratio: f64,
  pub medium_ratio: f64,
  pub low_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitMetrics {
  pub detection_count: usize,
  pub high_confidence_count: usize,
  pub mean_confidence: f64,
  pub max_confidence: f64,
  pub total_defect_area: f64,
  pub distribution: ConfidenceDistribution,
}

/// 描述性等级，不影响判定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
  Good,
  Questionable,
  Defective,
  SeverelyDefective,
}

impl Grade {
  pub fn from_score(score: f64, weights: &EnsembleWeights) -> Self {
    if score <= weights.pass_threshold {
      Grade::Good
    } else if score <= weights.questionable_threshold {
      Grade::Questionable
    } else if score <= SEVERE_SCORE {
      Grade::Defective
    } else {
      Grade::SeverelyDefective
    }
  }

  /// 该等级的名义可信度
  pub fn reliability(&self) -> f64 {
    match self {
      Grade::Good => 0.95,
      Grade::Questionable => 0.75,
      Grade::Defective => 0.85,
      Grade::SeverelyDefective => 0.95,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
  pub breakdown: ScoreBreakdown,
  pub metrics: UnitMetrics,
  pub grade: Grade,
  pub primary_defect: Option<String>,
}

/// 单个检测单元的分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  pub status: Status,
  pub score: f64,
  pub area_coverage_ratio: f64,
  pub assessment: Assessment,
}

/// 集成评分分类器
#[derive(Debug, Clone, Default)]
pub struct EnsembleClassifier {
  weights: EnsembleWeights,
  buckets: BucketConfig,
}

impl EnsembleClassifier {
  pub fn new(weights: EnsembleWeights, buckets: BucketConfig) -> Result<Self, ClassifyError> {
    weights.validate()?;
    buckets.validate()?;
    Ok(Self { weights, buckets })
  }

  pub fn weights(&self) -> &EnsembleWeights {
    &self.weights
  }

  pub fn buckets(&self) -> &BucketConfig {
    &self.buckets
  }

  pub fn classify(
    &self,
    detections: &[DetectionRecord],
    board_area: f64,
  ) -> Result<Classification, ClassifyError> {
    if !(board_area.is_finite() && board_area > 0.0) {
      return Err(ClassifyError::invalid(format!("板面积必须为正数, 实际为 {}", board_area)));
    }

    let metrics = unit_metrics(detections, self.weights.high_confidence_threshold);
    let area_coverage_ratio = metrics.total_defect_area / board_area;

    let levels = SignalLevels {
      high_confidence: metrics.high_confidence_count > 0,
      density: self.buckets.density.level(detections.len() as f64),
      avg_confidence: !detections.is_empty()
        && metrics.mean_confidence > self.weights.high_confidence_threshold,
      area_coverage: self.buckets.coverage.level(area_coverage_ratio),
    };
    let breakdown = self.weights.score(&levels);
    let score = breakdown.total();
    let status = self.weights.status_for(score);

    debug!(
      "集成评分: {:.2} = 高置信 {:.2} + 密度 {:.2} + 平均置信 {:.2} + 面积 {:.2} -> {}",
      score,
      breakdown.high_confidence,
      breakdown.density,
      breakdown.avg_confidence,
      breakdown.area_coverage,
      status
    );

    let primary_defect = detections
      .iter()
      .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
      .map(|det| det.defect_kind().to_label_str());

    Ok(Classification {
      status,
      score,
      area_coverage_ratio,
      assessment: Assessment {
        breakdown,
        grade: Grade::from_score(score, &self.weights),
        metrics,
        primary_defect,
      },
    })
  }
}

fn unit_metrics(detections: &[DetectionRecord], high_threshold: f64) -> UnitMetrics {
  let count = detections.len();
  if count == 0 {
    return UnitMetrics {
      detection_count: 0,
      high_confidence_count: 0,
      mean_confidence: 0.0,
      max_confidence: 0.0,
      total_defect_area: 0.0,
      distribution: ConfidenceDistribution {
        high_ratio: 0.0,
        medium_ratio: 0.0,
        low_ratio: 1.0,
      },
    };
  }

  let mut high_count = 0usize;
  let mut dist_high = 0usize;
  let mut dist_low = 0usize;
  let mut sum = 0.0;
  let mut max = f64::MIN;
  let mut area = 0.0;
  for det in detections {
    if det.confidence > high_threshold {
      high_count += 1;
    }
    if det.confidence > DISTRIBUTION_HIGH {
      dist_high += 1;
    } else if det.confidence < DISTRIBUTION_LOW {
      dist_low += 1;
    }
    sum += det.confidence;
    max = max.max(det.confidence);
    area += det.area;
  }

  let total = count as f64;
  UnitMetrics {
    detection_count: count,
    high_confidence_count: high_count,
    mean_confidence: sum / total,
    max_confidence: max,
    total_defect_area: area,
    distribution: ConfidenceDistribution {
      high_ratio: dist_high as f64 / total,
      medium_ratio: (count - dist_high - dist_low) as f64 / total,
      low_ratio: dist_low as f64 / total,
    },
  }
}
