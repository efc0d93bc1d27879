// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 运行配置
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::ensemble::{BucketConfig, ClassifyError, EnsembleClassifier, EnsembleWeights};
use crate::spc::{SpcConfig, SpcEngine};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("解析配置文件失败: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  InvalidConfiguration(String),
}

impl From<ClassifyError> for ConfigError {
  fn from(err: ClassifyError) -> Self {
    match err {
      ClassifyError::InvalidConfiguration(msg) => ConfigError::InvalidConfiguration(msg),
    }
  }
}

/// 运行配置，启动时加载，运行期间不再改变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
  pub ensemble: EnsembleWeights,
  pub buckets: BucketConfig,
  pub spc: SpcConfig,
  /// 输入未给出时使用的板面积
  pub board_area: f64,
  /// 每追加多少个判定重算一次 SPC
  pub recompute_every: usize,
  /// 视频默认采样间隔（毫秒）
  pub interval_ms: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      ensemble: EnsembleWeights::default(),
      buckets: BucketConfig::default(),
      spc: SpcConfig::default(),
      board_area: 1.0,
      recompute_every: 1,
      interval_ms: 1000,
    }
  }
}

impl Config {
  pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config = Self::from_json_str(&content)?;
    info!("已加载配置: {}", path.display());
    Ok(config)
  }

  pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.ensemble.validate()?;
    self.buckets.validate()?;

    if !(self.board_area.is_finite() && self.board_area > 0.0) {
      return Err(ConfigError::InvalidConfiguration(format!(
        "boardArea 必须为正数, 实际为 {}",
        self.board_area
      )));
    }
    if !(self.spc.tolerance.is_finite() && self.spc.tolerance > 0.0) {
      return Err(ConfigError::InvalidConfiguration(format!(
        "spc.tolerance 必须为正数, 实际为 {}",
        self.spc.tolerance
      )));
    }
    if !self.spc.target.is_finite() {
      return Err(ConfigError::InvalidConfiguration("spc.target 必须为有限值".to_string()));
    }
    if self.recompute_every == 0 {
      return Err(ConfigError::InvalidConfiguration("recomputeEvery 不能为 0".to_string()));
    }
    if self.interval_ms == 0 {
      return Err(ConfigError::InvalidConfiguration("intervalMs 不能为 0".to_string()));
    }
    Ok(())
  }

  pub fn classifier(&self) -> Result<EnsembleClassifier, ConfigError> {
    Ok(EnsembleClassifier::new(
      self.ensemble.clone(),
      self.buckets.clone(),
    )?)
  }

  pub fn spc_engine(&self) -> SpcEngine {
    SpcEngine::new(self.spc.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn empty_object_is_default() {
    let config = Config::from_json_str("{}").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.ensemble.questionable_threshold, 5.0);
    assert_eq!(config.spc.tolerance, 5.0);
  }

  #[test]
  fn partial_override() {
    let config = Config::from_json_str(
      r#"{
        "ensemble": { "passThreshold": 1.5 },
        "buckets": { "density": [2, 4, 8] },
        "spc": { "tolerance": 3 },
        "boardArea": 2500,
        "recomputeEvery": 10
      }"#,
    )
    .unwrap();
    assert_eq!(config.ensemble.pass_threshold, 1.5);
    assert_eq!(config.ensemble.high_confidence_weight, 4.0);
    assert_eq!(config.buckets.density.cut_points(), &[2.0, 4.0, 8.0]);
    assert_eq!(config.buckets.coverage.cut_points(), &[0.01, 0.05]);
    assert_eq!(config.spc.tolerance, 3.0);
    assert_eq!(config.board_area, 2500.0);
    assert_eq!(config.recompute_every, 10);
  }

  #[test]
  fn invalid_values_are_rejected() {
    let cases = [
      r#"{ "ensemble": { "densityWeight": 0 } }"#,
      r#"{ "ensemble": { "highConfidenceThreshold": 1.5 } }"#,
      r#"{ "ensemble": { "passThreshold": 5, "questionableThreshold": 5 } }"#,
      r#"{ "ensemble": { "passThreshold": -1 } }"#,
      r#"{ "buckets": { "density": [] } }"#,
      r#"{ "buckets": { "coverage": [0.05, 0.01] } }"#,
      r#"{ "spc": { "tolerance": 0 } }"#,
      r#"{ "boardArea": -3 }"#,
      r#"{ "recomputeEvery": 0 }"#,
    ];
    for case in cases {
      assert!(
        matches!(
          Config::from_json_str(case),
          Err(ConfigError::InvalidConfiguration(_))
        ),
        "应拒绝: {}",
        case
      );
    }
  }

  #[test]
  fn malformed_json_is_parse_error() {
    assert!(matches!(
      Config::from_json_str("{ boardArea: }"),
      Err(ConfigError::Parse(_))
    ));
  }

  #[test]
  fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "intervalMs": 500 }}"#).unwrap();
    let config = Config::from_path(file.path()).unwrap();
    assert_eq!(config.interval_ms, 500);
    assert!(config.classifier().is_ok());

    assert!(matches!(
      Config::from_path(file.path().with_extension("missing")),
      Err(ConfigError::Io(_))
    ));
  }
}
