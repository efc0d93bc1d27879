// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/scenarios.rs - 端到端质检场景
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

use serde_json::{Value, json};
use url::Url;

use shanan_qc::{
  config::Config,
  ensemble::EnsembleClassifier,
  input::InputQueue,
  model::{DetectionRecord, ReplayModel},
  output::Outputs,
  spc::SpcEngine,
  task::{InspectionTask, Task},
  verdict::{Status, Verdict},
};

fn short_circuit() -> Value {
  json!({ "type": "short", "confidence": 0.95, "bbox": [0, 0, 10, 10], "area": 100 })
}

fn write_json(dir: &Path, name: &str, value: &Value) -> std::path::PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
  path
}

fn url(scheme: &str, path: &Path, query: &str) -> Url {
  let mut url = format!("{}://{}", scheme, path.display());
  if !query.is_empty() {
    url.push('?');
    url.push_str(query);
  }
  url.parse().unwrap()
}

fn image_units(n: usize, fails: impl Fn(usize) -> bool) -> Value {
  let units: Vec<Value> = (0..n)
    .map(|i| {
      let detections = if fails(i) {
        vec![short_circuit()]
      } else {
        Vec::new()
      };
      json!({ "detections": detections })
    })
    .collect();
  Value::Array(units)
}

#[test]
fn single_confident_defect_covering_the_board_fails() {
  let classifier = EnsembleClassifier::default();
  let detection = DetectionRecord::from_bbox("spur", 0.9, [0.0, 0.0, 20.0, 20.0]);
  let classification = classifier.classify(&[detection.clone()], detection.area).unwrap();

  let breakdown = &classification.assessment.breakdown;
  assert_eq!(breakdown.high_confidence, 4.0);
  assert_eq!(breakdown.density, 1.0);
  assert_eq!(breakdown.avg_confidence, 2.0);
  assert_eq!(breakdown.area_coverage, 3.0);
  assert_eq!(classification.score, 10.0);
  assert_eq!(classification.area_coverage_ratio, 1.0);
  assert_eq!(classification.status, Status::Fail);
}

#[test]
fn all_pass_history_has_no_alerts() {
  let classifier = EnsembleClassifier::default();
  let history: Vec<Verdict> = (0..10)
    .map(|i| {
      let classification = classifier.classify(&[], 1.0).unwrap();
      Verdict::image(format!("PCB-{:03}", i + 1), i, Vec::new(), classification)
    })
    .collect();

  let report = SpcEngine::default().recompute(&history);
  assert_eq!(report.batch_size, 1);
  assert!(report.batches.iter().all(|b| b.defect_rate == 0.0));
  assert!(report.alerts.is_empty());
}

#[test]
fn spiking_batch_is_reported_end_to_end() {
  let dir = tempfile::tempdir().unwrap();
  let units = write_json(
    dir.path(),
    "units.json",
    &image_units(100, |i| i % 10 == 9 || (30..34).contains(&i)),
  );
  let report_path = dir.path().join("out/report.json");
  let events_path = dir.path().join("out/events.jsonl");

  let outputs = Outputs::from_urls(&[
    url("json", &report_path, ""),
    url("jsonl", &events_path, ""),
  ])
  .unwrap();
  let report = InspectionTask::new(Config::default())
    .run_task(
      InputQueue::new([url("image", &units, "board_area=100")]),
      ReplayModel,
      outputs,
    )
    .unwrap();

  assert_eq!(report.counts.total_count, 100);
  assert_eq!(report.counts.fail_count, 14);
  assert_eq!(report.spc.batch_size, 10);
  assert!((report.spc.overall_rate - 14.0).abs() < 1e-9);
  assert_eq!(report.spc.alerts.len(), 1);
  assert_eq!(report.spc.alerts[0].batch_index, 3);

  let written: Value =
    serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
  assert_eq!(written["counts"]["failCount"], 14);
  assert_eq!(written["spc"]["alerts"][0]["severity"], "critical");
  assert_eq!(written["spc"]["batches"][3]["outOfControl"], true);

  // 合格判定默认不写入事件记录
  let events: Vec<Value> = std::fs::read_to_string(&events_path)
    .unwrap()
    .lines()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();
  let verdicts = events.iter().filter(|e| e["event"] == "verdict").count();
  assert_eq!(verdicts, 14);
  assert!(events.iter().any(|e| e["event"] == "spc"));
}

#[test]
fn reset_and_broken_inputs_between_runs() {
  let dir = tempfile::tempdir().unwrap();
  let before = write_json(dir.path(), "before.json", &image_units(5, |_| true));
  let after = write_json(dir.path(), "after.json", &image_units(10, |_| false));

  let report = InspectionTask::new(Config::default())
    .run_task(
      InputQueue::new([
        url("image", &before, "board_area=100"),
        "reset://".parse().unwrap(),
        url("image", &dir.path().join("missing.json"), ""),
        url("image", &after, "board_area=100"),
      ]),
      ReplayModel,
      Outputs::default(),
    )
    .unwrap();

  assert_eq!(report.epoch, 1);
  assert_eq!(report.counts.total_count, 10);
  assert_eq!(report.counts.fail_count, 0);
  assert_eq!(report.quality_efficiency, Some(1.0));
  assert_eq!(report.spc.total_count, 10);
  assert!(report.spc.alerts.is_empty());
  assert_eq!(report.failures.len(), 1);
  assert!(report.failures[0].unit_id.ends_with("missing.json"));
}

#[test]
fn video_is_sampled_at_the_configured_interval() {
  let dir = tempfile::tempdir().unwrap();
  let frames: Vec<Value> = (0..90)
    .map(|i| {
      if i == 45 || i == 60 {
        json!({ "detections": [short_circuit()] })
      } else {
        json!({})
      }
    })
    .collect();
  let video = write_json(
    dir.path(),
    "line.json",
    &json!({ "unitId": "LINE-1", "boardArea": 100, "frames": frames }),
  );

  let report = InspectionTask::new(Config::default())
    .run_task(
      InputQueue::new([url("video", &video, "fps=30&interval_ms=500")]),
      ReplayModel,
      Outputs::default(),
    )
    .unwrap();

  // 每 15 帧采样一次: 0, 15, 30, 45, 60, 75
  assert_eq!(report.counts.total_count, 6);
  assert_eq!(report.counts.fail_count, 2);
  assert_eq!(report.video_summaries.len(), 1);

  let summary = serde_json::to_value(&report.video_summaries[0]).unwrap();
  assert_eq!(summary["kind"], "videoSummary");
  assert_eq!(summary["unitId"], "LINE-1");
  assert_eq!(summary["status"], "FAIL");
  assert_eq!(summary["metrics"]["processedFrames"], 6);
  assert_eq!(summary["metrics"]["framesWithDefects"], 2);
  assert_eq!(summary["metrics"]["frameInterval"], 15);
}
