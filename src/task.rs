// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 检测任务
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

use std::sync::mpsc::{self, Receiver, Sender};
use std::{thread, time::Duration};

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  aggregator::{AppendError, Snapshot, StreamReader, StreamWriter, verdict_stream},
  config::Config,
  ensemble::{ClassifyError, EnsembleClassifier},
  frame::RecordedFrame,
  input::{ImageUnit, InputItem, InspectionUnit, OpenError, VideoUnit},
  model::Model,
  output::Render,
  report::{Event, Failure, RunReport},
  sampling::{SampleError, Sampler},
  spc::{SpcEngine, SpcReport},
  verdict::{Sequencer, Verdict},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 单个检测单元的失败原因
#[derive(Error, Debug)]
pub enum UnitError {
  #[error("推理失败: {0}")]
  Model(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error(transparent)]
  Classify(#[from] ClassifyError),
  #[error(transparent)]
  Sample(#[from] SampleError),
  #[error(transparent)]
  Append(#[from] AppendError),
}

/// 后台 SPC 重算线程
///
/// 只接收不可变快照，结果带上快照所属的纪元返回。
struct SpcWorker {
  jobs: Sender<Snapshot>,
  results: Receiver<(u64, SpcReport)>,
  handle: thread::JoinHandle<()>,
}

impl SpcWorker {
  fn spawn(engine: SpcEngine) -> std::io::Result<Self> {
    let (jobs, job_rx) = mpsc::channel::<Snapshot>();
    let (result_tx, results) = mpsc::channel();
    let handle = thread::Builder::new()
      .name("spc".to_string())
      .spawn(move || {
        for snapshot in job_rx {
          let report = engine.recompute(snapshot.history());
          if result_tx.send((snapshot.epoch, report)).is_err() {
            break;
          }
        }
      })?;

    Ok(Self {
      jobs,
      results,
      handle,
    })
  }

  fn submit(&self, snapshot: Snapshot) {
    if self.jobs.send(snapshot).is_err() {
      warn!("SPC 线程已退出, 丢弃本次重算");
    }
  }

  /// 关闭任务队列并等待剩余结果
  fn finish(self) -> Vec<(u64, SpcReport)> {
    drop(self.jobs);
    let results = self.results.iter().collect();
    if self.handle.join().is_err() {
      warn!("SPC 线程异常退出");
    }
    results
  }
}

/// 判定流的唯一写入方以及运行中的汇总状态
struct RunState<'a> {
  config: &'a Config,
  classifier: EnsembleClassifier,
  writer: StreamWriter,
  reader: StreamReader,
  sequencer: Sequencer,
  pending_appends: usize,
  latest_spc: SpcReport,
  video_summaries: Vec<Verdict>,
  failures: Vec<Failure>,
}

impl RunState<'_> {
  fn emit<O>(&self, output: &O, event: Event)
  where
    O: Render<Event>,
    O::Error: std::fmt::Display,
  {
    if let Err(e) = output.render_result(&event) {
      warn!("输出事件失败: {}", e);
    }
  }

  fn append<O>(&mut self, verdict: Verdict, output: &O) -> Result<(), AppendError>
  where
    O: Render<Event>,
    O::Error: std::fmt::Display,
  {
    let counts = self.writer.append(verdict.clone())?;
    self.pending_appends += 1;
    self.emit(output, Event::Verdict { verdict, counts });
    Ok(())
  }

  fn fail<O>(&mut self, output: &O, unit_id: String, reason: String)
  where
    O: Render<Event>,
    O::Error: std::fmt::Display,
  {
    warn!("{} 检测失败: {}", unit_id, reason);
    self.failures.push(Failure {
      unit_id: unit_id.clone(),
      reason: reason.clone(),
    });
    self.emit(output, Event::Failure { unit_id, reason });
  }

  fn inspect_image<M, O>(
    &mut self,
    unit_id: &str,
    unit: ImageUnit,
    model: &M,
    output: &O,
  ) -> Result<(), UnitError>
  where
    M: Model<Input = RecordedFrame>,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render<Event>,
    O::Error: std::fmt::Display,
  {
    let board_area = unit.board_area.unwrap_or(self.config.board_area);
    let frame = RecordedFrame::from(unit.detections);
    let detections = model
      .infer(&frame)
      .map_err(|e| UnitError::Model(Box::new(e)))?
      .into_vec();
    let classification = self.classifier.classify(&detections, board_area)?;
    let verdict = Verdict::image(
      unit_id,
      self.sequencer.next_index(),
      detections,
      classification,
    );
    self.append(verdict, output)?;
    Ok(())
  }

  fn inspect_video<M, O>(
    &mut self,
    unit_id: &str,
    unit: VideoUnit,
    model: &M,
    output: &O,
  ) -> Result<(), UnitError>
  where
    M: Model<Input = RecordedFrame>,
    M::Error: std::error::Error + Send + Sync + 'static,
    O: Render<Event>,
    O::Error: std::fmt::Display,
  {
    let board_area = unit.board_area.unwrap_or(self.config.board_area);
    let interval_ms = unit.interval_ms.unwrap_or(self.config.interval_ms);
    let sampler = Sampler::new(interval_ms, unit.fps())?;
    let inspection = sampler.sample(
      unit_id,
      unit.frames,
      model,
      &self.classifier,
      board_area,
      &mut self.sequencer,
    )?;

    for verdict in inspection.frames {
      self.append(verdict, output)?;
    }
    self.emit(
      output,
      Event::VideoSummary {
        verdict: inspection.summary.clone(),
      },
    );
    self.video_summaries.push(inspection.summary);
    Ok(())
  }

  fn reset<O>(&mut self, output: &O)
  where
    O: Render<Event>,
    O::Error: std::fmt::Display,
  {
    let epoch = self.writer.reset();
    self.sequencer.reset();
    self.pending_appends = 0;
    self.latest_spc = SpcReport::empty();
    self.video_summaries.clear();
    self.failures.clear();
    self.emit(output, Event::Reset { epoch });
  }

  /// 处理后台返回的 SPC 结果，丢弃过期纪元
  fn accept_spc<O>(&mut self, output: &O, epoch: u64, report: SpcReport)
  where
    O: Render<Event>,
    O::Error: std::fmt::Display,
  {
    if !self.reader.is_current(epoch) {
      debug!("丢弃过期 SPC 结果, 纪元 {}", epoch);
      return;
    }
    self.emit(
      output,
      Event::Spc {
        epoch,
        report: report.clone(),
      },
    );
    self.latest_spc = report;
  }
}

/// 检测任务：逐个读取检测单元，分类、聚合并在后台重算 SPC
#[derive(Debug, Default)]
pub struct InspectionTask {
  config: Config,
  max_units: Option<usize>,
  interrupt: bool,
}

impl InspectionTask {
  pub fn new(config: Config) -> Self {
    Self {
      config,
      max_units: None,
      interrupt: false,
    }
  }

  pub fn with_max_units(mut self, max_units: Option<usize>) -> Self {
    self.max_units = max_units;
    self
  }

  /// 安装 Ctrl-C 处理器，收到信号后在当前单元结束时停止
  pub fn with_interrupt(mut self, interrupt: bool) -> Self {
    self.interrupt = interrupt;
    self
  }

  fn install_interrupt() -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法设置 Ctrl-C 处理器")?;
    Ok(rx)
  }
}

impl<I, M, O, RE> Task<I, M, O> for InspectionTask
where
  I: Iterator<Item = Result<InputItem, OpenError>>,
  M: Model<Input = RecordedFrame>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: Render<Event, Error = RE> + Render<RunReport, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Output = RunReport;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    self.config.validate().context("配置无效")?;
    let interrupt = if self.interrupt {
      Some(Self::install_interrupt()?)
    } else {
      None
    };

    let (writer, reader) = verdict_stream();
    let worker = SpcWorker::spawn(self.config.spc_engine()).context("无法启动 SPC 线程")?;
    let mut state = RunState {
      config: &self.config,
      classifier: self.config.classifier()?,
      writer,
      reader,
      sequencer: Sequencer::default(),
      pending_appends: 0,
      latest_spc: SpcReport::empty(),
      video_summaries: Vec::new(),
      failures: Vec::new(),
    };

    let mut units = 0;
    let mut interrupted = false;
    for item in input {
      match item {
        Ok(InputItem::Reset) => state.reset(&output),
        Ok(InputItem::Unit(unit)) => {
          units += 1;
          let numbered = state.sequencer.next_unit_id();
          let unit_id = unit.unit_id().map_or(numbered, str::to_string);
          debug!("处理检测单元 {}", unit_id);
          let result = match unit {
            InspectionUnit::Image(unit) => state.inspect_image(&unit_id, unit, &model, &output),
            InspectionUnit::Video(unit) => state.inspect_video(&unit_id, unit, &model, &output),
          };
          if let Err(e) = result {
            state.fail(&output, unit_id, e.to_string());
          }
        }
        Err(e) => {
          let unit_id = e.url.to_string();
          state.fail(&output, unit_id, e.source.to_string());
        }
      }

      if state.pending_appends >= self.config.recompute_every {
        state.pending_appends = 0;
        worker.submit(state.reader.snapshot());
      }
      while let Ok((epoch, report)) = worker.results.try_recv() {
        state.accept_spc(&output, epoch, report);
      }

      if self.max_units.is_some_and(|n| units >= n) {
        info!("达到指定单元数 {}, 退出任务循环", units);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        interrupted = true;
        break;
      }
    }

    if state.pending_appends > 0 {
      worker.submit(state.reader.snapshot());
    }
    for (epoch, report) in worker.finish() {
      state.accept_spc(&output, epoch, report);
    }

    let snapshot = state.reader.snapshot();
    let mut report = RunReport::new(snapshot.epoch, snapshot.counts, state.latest_spc);
    report.video_summaries = state.video_summaries;
    report.failures = state.failures;
    report.interrupted = interrupted;
    output.render_result(&report).context("无法输出运行报告")?;

    info!("任务完成，退出");
    Ok(report)
  }
}
