//! Training tracker
//!
//! Ingests snapshots into the metrics store, fans them out to sinks, runs
//! lifecycle callbacks at epoch end and produces summaries and reports.

use chrono::{DateTime, Utc};
use mltrack_core::fail_open::{fail_open, fail_open_each};
use mltrack_core::{MetricSnapshot, Result, TrackError, TrackingConfig};
use mltrack_metrics::{MetricSink, MetricsStore, RunHistorySink, ScalarEventSink};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::fs;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::callbacks::{CallbackPipeline, CallbackSignal, TrainingCallback};
use crate::checkpoint::CheckpointPolicy;
use crate::early_stopping::EarlyStopping;
use crate::plots::{PlotRenderer, SvgPlotRenderer};
use crate::report::{TrainingReport, TrainingSummary};

/// Result of an epoch-end call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochOutcome {
    /// Latched stop request; the training loop decides whether to halt
    pub should_stop: bool,
}

#[derive(Debug, Default)]
struct RunTimes {
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

/// Builder for [`Tracker`]
pub struct TrackerBuilder {
    config: TrackingConfig,
    callbacks: Vec<Box<dyn TrainingCallback>>,
    sinks: Vec<Box<dyn MetricSink>>,
    plotter: Option<Box<dyn PlotRenderer>>,
    default_sinks: bool,
}

impl TrackerBuilder {
    fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            callbacks: Vec::new(),
            sinks: Vec::new(),
            plotter: None,
            default_sinks: true,
        }
    }

    /// Register a callback after the default policies
    pub fn with_callback(mut self, callback: impl TrainingCallback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Register a sink after the default sinks
    pub fn with_sink(mut self, sink: impl MetricSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Replace the SVG renderer used by `save_report`
    pub fn with_plot_renderer(mut self, renderer: impl PlotRenderer + 'static) -> Self {
        self.plotter = Some(Box::new(renderer));
        self
    }

    /// Skip the sinks the config toggles would otherwise enable
    pub fn without_default_sinks(mut self) -> Self {
        self.default_sinks = false;
        self
    }

    /// Validate the config, create directories and assemble the tracker
    pub async fn build(self) -> Result<Tracker> {
        let config = self.config;
        config.validate()?;

        for dir in [&config.log_dir, &config.checkpoint_dir] {
            fs::create_dir_all(dir).await.map_err(|e| {
                TrackError::Config(format!("Cannot create {}: {}", dir.display(), e))
            })?;
        }

        let run_id = Uuid::new_v4();
        let span = info_span!(
            "tracker",
            experiment = %config.experiment_name,
            run_id = %run_id
        );

        let mut pipeline = CallbackPipeline::new();
        if config.early_stopping_patience > 0 {
            pipeline.add(Box::new(EarlyStopping::new(
                config.early_stopping_monitor.clone(),
                config.early_stopping_mode,
                config.early_stopping_patience,
            )));
        }
        pipeline.add(Box::new(CheckpointPolicy::in_directory(
            config.checkpoint_dir.clone(),
            config.save_frequency,
            config.max_checkpoints,
        )));
        for callback in self.callbacks {
            pipeline.add(callback);
        }

        let mut sinks: Vec<Box<dyn MetricSink>> = Vec::new();
        if self.default_sinks {
            if config.enable_tensorboard {
                sinks.push(Box::new(ScalarEventSink::new(&config.log_dir)));
            }
            if config.enable_wandb {
                sinks.push(Box::new(RunHistorySink::new(
                    &config.log_dir,
                    &config.wandb_entity,
                    &config.wandb_project,
                    &config.experiment_name,
                )));
            }
        }
        sinks.extend(self.sinks);

        let plotter = match self.plotter {
            Some(plotter) => Some(plotter),
            None if config.enable_plots => {
                Some(Box::new(SvgPlotRenderer::new()) as Box<dyn PlotRenderer>)
            }
            None => None,
        };

        span.in_scope(|| {
            info!(
                "Tracker initialized: callbacks={:?}, sinks={}",
                pipeline.names(),
                sinks.len()
            )
        });

        Ok(Tracker {
            store: MetricsStore::new(config.metric_history_size),
            config,
            run_id,
            span,
            callbacks: AsyncMutex::new(pipeline),
            sinks: RwLock::new(sinks),
            plotter,
            times: Mutex::new(RunTimes::default()),
            stop_requested: AtomicBool::new(false),
        })
    }
}

/// Experiment tracker for one training run
///
/// `Tracker` is `Send + Sync`; share it across tasks with `Arc`.
pub struct Tracker {
    config: TrackingConfig,
    run_id: Uuid,
    span: Span,
    store: MetricsStore,
    callbacks: AsyncMutex<CallbackPipeline>,
    sinks: RwLock<Vec<Box<dyn MetricSink>>>,
    plotter: Option<Box<dyn PlotRenderer>>,
    times: Mutex<RunTimes>,
    stop_requested: AtomicBool,
}

impl Tracker {
    pub fn builder(config: TrackingConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    /// Tracker with the default policies, sinks and plots
    pub async fn new(config: TrackingConfig) -> Result<Self> {
        Self::builder(config).build().await
    }

    fn times(&self) -> MutexGuard<'_, RunTimes> {
        self.times.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the start of training and persist the config
    ///
    /// Returns the path of `<log_dir>/<experiment>_config.json`.
    pub async fn start_training(&self) -> Result<PathBuf> {
        let started_at = Utc::now();
        {
            let mut times = self.times();
            times.started_at = Some(started_at);
            times.ended_at = None;
        }

        let path = self
            .config
            .log_dir
            .join(format!("{}_config.json", self.config.experiment_name));

        async {
            info!(
                "Starting training: {} ({}, {})",
                self.config.experiment_name, self.config.model_name, self.config.framework
            );
            let json = serde_json::to_string_pretty(&self.config)?;
            fs::write(&path, json).await?;
            debug!("Config written to {}", path.display());
            Ok::<_, TrackError>(path)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Store a snapshot and mirror it to every sink (fail-open)
    pub async fn log_metrics(&self, snapshot: MetricSnapshot) {
        self.store.append(snapshot.clone());

        async {
            let accuracy = snapshot
                .accuracy()
                .map_or_else(|| "N/A".to_string(), |a| format!("{:.4}", a));
            info!(
                "Epoch {}, Step {}: Loss={:.4}, Accuracy={}",
                snapshot.epoch(),
                snapshot.step(),
                snapshot.loss(),
                accuracy
            );

            let sinks = self.sinks.read().await;
            for sink in sinks.iter() {
                fail_open(sink.name(), || sink.emit(&snapshot)).await;
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Log the epoch-end snapshot and run every callback in order
    pub async fn on_epoch_end(&self, epoch: u64, snapshot: MetricSnapshot) -> EpochOutcome {
        self.log_metrics(snapshot.clone()).await;

        let signal = async {
            let mut callbacks = self.callbacks.lock().await;
            callbacks.epoch_end(epoch, &snapshot).await
        }
        .instrument(self.span.clone())
        .await;

        if signal == CallbackSignal::StopTraining {
            self.stop_requested.store(true, Ordering::SeqCst);
        }

        EpochOutcome {
            should_stop: self.should_stop(),
        }
    }

    /// Finish training: notify callbacks and close every sink once
    pub async fn end_training(&self) {
        let ended_at = Utc::now();
        let duration = {
            let mut times = self.times();
            times.ended_at = Some(ended_at);
            times.started_at.map(|start| seconds_between(start, ended_at))
        };

        async {
            match duration {
                Some(secs) => info!("Training completed in {:.2} seconds", secs),
                None => info!("Training completed (start was never recorded)"),
            }

            let last = self.store.latest();
            self.callbacks.lock().await.training_end(last.as_ref()).await;

            let sinks = std::mem::take(&mut *self.sinks.write().await);
            let failures =
                fail_open_each("sink close", sinks.iter().map(|s| &**s), |sink| sink.close()).await;
            debug!("Closed {} sinks ({} failed)", sinks.len(), failures);
        }
        .instrument(self.span.clone())
        .await
    }

    /// Read-only projection of the current state
    pub fn summary(&self) -> TrainingSummary {
        let (started_at, ended_at) = {
            let times = self.times();
            (times.started_at, times.ended_at)
        };

        let totals = self.store.totals();

        TrainingSummary {
            experiment_name: self.config.experiment_name.clone(),
            model_name: self.config.model_name.clone(),
            framework: self.config.framework.clone(),
            run_id: self.run_id,
            total_epochs: totals.max_epoch.unwrap_or(0),
            total_steps: totals.total_appended,
            best_metrics: totals.best,
            started_at,
            ended_at,
            training_duration_secs: started_at
                .zip(ended_at)
                .map(|(start, end)| seconds_between(start, end)),
        }
    }

    /// Render plots (fail-open) and write the JSON report
    ///
    /// Without an explicit path the report lands at
    /// `<log_dir>/<experiment>_report_<YYYYmmdd_HHMMSS>.json`.
    pub async fn save_report(&self, path: Option<&Path>) -> Result<PathBuf> {
        let summary = self.summary();
        let table = self.store.as_table();
        let plots_dir = self.config.log_dir.join("plots");

        let path = match path {
            Some(path) => path.to_path_buf(),
            None => self.config.log_dir.join(format!(
                "{}_report_{}.json",
                self.config.experiment_name,
                Utc::now().format("%Y%m%d_%H%M%S")
            )),
        };

        async {
            if let Some(plotter) = &self.plotter {
                if let Some(files) = fail_open("plot rendering", || plotter.render(&table, &plots_dir)).await
                {
                    debug!("Rendered {} plots", files.len());
                }
            }

            let report = TrainingReport {
                summary,
                metrics: table.into_rows(),
                config: self.config.clone(),
                plots_directory: plots_dir.display().to_string(),
            };

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).await?;
                }
            }
            fs::write(&path, serde_json::to_string_pretty(&report)?).await?;

            info!("Training report saved to {}", path.display());
            Ok::<_, TrackError>(path)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Whether any callback has requested a stop
    pub fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}
