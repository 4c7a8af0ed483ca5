//! # mltrack-tracker
//!
//! Orchestration for training runs: ingest snapshots, notify lifecycle
//! policies, fan out to sinks, and produce summaries, plots and reports.
//!
//! ## Flow
//!
//! ```text
//! log_metrics ──> MetricsStore::append ──> sinks (fail-open)
//! on_epoch_end ─> log_metrics ──> callbacks in order (early stopping, checkpoints, ...)
//! save_report ──> summary + table + plots ──> <log_dir>/<experiment>_report_<ts>.json
//! ```

pub mod adapter;
mod callbacks;
pub mod checkpoint;
mod early_stopping;
pub mod plots;
pub mod report;
mod tracker;

pub use adapter::{snapshot_from_logs, LoopAdapter};
pub use callbacks::{CallbackPipeline, CallbackSignal, TrainingCallback};
pub use checkpoint::{ArtifactStore, CheckpointPolicy, CheckpointRecord, DirectoryStore};
pub use early_stopping::{EarlyStopping, StoppingState};
pub use plots::{PlotRenderer, SvgPlotRenderer};
pub use report::{RunComparison, TrainingReport, TrainingSummary};
pub use tracker::{EpochOutcome, Tracker, TrackerBuilder};
