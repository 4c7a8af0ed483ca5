//! # mltrack-metrics
//!
//! Metrics storage and telemetry fan-out for training runs.
//!
//! This crate provides:
//! - A bounded, thread-safe snapshot store with lifetime best values
//! - Row-oriented table views over retained history
//! - Sinks that mirror scalars to external experiment dashboards

mod sink;
mod store;
mod table;

pub use sink::{MetricSink, RunHistorySink, ScalarEventSink};
pub use store::{MetricsStore, StoreTotals};
pub use mltrack_core::FIXED_FIELDS;
pub use table::{MetricRow, MetricsTable};
