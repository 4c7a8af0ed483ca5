//! # mltrack-core
//!
//! Core types for the mltrack training tracker.
//!
//! ## Core Paradigm
//!
//! - A training run is a stream of immutable [`MetricSnapshot`]s
//! - Best values are a lifetime aggregate, never recomputed from retained history
//! - Configuration is a value object fixed when the tracker is built
//! - Telemetry is fail-open: sinks, plots and cleanup never abort training

pub mod config;
mod error;
pub mod fail_open;
pub mod float_serde;
mod types;

pub use config::{EarlyStoppingMode, TrackingConfig};
pub use error::{Result, TrackError};
pub use types::*;
