//! Unified error types for mltrack

use thiserror::Error;

/// Unified error type for all tracking operations
#[derive(Error, Debug)]
pub enum TrackError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Snapshot errors
    #[error("Metric name '{0}' is reserved for a fixed snapshot field")]
    ReservedMetricName(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // Sink errors
    #[error("Sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },

    // Lifecycle errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Plot error: {0}")]
    Plot(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl TrackError {
    /// Build a sink error from a sink name and any displayable cause
    pub fn sink(sink: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias using TrackError
pub type Result<T> = std::result::Result<T, TrackError>;
