//! Lifecycle callbacks run at epoch and training end
//!
//! Callbacks are fail-open: an error from one is logged and the remaining
//! callbacks still run in registration order.

use async_trait::async_trait;
use mltrack_core::{MetricSnapshot, Result};
use tracing::{debug, info, warn};

/// What a callback asks of the training loop after an epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallbackSignal {
    #[default]
    Continue,
    /// Advisory: the caller decides whether to actually halt
    StopTraining,
}

/// Trait for lifecycle policies (early stopping, checkpointing, ...)
#[async_trait]
pub trait TrainingCallback: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Called after each epoch-end snapshot has been logged
    async fn on_epoch_end(&mut self, epoch: u64, snapshot: &MetricSnapshot)
        -> Result<CallbackSignal>;

    /// Called once when training ends, with the last logged snapshot if any
    async fn on_training_end(&mut self, _final_snapshot: Option<&MetricSnapshot>) -> Result<()> {
        Ok(())
    }
}

/// Ordered list of callbacks
pub struct CallbackPipeline {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CallbackPipeline {
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add(&mut self, callback: Box<dyn TrainingCallback>) {
        debug!("Registered callback {}", callback.name());
        self.callbacks.push(callback);
    }

    /// Run every epoch-end hook in order (fail-open)
    ///
    /// Returns `StopTraining` if any callback asked for it.
    pub async fn epoch_end(&mut self, epoch: u64, snapshot: &MetricSnapshot) -> CallbackSignal {
        let mut signal = CallbackSignal::Continue;

        for callback in self.callbacks.iter_mut() {
            match callback.on_epoch_end(epoch, snapshot).await {
                Ok(CallbackSignal::StopTraining) => {
                    info!("Callback {} requested stop at epoch {}", callback.name(), epoch);
                    signal = CallbackSignal::StopTraining;
                }
                Ok(CallbackSignal::Continue) => {}
                Err(e) => {
                    warn!(
                        "Callback {} failed at epoch {} (continuing): {}",
                        callback.name(),
                        epoch,
                        e
                    );
                }
            }
        }

        signal
    }

    /// Run every training-end hook in order (fail-open)
    pub async fn training_end(&mut self, final_snapshot: Option<&MetricSnapshot>) {
        for callback in self.callbacks.iter_mut() {
            if let Err(e) = callback.on_training_end(final_snapshot).await {
                warn!(
                    "Callback {} failed at training end (continuing): {}",
                    callback.name(),
                    e
                );
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.callbacks.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl Default for CallbackPipeline {
    fn default() -> Self {
        Self::new()
    }
}
