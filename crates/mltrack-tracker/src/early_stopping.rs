//! Early stopping policy
//!
//! Pure state machine with two states: `Active` and `Stopped` (terminal).
//! Stopping is advisory; the tracker latches the signal and the training loop
//! decides whether to halt.

use async_trait::async_trait;
use mltrack_core::{EarlyStoppingMode, MetricSnapshot, Result};
use tracing::{debug, info};

use crate::callbacks::{CallbackSignal, TrainingCallback};

/// Early stopping state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppingState {
    /// Still watching for improvement
    Active,
    /// Patience exhausted
    Stopped,
}

/// Stops training after `patience` epochs without strict improvement
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: String,
    mode: EarlyStoppingMode,
    patience: usize,
    best: f64,
    wait: usize,
    state: StoppingState,
}

impl EarlyStopping {
    /// Watch `monitor` (any snapshot metric name) in the given direction
    pub fn new(monitor: impl Into<String>, mode: EarlyStoppingMode, patience: usize) -> Self {
        Self {
            monitor: monitor.into(),
            mode,
            patience,
            best: match mode {
                EarlyStoppingMode::Min => f64::INFINITY,
                EarlyStoppingMode::Max => f64::NEG_INFINITY,
            },
            wait: 0,
            state: StoppingState::Active,
        }
    }

    /// Feed one monitored value; `None` leaves the state untouched
    pub fn observe(&mut self, value: Option<f64>) -> StoppingState {
        let Some(value) = value else {
            return self.state;
        };
        if self.state == StoppingState::Stopped {
            return self.state;
        }

        let improved = match self.mode {
            EarlyStoppingMode::Min => value < self.best,
            EarlyStoppingMode::Max => value > self.best,
        };

        if improved {
            self.best = value;
            self.wait = 0;
        } else {
            self.wait += 1;
            if self.wait >= self.patience {
                self.state = StoppingState::Stopped;
            }
        }

        self.state
    }

    pub fn state(&self) -> StoppingState {
        self.state
    }

    pub fn should_stop(&self) -> bool {
        self.state == StoppingState::Stopped
    }

    /// Best monitored value so far (±infinity before the first observation)
    pub fn best_value(&self) -> f64 {
        self.best
    }

    /// Consecutive non-improving observations
    pub fn wait_count(&self) -> usize {
        self.wait
    }

    pub fn monitor(&self) -> &str {
        &self.monitor
    }
}

#[async_trait]
impl TrainingCallback for EarlyStopping {
    fn name(&self) -> &str {
        "early_stopping"
    }

    async fn on_epoch_end(
        &mut self,
        epoch: u64,
        snapshot: &MetricSnapshot,
    ) -> Result<CallbackSignal> {
        let value = snapshot.get(&self.monitor);
        if value.is_none() {
            debug!("Early stopping: {} absent at epoch {}", self.monitor, epoch);
        }

        let was_active = self.state == StoppingState::Active;
        match self.observe(value) {
            StoppingState::Stopped => {
                if was_active {
                    info!(
                        "Early stopping triggered after {} epochs ({} best={})",
                        epoch, self.monitor, self.best
                    );
                }
                Ok(CallbackSignal::StopTraining)
            }
            StoppingState::Active => Ok(CallbackSignal::Continue),
        }
    }
}
