//! Framework-neutral training loop adapter
//!
//! Training frameworks report metrics as flat `name -> value` maps. This
//! module maps those onto snapshots and drives a shared [`Tracker`].

use mltrack_core::{MetricSnapshot, Result, TrackError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::tracker::{EpochOutcome, Tracker};

// Accepted spellings, first match wins
const ACCURACY_KEYS: &[&str] = &["accuracy", "acc"];
const VAL_ACCURACY_KEYS: &[&str] = &["val_accuracy", "val_acc"];
const LEARNING_RATE_KEYS: &[&str] = &["learning_rate", "lr"];

fn first_of(logs: &HashMap<String, f64>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| logs.get(*key).copied())
}

/// Build a snapshot from framework logs
///
/// `loss` is required. Aliases (`acc`, `val_acc`, `lr`) map onto the fixed
/// fields and every other key becomes an extra metric.
pub fn snapshot_from_logs(epoch: u64, step: u64, logs: &HashMap<String, f64>) -> Result<MetricSnapshot> {
    let loss = logs
        .get("loss")
        .copied()
        .ok_or_else(|| TrackError::MissingField("loss".to_string()))?;

    let mut builder = MetricSnapshot::builder(epoch, step, loss);
    if let Some(v) = first_of(logs, ACCURACY_KEYS) {
        builder = builder.accuracy(v);
    }
    if let Some(v) = logs.get("val_loss") {
        builder = builder.val_loss(*v);
    }
    if let Some(v) = first_of(logs, VAL_ACCURACY_KEYS) {
        builder = builder.val_accuracy(v);
    }
    if let Some(v) = first_of(logs, LEARNING_RATE_KEYS) {
        builder = builder.learning_rate(v);
    }

    let known = ["loss", "val_loss"]
        .iter()
        .chain(ACCURACY_KEYS)
        .chain(VAL_ACCURACY_KEYS)
        .chain(LEARNING_RATE_KEYS)
        .copied()
        .collect::<Vec<_>>();
    let extras = logs
        .iter()
        .filter(|(name, _)| !known.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), *value));

    builder.extras(extras).build()
}

/// Drives a shared tracker from a training loop, numbering steps itself
pub struct LoopAdapter {
    tracker: Arc<Tracker>,
    step: AtomicU64,
}

impl LoopAdapter {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self {
            tracker,
            step: AtomicU64::new(0),
        }
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Steps logged so far
    pub fn steps(&self) -> u64 {
        self.step.load(Ordering::SeqCst)
    }

    /// Log one batch and advance the step counter
    pub async fn log_step(&self, epoch: u64, loss: f64, learning_rate: Option<f64>) -> Result<()> {
        let step = self.step.fetch_add(1, Ordering::SeqCst);
        let mut builder = MetricSnapshot::builder(epoch, step, loss);
        if let Some(lr) = learning_rate {
            builder = builder.learning_rate(lr);
        }
        self.tracker.log_metrics(builder.build()?).await;
        Ok(())
    }

    /// Forward epoch-end logs to the tracker's callbacks
    ///
    /// The epoch-end snapshot takes its own step number.
    pub async fn end_epoch(&self, epoch: u64, logs: &HashMap<String, f64>) -> Result<EpochOutcome> {
        let step = self.step.fetch_add(1, Ordering::SeqCst);
        let snapshot = snapshot_from_logs(epoch, step, logs)?;
        Ok(self.tracker.on_epoch_end(epoch, snapshot).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mltrack_core::TrackingConfig;
    use tempfile::TempDir;

    fn logs(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_aliases_map_to_fixed_fields() {
        let snapshot = snapshot_from_logs(
            2,
            40,
            &logs(&[("loss", 0.4), ("acc", 0.8), ("val_acc", 0.75), ("lr", 0.01)]),
        )
        .unwrap();

        assert_eq!(snapshot.accuracy(), Some(0.8));
        assert_eq!(snapshot.val_accuracy(), Some(0.75));
        assert_eq!(snapshot.learning_rate(), Some(0.01));
        assert!(snapshot.extra().is_empty());
    }

    #[test]
    fn test_unknown_keys_become_extras() {
        let snapshot =
            snapshot_from_logs(0, 0, &logs(&[("loss", 1.0), ("f1", 0.3), ("val_loss", 1.2)])).unwrap();

        assert_eq!(snapshot.val_loss(), Some(1.2));
        assert_eq!(snapshot.extra().get("f1"), Some(&0.3));
        assert_eq!(snapshot.extra().len(), 1);
    }

    #[test]
    fn test_missing_loss() {
        let err = snapshot_from_logs(0, 0, &logs(&[("accuracy", 0.5)])).unwrap_err();
        assert!(matches!(err, TrackError::MissingField(field) if field == "loss"));
    }

    #[tokio::test]
    async fn test_adapter_numbers_steps() {
        let dir = TempDir::new().unwrap();
        let config = TrackingConfig {
            log_dir: dir.path().join("logs"),
            checkpoint_dir: dir.path().join("ckpt"),
            enable_tensorboard: false,
            enable_plots: false,
            ..TrackingConfig::new("adapter")
        };
        let adapter = LoopAdapter::new(Arc::new(Tracker::new(config).await.unwrap()));

        for batch in 0..3 {
            adapter.log_step(0, 1.0 - batch as f64 * 0.1, Some(0.01)).await.unwrap();
        }
        let outcome = adapter
            .end_epoch(0, &logs(&[("loss", 0.7), ("val_loss", 0.8)]))
            .await
            .unwrap();

        assert!(!outcome.should_stop);
        let store = adapter.tracker().store();
        assert_eq!(store.total_appended(), 4);
        assert_eq!(store.latest().unwrap().step(), 3);

        // The next batch continues after the epoch-end row
        adapter.log_step(1, 0.6, None).await.unwrap();
        let steps = store.as_table().steps();
        assert_eq!(steps, vec![0, 1, 2, 3, 4]);
        assert_eq!(adapter.steps(), 5);
    }
}
