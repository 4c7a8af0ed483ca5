//! Integration tests for the tracker lifecycle.
//!
//! These drive a full tracker against a temporary directory: ingestion,
//! sink fan-out, callbacks, checkpointing and the JSON report.

use async_trait::async_trait;
use mltrack_core::{EarlyStoppingMode, MetricSnapshot, Result, TrackError, TrackingConfig};
use mltrack_metrics::MetricSink;
use mltrack_tracker::{TrainingReport, Tracker};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir, name: &str) -> TrackingConfig {
    TrackingConfig {
        log_dir: dir.path().join("logs"),
        checkpoint_dir: dir.path().join("checkpoints"),
        enable_tensorboard: false,
        enable_plots: false,
        ..TrackingConfig::new(name)
    }
}

/// Sink that counts calls and optionally fails every emit
#[derive(Clone, Default)]
struct CountingSink {
    fail: bool,
    emits: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl MetricSink for CountingSink {
    fn name(&self) -> &str {
        if self.fail {
            "broken"
        } else {
            "counting"
        }
    }

    async fn emit(&self, _snapshot: &MetricSnapshot) -> Result<()> {
        self.emits.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TrackError::sink("broken", "dashboard unreachable"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_summary_counts_past_eviction() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::new(TrackingConfig {
        metric_history_size: 3,
        ..config(&dir, "eviction")
    })
    .await
    .unwrap();

    // Epochs arrive out of order; the best loss is in the first, soon-evicted snapshot
    for (step, epoch) in [(0, 2), (1, 7), (2, 3), (3, 5), (4, 1)] {
        let loss = if step == 0 { 0.01 } else { 1.0 };
        tracker.log_metrics(MetricSnapshot::new(epoch, step, loss)).await;
    }

    let summary = tracker.summary();
    assert_eq!(summary.total_epochs, 7);
    assert_eq!(summary.total_steps, 5);
    assert_eq!(summary.best_metrics.best_loss.unwrap().value, 0.01);
    assert_eq!(tracker.store().len(), 3);
}

#[tokio::test]
async fn test_failing_sink_does_not_block_others() {
    let dir = TempDir::new().unwrap();
    let broken = CountingSink {
        fail: true,
        ..Default::default()
    };
    let healthy = CountingSink::default();

    let tracker = Tracker::builder(config(&dir, "sinks"))
        .without_default_sinks()
        .with_sink(broken.clone())
        .with_sink(healthy.clone())
        .build()
        .await
        .unwrap();

    for step in 0..4 {
        tracker.log_metrics(MetricSnapshot::new(0, step, 0.5)).await;
    }
    tracker.end_training().await;
    tracker.end_training().await;

    assert_eq!(tracker.store().total_appended(), 4);
    assert_eq!(broken.emits.load(Ordering::SeqCst), 4);
    assert_eq!(healthy.emits.load(Ordering::SeqCst), 4);
    assert_eq!(broken.closes.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_report_shape() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::new(config(&dir, "report")).await.unwrap();

    tracker.start_training().await.unwrap();
    tracker.log_metrics(MetricSnapshot::new(0, 0, 0.9)).await;
    tracker
        .log_metrics(
            MetricSnapshot::builder(1, 1, 0.7)
                .accuracy(0.6)
                .extra("grad_norm", 1.5)
                .build()
                .unwrap(),
        )
        .await;
    tracker.end_training().await;

    let path = dir.path().join("out").join("report.json");
    assert_eq!(tracker.save_report(Some(path.as_path())).await.unwrap(), path);

    let json: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for key in ["summary", "metrics", "config", "plots_directory"] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert!(json["metrics"][0]["accuracy"].is_null());
    assert_eq!(json["metrics"][1]["grad_norm"], 1.5);
    assert_eq!(json["summary"]["best_metrics"]["best_accuracy"]["value"], 0.6);

    let report = TrainingReport::load(&path).await.unwrap();
    assert_eq!(report.summary.total_steps, 2);
    assert!(report.summary.training_duration_secs.is_some());
    assert_eq!(report.metrics.len(), 2);
}

#[tokio::test]
async fn test_report_with_nan_reloads() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::new(config(&dir, "diverged")).await.unwrap();

    tracker.log_metrics(MetricSnapshot::new(0, 0, 0.8)).await;
    tracker
        .log_metrics(
            MetricSnapshot::builder(0, 1, f64::NAN)
                .extra("grad_norm", f64::NAN)
                .build()
                .unwrap(),
        )
        .await;

    let path = tracker.save_report(None).await.unwrap();
    let json: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(json["metrics"][1]["loss"].is_null());

    let report = TrainingReport::load(&path).await.unwrap();
    assert_eq!(report.metrics.len(), 2);
    assert_eq!(report.metrics[0].loss, 0.8);
    assert!(report.metrics[1].loss.is_nan());
    assert!(report.metrics[1].extra["grad_norm"].is_nan());
    assert_eq!(report.summary.best_metrics.best_loss.unwrap().value, 0.8);
}

#[tokio::test]
async fn test_default_report_path_and_plots() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::new(TrackingConfig {
        enable_plots: true,
        ..config(&dir, "plotted")
    })
    .await
    .unwrap();

    for step in 0..10 {
        tracker
            .log_metrics(
                MetricSnapshot::builder(step / 2, step, 1.0 / (step + 1) as f64)
                    .accuracy(0.5)
                    .build()
                    .unwrap(),
            )
            .await;
    }

    let path = tracker.save_report(None).await.unwrap();
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("plotted_report_"));
    assert!(file_name.ends_with(".json"));
    assert_eq!(path.parent().unwrap(), dir.path().join("logs"));

    let plots = dir.path().join("logs").join("plots");
    assert!(plots.join("loss.svg").exists());
    assert!(plots.join("accuracy.svg").exists());
    assert!(!plots.join("accuracy_correlation.svg").exists());
}

#[tokio::test]
async fn test_concurrent_logging() {
    let dir = TempDir::new().unwrap();
    let tracker = Arc::new(
        Tracker::new(TrackingConfig {
            metric_history_size: 50,
            ..config(&dir, "concurrent")
        })
        .await
        .unwrap(),
    );

    let mut handles = Vec::new();
    for worker in 0..4u64 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            for i in 0..25u64 {
                let step = worker * 25 + i;
                let loss = 1.0 + step as f64;
                tracker.log_metrics(MetricSnapshot::new(0, step, loss)).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let summary = tracker.summary();
    assert_eq!(summary.total_steps, 100);
    assert_eq!(summary.best_metrics.best_loss.unwrap().value, 1.0);
    assert_eq!(tracker.store().len(), 50);
}

#[tokio::test]
async fn test_early_stop_latches() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::new(TrackingConfig {
        early_stopping_patience: 2,
        early_stopping_monitor: "val_loss".to_string(),
        early_stopping_mode: EarlyStoppingMode::Min,
        ..config(&dir, "early")
    })
    .await
    .unwrap();

    let series = [1.0, 0.9, 0.95, 0.97, 1.0];
    let mut outcomes = Vec::new();
    for (epoch, val_loss) in series.iter().enumerate() {
        let epoch = epoch as u64 + 1;
        let snapshot = MetricSnapshot::builder(epoch, epoch * 10, 0.5)
            .val_loss(*val_loss)
            .build()
            .unwrap();
        outcomes.push(tracker.on_epoch_end(epoch, snapshot).await.should_stop);
    }

    assert_eq!(outcomes, vec![false, false, false, true, true]);
    assert!(tracker.should_stop());
}

#[tokio::test]
async fn test_checkpoints_are_pruned() {
    let dir = TempDir::new().unwrap();
    let tracker = Tracker::new(TrackingConfig {
        save_frequency: 2,
        max_checkpoints: 2,
        ..config(&dir, "checkpoints")
    })
    .await
    .unwrap();

    for epoch in 1..=6u64 {
        tracker
            .on_epoch_end(epoch, MetricSnapshot::new(epoch, epoch * 10, 0.5))
            .await;
    }

    let mut names: Vec<String> = std::fs::read_dir(dir.path().join("checkpoints"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("checkpoint_epoch_4_"));
    assert!(names[1].starts_with("checkpoint_epoch_6_"));
}

#[tokio::test]
async fn test_invalid_config_fails_at_build() {
    let dir = TempDir::new().unwrap();
    let result = Tracker::new(TrackingConfig {
        metric_history_size: 0,
        ..config(&dir, "invalid")
    })
    .await;

    assert!(matches!(result, Err(TrackError::Config(_))));
    assert!(!dir.path().join("logs").exists());
}
