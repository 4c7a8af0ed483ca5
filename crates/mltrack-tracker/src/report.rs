//! Training summaries, JSON reports and run comparison

use chrono::{DateTime, Utc};
use mltrack_core::{BestValues, Result, TrackingConfig};
use mltrack_metrics::MetricRow;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Read-only projection of a tracker's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub experiment_name: String,
    pub model_name: String,
    pub framework: String,
    pub run_id: Uuid,
    /// Highest epoch value seen (0 if none); not a count of epoch-end calls
    pub total_epochs: u64,
    /// Snapshots ingested over the tracker's lifetime, including evicted ones
    pub total_steps: u64,
    pub best_metrics: BestValues,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub training_duration_secs: Option<f64>,
}

/// One JSON document written by `Tracker::save_report`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub summary: TrainingSummary,
    pub metrics: Vec<MetricRow>,
    pub config: TrackingConfig,
    pub plots_directory: String,
}

impl TrainingReport {
    /// Read a report previously written to disk
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Side-by-side comparison of two runs' summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunComparison {
    pub first: String,
    pub second: String,
    /// `second.best_loss - first.best_loss`, when both runs reported a loss
    pub best_loss_delta: Option<f64>,
    /// `second.best_accuracy - first.best_accuracy`, when both reported accuracy
    pub best_accuracy_delta: Option<f64>,
    pub first_duration_secs: Option<f64>,
    pub second_duration_secs: Option<f64>,
    /// Name of the run with the lower best loss (`None` on a tie or missing data)
    pub better_on_loss: Option<String>,
}

impl RunComparison {
    pub fn between(first: &TrainingSummary, second: &TrainingSummary) -> Self {
        let best = |s: &TrainingSummary| s.best_metrics.best_loss.map(|b| b.value);
        let best_acc = |s: &TrainingSummary| s.best_metrics.best_accuracy.map(|b| b.value);

        let best_loss_delta = best(first).zip(best(second)).map(|(a, b)| b - a);
        let best_accuracy_delta = best_acc(first).zip(best_acc(second)).map(|(a, b)| b - a);

        let better_on_loss = best_loss_delta.and_then(|delta| {
            if delta > 0.0 {
                Some(first.experiment_name.clone())
            } else if delta < 0.0 {
                Some(second.experiment_name.clone())
            } else {
                None
            }
        });

        Self {
            first: first.experiment_name.clone(),
            second: second.experiment_name.clone(),
            best_loss_delta,
            best_accuracy_delta,
            first_duration_secs: first.training_duration_secs,
            second_duration_secs: second.training_duration_secs,
            better_on_loss,
        }
    }
}

impl std::fmt::Display for RunComparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let opt = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| format!("{:+.4}", v));
        let secs = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| format!("{:.1}s", v));

        writeln!(f, "{} vs {}", self.first, self.second)?;
        writeln!(f, "  best loss delta:     {}", opt(self.best_loss_delta))?;
        writeln!(f, "  best accuracy delta: {}", opt(self.best_accuracy_delta))?;
        writeln!(
            f,
            "  durations:           {} / {}",
            secs(self.first_duration_secs),
            secs(self.second_duration_secs)
        )?;
        write!(
            f,
            "  better on loss:      {}",
            self.better_on_loss.as_deref().unwrap_or("tie")
        )
    }
}
