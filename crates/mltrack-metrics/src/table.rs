//! Row-oriented view over retained snapshots

use chrono::{DateTime, Utc};
use mltrack_core::float_serde::{nan_from_null, nan_map_from_null};
use mltrack_core::{MetricSnapshot, FIXED_FIELDS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One flattened snapshot
///
/// Optional fixed fields serialize as `null` when unreported. Extra metrics are
/// flattened into the row and only present when that snapshot reported them.
/// A NaN loss or extra is written as `null` and reads back as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub epoch: u64,
    pub step: u64,
    #[serde(deserialize_with = "nan_from_null")]
    pub loss: f64,
    pub accuracy: Option<f64>,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    pub learning_rate: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten, deserialize_with = "nan_map_from_null")]
    pub extra: BTreeMap<String, f64>,
}

impl MetricRow {
    /// Numeric cell for a column, `None` when absent
    pub fn get(&self, column: &str) -> Option<f64> {
        match column {
            "epoch" => Some(self.epoch as f64),
            "step" => Some(self.step as f64),
            "loss" => Some(self.loss),
            "accuracy" => self.accuracy,
            "val_loss" => self.val_loss,
            "val_accuracy" => self.val_accuracy,
            "learning_rate" => self.learning_rate,
            other => self.extra.get(other).copied(),
        }
    }
}

impl From<&MetricSnapshot> for MetricRow {
    fn from(snapshot: &MetricSnapshot) -> Self {
        Self {
            epoch: snapshot.epoch(),
            step: snapshot.step(),
            loss: snapshot.loss(),
            accuracy: snapshot.accuracy(),
            val_loss: snapshot.val_loss(),
            val_accuracy: snapshot.val_accuracy(),
            learning_rate: snapshot.learning_rate(),
            timestamp: snapshot.timestamp(),
            extra: snapshot.extra().clone(),
        }
    }
}

/// Materialized table of retained snapshots, oldest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsTable {
    rows: Vec<MetricRow>,
}

impl MetricsTable {
    pub fn from_snapshots(snapshots: &[MetricSnapshot]) -> Self {
        Self {
            rows: snapshots.iter().map(MetricRow::from).collect(),
        }
    }

    /// Rebuild a table from rows read back out of a report
    pub fn from_rows(rows: Vec<MetricRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<MetricRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fixed columns followed by the sorted union of extra metric names
    pub fn columns(&self) -> Vec<String> {
        let extras: BTreeSet<&str> = self
            .rows
            .iter()
            .flat_map(|row| row.extra.keys().map(String::as_str))
            .collect();

        FIXED_FIELDS
            .iter()
            .copied()
            .chain(extras)
            .map(str::to_string)
            .collect()
    }

    /// One column across all rows; rows lacking the metric yield `None`
    pub fn column(&self, name: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| row.get(name)).collect()
    }

    /// True when at least one row reported the metric
    pub fn has_values(&self, name: &str) -> bool {
        self.rows.iter().any(|row| row.get(name).is_some())
    }

    pub fn steps(&self) -> Vec<u64> {
        self.rows.iter().map(|row| row.step).collect()
    }
}
