//! Core type definitions for training metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::float_serde::{nan_from_null, nan_map_from_null};
use crate::{Result, TrackError};

/// Column names owned by the fixed snapshot fields.
///
/// Extra metrics may not reuse these: tabular flattening merges both into one row.
pub const FIXED_FIELDS: [&str; 8] = [
    "epoch",
    "step",
    "loss",
    "accuracy",
    "val_loss",
    "val_accuracy",
    "learning_rate",
    "timestamp",
];

/// Returns true when `name` belongs to a fixed snapshot field
pub fn is_reserved_metric_name(name: &str) -> bool {
    FIXED_FIELDS.contains(&name)
}

fn check_extras(extra: &BTreeMap<String, f64>) -> Result<()> {
    match extra.keys().find(|k| is_reserved_metric_name(k)) {
        Some(name) => Err(TrackError::ReservedMetricName(name.clone())),
        None => Ok(()),
    }
}

/// One observation of training metrics at a point in training
///
/// Deserialization applies the same extra-name validation as the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotFields")]
pub struct MetricSnapshot {
    epoch: u64,
    step: u64,
    loss: f64,
    accuracy: Option<f64>,
    val_loss: Option<f64>,
    val_accuracy: Option<f64>,
    learning_rate: Option<f64>,
    timestamp: DateTime<Utc>,
    extra: BTreeMap<String, f64>,
}

impl MetricSnapshot {
    /// Snapshot with only the required fields, stamped now
    pub fn new(epoch: u64, step: u64, loss: f64) -> Self {
        Self {
            epoch,
            step,
            loss,
            accuracy: None,
            val_loss: None,
            val_accuracy: None,
            learning_rate: None,
            timestamp: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    /// Start a builder for a snapshot with optional and extra metrics
    pub fn builder(epoch: u64, step: u64, loss: f64) -> MetricSnapshotBuilder {
        MetricSnapshotBuilder {
            snapshot: Self::new(epoch, step, loss),
            timestamp: None,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn loss(&self) -> f64 {
        self.loss
    }

    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    pub fn val_loss(&self) -> Option<f64> {
        self.val_loss
    }

    pub fn val_accuracy(&self) -> Option<f64> {
        self.val_accuracy
    }

    pub fn learning_rate(&self) -> Option<f64> {
        self.learning_rate
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn extra(&self) -> &BTreeMap<String, f64> {
        &self.extra
    }

    /// Look up a scalar by its canonical name (fixed field or extra metric)
    ///
    /// Returns `None` when the metric was not reported in this snapshot.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "loss" => Some(self.loss),
            "accuracy" => self.accuracy,
            "val_loss" => self.val_loss,
            "val_accuracy" => self.val_accuracy,
            "learning_rate" => self.learning_rate,
            "epoch" => Some(self.epoch as f64),
            "step" => Some(self.step as f64),
            other => self.extra.get(other).copied(),
        }
    }

    /// Present scalar metrics in fixed order, extras last. Absent fields are skipped.
    pub fn scalars(&self) -> Vec<(&str, f64)> {
        let fixed = [
            ("loss", Some(self.loss)),
            ("accuracy", self.accuracy),
            ("val_loss", self.val_loss),
            ("val_accuracy", self.val_accuracy),
            ("learning_rate", self.learning_rate),
        ];

        fixed
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), *v)))
            .collect()
    }
}

/// Builder for [`MetricSnapshot`]
///
/// Snapshots are immutable once built; extra metrics are attached here.
#[derive(Debug, Clone)]
pub struct MetricSnapshotBuilder {
    snapshot: MetricSnapshot,
    timestamp: Option<DateTime<Utc>>,
}

impl MetricSnapshotBuilder {
    pub fn accuracy(mut self, value: f64) -> Self {
        self.snapshot.accuracy = Some(value);
        self
    }

    pub fn val_loss(mut self, value: f64) -> Self {
        self.snapshot.val_loss = Some(value);
        self
    }

    pub fn val_accuracy(mut self, value: f64) -> Self {
        self.snapshot.val_accuracy = Some(value);
        self
    }

    pub fn learning_rate(mut self, value: f64) -> Self {
        self.snapshot.learning_rate = Some(value);
        self
    }

    /// Override the capture time (defaults to build time)
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach a custom metric
    pub fn extra(mut self, name: impl Into<String>, value: f64) -> Self {
        self.snapshot.extra.insert(name.into(), value);
        self
    }

    /// Attach several custom metrics at once
    pub fn extras<I, K>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.snapshot
            .extra
            .extend(metrics.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    /// Finish the snapshot, rejecting extras that shadow a fixed field
    pub fn build(self) -> Result<MetricSnapshot> {
        check_extras(&self.snapshot.extra)?;

        let mut snapshot = self.snapshot;
        snapshot.timestamp = self.timestamp.unwrap_or_else(Utc::now);
        Ok(snapshot)
    }
}

/// Wire form of a snapshot, validated on the way in
#[derive(Deserialize)]
struct SnapshotFields {
    epoch: u64,
    step: u64,
    #[serde(deserialize_with = "nan_from_null")]
    loss: f64,
    accuracy: Option<f64>,
    val_loss: Option<f64>,
    val_accuracy: Option<f64>,
    learning_rate: Option<f64>,
    timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "nan_map_from_null")]
    extra: BTreeMap<String, f64>,
}

impl TryFrom<SnapshotFields> for MetricSnapshot {
    type Error = TrackError;

    fn try_from(fields: SnapshotFields) -> Result<Self> {
        check_extras(&fields.extra)?;
        Ok(Self {
            epoch: fields.epoch,
            step: fields.step,
            loss: fields.loss,
            accuracy: fields.accuracy,
            val_loss: fields.val_loss,
            val_accuracy: fields.val_accuracy,
            learning_rate: fields.learning_rate,
            timestamp: fields.timestamp,
            extra: fields.extra,
        })
    }
}

/// Best observed value of one metric and where it occurred
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestValue {
    pub value: f64,
    pub epoch: u64,
    pub step: u64,
}

/// Running best-value aggregate over every snapshot ever observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BestValues {
    /// Minimum training loss
    pub best_loss: Option<BestValue>,
    /// Maximum training accuracy
    pub best_accuracy: Option<BestValue>,
}

impl BestValues {
    /// Fold a snapshot into the aggregate.
    ///
    /// Loss replaces on strictly-less, accuracy on strictly-greater; ties keep the
    /// first occurrence. Absent and NaN values never participate.
    pub fn observe(&mut self, snapshot: &MetricSnapshot) {
        let at = |value: f64| BestValue {
            value,
            epoch: snapshot.epoch,
            step: snapshot.step,
        };

        let loss = snapshot.loss;
        if !loss.is_nan() && self.best_loss.map_or(true, |best| loss < best.value) {
            self.best_loss = Some(at(loss));
        }

        if let Some(accuracy) = snapshot.accuracy.filter(|a| !a.is_nan()) {
            if self
                .best_accuracy
                .map_or(true, |best| accuracy > best.value)
            {
                self.best_accuracy = Some(at(accuracy));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_optional_fields() {
        let snapshot = MetricSnapshot::builder(1, 10, 0.5)
            .accuracy(0.85)
            .val_loss(0.4)
            .learning_rate(0.001)
            .extra("f1_score", 0.88)
            .build()
            .unwrap();

        assert_eq!(snapshot.epoch(), 1);
        assert_eq!(snapshot.accuracy(), Some(0.85));
        assert_eq!(snapshot.val_accuracy(), None);
        assert_eq!(snapshot.get("f1_score"), Some(0.88));
        assert_eq!(snapshot.get("recall"), None);
    }

    #[test]
    fn test_builder_rejects_reserved_extra() {
        let err = MetricSnapshot::builder(0, 0, 1.0)
            .extra("val_loss", 0.3)
            .build()
            .unwrap_err();

        assert!(matches!(err, TrackError::ReservedMetricName(name) if name == "val_loss"));
    }

    #[test]
    fn test_scalars_skip_absent_but_keep_zero() {
        let snapshot = MetricSnapshot::builder(0, 0, 0.7)
            .accuracy(0.0)
            .extra("grad_norm", 2.5)
            .build()
            .unwrap();

        let scalars = snapshot.scalars();
        assert_eq!(
            scalars,
            vec![("loss", 0.7), ("accuracy", 0.0), ("grad_norm", 2.5)]
        );
    }

    #[test]
    fn test_best_values_ties_keep_first() {
        let mut best = BestValues::default();
        best.observe(&MetricSnapshot::builder(0, 1, 0.5).accuracy(0.9).build().unwrap());
        best.observe(&MetricSnapshot::builder(1, 2, 0.5).accuracy(0.9).build().unwrap());

        assert_eq!(best.best_loss.unwrap().step, 1);
        assert_eq!(best.best_accuracy.unwrap().step, 1);
    }

    #[test]
    fn test_best_values_ignore_absent_accuracy() {
        let mut best = BestValues::default();
        best.observe(&MetricSnapshot::new(0, 0, 1.0));
        assert!(best.best_accuracy.is_none());

        best.observe(&MetricSnapshot::builder(0, 1, 2.0).accuracy(0.3).build().unwrap());
        best.observe(&MetricSnapshot::new(0, 2, 3.0));

        let accuracy = best.best_accuracy.unwrap();
        assert_eq!(accuracy.value, 0.3);
        assert_eq!(accuracy.step, 1);
        assert_eq!(best.best_loss.unwrap().value, 1.0);
    }

    #[test]
    fn test_best_values_ignore_nan() {
        let mut best = BestValues::default();
        best.observe(&MetricSnapshot::new(0, 0, f64::NAN));
        assert!(best.best_loss.is_none());

        best.observe(&MetricSnapshot::new(0, 1, 0.4));
        assert_eq!(best.best_loss.unwrap().value, 0.4);
    }

    #[test]
    fn test_snapshot_serializes_absent_as_null() {
        let snapshot = MetricSnapshot::new(2, 20, 0.25);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert!(json["accuracy"].is_null());
        assert_eq!(json["loss"], 0.25);
    }

    #[test]
    fn test_deserialize_rejects_reserved_extra() {
        let mut json = serde_json::to_value(MetricSnapshot::new(1, 10, 0.5)).unwrap();
        json["extra"] = serde_json::json!({ "loss": 0.1 });

        let err = serde_json::from_value::<MetricSnapshot>(json).unwrap_err();
        assert!(err.to_string().contains("loss"));
    }

    #[test]
    fn test_nan_snapshot_reloads() {
        let snapshot = MetricSnapshot::builder(3, 30, f64::NAN)
            .extra("grad_norm", f64::NAN)
            .build()
            .unwrap();

        let text = serde_json::to_string(&snapshot).unwrap();
        let back: MetricSnapshot = serde_json::from_str(&text).unwrap();

        assert!(back.loss().is_nan());
        assert!(back.extra()["grad_norm"].is_nan());
        assert_eq!(back.step(), 30);
    }

    #[test]
    fn test_missing_extra_defaults_empty() {
        let mut json = serde_json::to_value(MetricSnapshot::new(0, 0, 1.0)).unwrap();
        json.as_object_mut().unwrap().remove("extra");

        let back: MetricSnapshot = serde_json::from_value(json).unwrap();
        assert!(back.extra().is_empty());
    }
}
