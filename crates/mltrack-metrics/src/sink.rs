//! Telemetry sinks for metric fan-out
//!
//! A sink mirrors each ingested snapshot to an external experiment dashboard.
//! The tracker treats every sink as best-effort: an emit failure is logged and
//! never reaches the training loop.

use async_trait::async_trait;
use chrono::Utc;
use mltrack_core::{MetricSnapshot, Result, TrackError};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Capability interface for external metric destinations
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Emit the present scalar fields of a snapshot
    async fn emit(&self, snapshot: &MetricSnapshot) -> Result<()>;

    /// Flush and release resources. Called once at the end of training.
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct WriterState {
    file: Option<File>,
    closed: bool,
}

/// Lazily-opened append-only JSON-lines file shared by the file sinks
#[derive(Debug)]
struct JsonlWriter {
    sink_name: &'static str,
    path: PathBuf,
    state: Mutex<WriterState>,
}

impl JsonlWriter {
    fn new(sink_name: &'static str, path: PathBuf) -> Self {
        Self {
            sink_name,
            path,
            state: Mutex::new(WriterState::default()),
        }
    }

    async fn append(&self, lines: &[Value]) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(TrackError::sink(self.sink_name, "emit after close"));
        }

        if state.file.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            debug!("{} sink writing to {:?}", self.sink_name, self.path);
            state.file = Some(file);
        }

        let mut buffer = String::new();
        for line in lines {
            buffer.push_str(&serde_json::to_string(line)?);
            buffer.push('\n');
        }

        if let Some(file) = state.file.as_mut() {
            file.write_all(buffer.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(mut file) = state.file.take() {
            file.flush().await?;
        }
        state.closed = true;
        Ok(())
    }
}

/// TensorBoard-style scalar events: one JSON line per scalar
///
/// Writes `{tag, value, step, wall_time}` to `<log_dir>/tensorboard/scalars.jsonl`.
#[derive(Debug)]
pub struct ScalarEventSink {
    writer: JsonlWriter,
}

impl ScalarEventSink {
    pub fn new(log_dir: &Path) -> Self {
        Self {
            writer: JsonlWriter::new(
                "tensorboard",
                log_dir.join("tensorboard").join("scalars.jsonl"),
            ),
        }
    }

    pub fn path(&self) -> &Path {
        &self.writer.path
    }

    /// Dashboard tag for a canonical metric name
    pub fn tag_for(metric: &str) -> String {
        match metric {
            "loss" => "Loss/train".to_string(),
            "accuracy" => "Accuracy/train".to_string(),
            "val_loss" => "Loss/val".to_string(),
            "val_accuracy" => "Accuracy/val".to_string(),
            "learning_rate" => "Learning_Rate".to_string(),
            other => format!("Metrics/{}", other),
        }
    }
}

#[async_trait]
impl MetricSink for ScalarEventSink {
    fn name(&self) -> &str {
        self.writer.sink_name
    }

    async fn emit(&self, snapshot: &MetricSnapshot) -> Result<()> {
        let wall_time = Utc::now().timestamp_millis() as f64 / 1000.0;
        let lines: Vec<Value> = snapshot
            .scalars()
            .into_iter()
            .map(|(name, value)| {
                json!({
                    "tag": Self::tag_for(name),
                    "value": value,
                    "step": snapshot.step(),
                    "wall_time": wall_time,
                })
            })
            .collect();

        self.writer.append(&lines).await
    }

    async fn close(&self) -> Result<()> {
        self.writer.close().await
    }
}

/// W&B-style offline run history: one JSON line per snapshot
///
/// Writes to `<log_dir>/wandb/<entity>/<project>/<experiment>.jsonl`.
#[derive(Debug)]
pub struct RunHistorySink {
    writer: JsonlWriter,
}

impl RunHistorySink {
    pub fn new(log_dir: &Path, entity: &str, project: &str, experiment: &str) -> Self {
        let or_default = |s: &str| {
            if s.trim().is_empty() {
                "default".to_string()
            } else {
                s.to_string()
            }
        };

        let path = log_dir
            .join("wandb")
            .join(or_default(entity))
            .join(or_default(project))
            .join(format!("{}.jsonl", experiment));

        Self {
            writer: JsonlWriter::new("wandb", path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.writer.path
    }

    /// History key for a canonical metric name
    pub fn key_for(metric: &str) -> String {
        match metric {
            "loss" => "train/loss".to_string(),
            "accuracy" => "train/accuracy".to_string(),
            "val_loss" => "val/loss".to_string(),
            "val_accuracy" => "val/accuracy".to_string(),
            "learning_rate" => "learning_rate".to_string(),
            other => format!("metrics/{}", other),
        }
    }
}

#[async_trait]
impl MetricSink for RunHistorySink {
    fn name(&self) -> &str {
        self.writer.sink_name
    }

    async fn emit(&self, snapshot: &MetricSnapshot) -> Result<()> {
        let mut record = Map::new();
        record.insert("epoch".to_string(), json!(snapshot.epoch()));
        record.insert("step".to_string(), json!(snapshot.step()));
        for (name, value) in snapshot.scalars() {
            record.insert(Self::key_for(name), json!(value));
        }

        self.writer.append(&[Value::Object(record)]).await
    }

    async fn close(&self) -> Result<()> {
        self.writer.close().await
    }
}
