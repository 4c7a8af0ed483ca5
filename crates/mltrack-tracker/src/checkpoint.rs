//! Checkpoint policy and artifact storage
//!
//! Every `save_frequency` epochs a [`CheckpointRecord`] is persisted through an
//! [`ArtifactStore`]. Only the newest `max_checkpoints` artifacts are kept;
//! pruning the oldest is best-effort.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mltrack_core::{MetricSnapshot, Result, TrackError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::callbacks::{CallbackSignal, TrainingCallback};

/// Named artifact persistence
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `payload` under `name`, returning where it landed
    async fn write(&self, name: &str, payload: &[u8]) -> Result<PathBuf>;

    /// Remove the artifact. Deleting a missing artifact is not an error.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Artifact store backed by a directory, created on first write
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for DirectoryStore {
    async fn write(&self, name: &str, payload: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;

        let path = self.root.join(name);
        fs::write(&path, payload).await?;
        Ok(path)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Metadata persisted for each checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub epoch: u64,
    /// Per-policy save counter; keeps names unique within one timestamp
    pub sequence: u64,
    pub metrics: MetricSnapshot,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointRecord {
    /// Artifact name: `checkpoint_epoch_{epoch}_{YYYYmmdd_HHMMSS_mmm}_{sequence}.json`
    pub fn artifact_name(&self) -> String {
        format!(
            "checkpoint_epoch_{}_{}_{:04}.json",
            self.epoch,
            self.saved_at.format("%Y%m%d_%H%M%S_%3f"),
            self.sequence
        )
    }
}

/// Saves checkpoints on a fixed epoch cadence and prunes old ones
pub struct CheckpointPolicy {
    store: Arc<dyn ArtifactStore>,
    save_frequency: u64,
    max_checkpoints: usize,
    saved: VecDeque<String>,
    next_sequence: u64,
}

impl CheckpointPolicy {
    /// `save_frequency` of 0 disables saving; `max_checkpoints` is clamped to at least 1
    pub fn new(store: Arc<dyn ArtifactStore>, save_frequency: u64, max_checkpoints: usize) -> Self {
        Self {
            store,
            save_frequency,
            max_checkpoints: max_checkpoints.max(1),
            saved: VecDeque::new(),
            next_sequence: 0,
        }
    }

    /// Policy writing into a checkpoint directory
    pub fn in_directory(dir: impl Into<PathBuf>, save_frequency: u64, max_checkpoints: usize) -> Self {
        Self::new(
            Arc::new(DirectoryStore::new(dir)),
            save_frequency,
            max_checkpoints,
        )
    }

    /// Whether `epoch` falls on the save cadence
    pub fn should_save(&self, epoch: u64) -> bool {
        self.save_frequency > 0 && epoch % self.save_frequency == 0
    }

    /// Persist a checkpoint now and prune beyond `max_checkpoints`
    ///
    /// The write error is returned; pruning failures are only logged.
    pub async fn save_checkpoint(&mut self, epoch: u64, snapshot: &MetricSnapshot) -> Result<PathBuf> {
        let record = CheckpointRecord {
            epoch,
            sequence: self.next_sequence,
            metrics: snapshot.clone(),
            saved_at: Utc::now(),
        };
        let name = record.artifact_name();
        let payload = serde_json::to_vec_pretty(&record)?;

        let path = self.store.write(&name, &payload).await.map_err(|e| {
            TrackError::Checkpoint(format!("Failed to write {}: {}", name, e))
        })?;
        self.next_sequence += 1;
        self.saved.push_back(name);

        while self.saved.len() > self.max_checkpoints {
            if let Some(oldest) = self.saved.pop_front() {
                match self.store.delete(&oldest).await {
                    Ok(()) => debug!("Pruned checkpoint {}", oldest),
                    Err(e) => warn!("Failed to prune checkpoint {} (continuing): {}", oldest, e),
                }
            }
        }

        info!("Checkpoint saved: {}", path.display());
        Ok(path)
    }

    /// Retained checkpoint names, oldest first
    pub fn saved_checkpoints(&self) -> Vec<String> {
        self.saved.iter().cloned().collect()
    }
}

#[async_trait]
impl TrainingCallback for CheckpointPolicy {
    fn name(&self) -> &str {
        "checkpoint"
    }

    async fn on_epoch_end(
        &mut self,
        epoch: u64,
        snapshot: &MetricSnapshot,
    ) -> Result<CallbackSignal> {
        if self.should_save(epoch) {
            self.save_checkpoint(epoch, snapshot).await?;
        }
        Ok(CallbackSignal::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn json_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_keeps_newest_checkpoints() {
        let dir = TempDir::new().unwrap();
        let mut policy = CheckpointPolicy::in_directory(dir.path(), 2, 2);

        for epoch in 1..=6 {
            policy
                .on_epoch_end(epoch, &MetricSnapshot::new(epoch, epoch * 10, 0.5))
                .await
                .unwrap();
        }

        let saved = policy.saved_checkpoints();
        assert_eq!(saved.len(), 2);
        assert!(saved[0].starts_with("checkpoint_epoch_4_"));
        assert!(saved[1].starts_with("checkpoint_epoch_6_"));

        let files = json_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.starts_with("checkpoint_epoch_2_")));
    }

    #[tokio::test]
    async fn test_zero_frequency_never_saves() {
        let dir = TempDir::new().unwrap();
        let mut policy = CheckpointPolicy::in_directory(dir.path().join("ckpt"), 0, 3);

        for epoch in 0..4 {
            policy
                .on_epoch_end(epoch, &MetricSnapshot::new(epoch, epoch, 0.1))
                .await
                .unwrap();
        }

        assert!(policy.saved_checkpoints().is_empty());
        assert!(!dir.path().join("ckpt").exists());
    }

    #[tokio::test]
    async fn test_record_contents() {
        let dir = TempDir::new().unwrap();
        let mut policy = CheckpointPolicy::in_directory(dir.path(), 1, 5);
        let snapshot = MetricSnapshot::builder(3, 30, 0.25)
            .val_loss(0.3)
            .build()
            .unwrap();

        let path = policy.save_checkpoint(3, &snapshot).await.unwrap();
        let record: CheckpointRecord =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(record.epoch, 3);
        assert_eq!(record.metrics, snapshot);
    }

    #[tokio::test]
    async fn test_same_epoch_saves_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let snapshot = MetricSnapshot::new(3, 30, 0.5);

        let mut keep_two = CheckpointPolicy::in_directory(dir.path().join("two"), 1, 2);
        let first = keep_two.save_checkpoint(3, &snapshot).await.unwrap();
        let second = keep_two.save_checkpoint(3, &snapshot).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(json_files(&dir.path().join("two")).len(), 2);

        let mut keep_one = CheckpointPolicy::in_directory(dir.path().join("one"), 1, 1);
        keep_one.save_checkpoint(3, &snapshot).await.unwrap();
        keep_one.save_checkpoint(3, &snapshot).await.unwrap();

        let retained = keep_one.saved_checkpoints();
        assert_eq!(retained.len(), 1);
        assert_eq!(json_files(&dir.path().join("one")), retained);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(store.delete("never_written.json").await.is_ok());
    }

    // Store whose deletes always fail
    struct StubbornStore {
        inner: DirectoryStore,
        delete_attempts: Mutex<usize>,
    }

    #[async_trait]
    impl ArtifactStore for StubbornStore {
        async fn write(&self, name: &str, payload: &[u8]) -> Result<PathBuf> {
            self.inner.write(name, payload).await
        }

        async fn delete(&self, _name: &str) -> Result<()> {
            *self.delete_attempts.lock().unwrap() += 1;
            Err(TrackError::Other("read-only volume".to_string()))
        }
    }

    #[tokio::test]
    async fn test_prune_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StubbornStore {
            inner: DirectoryStore::new(dir.path()),
            delete_attempts: Mutex::new(0),
        });
        let mut policy = CheckpointPolicy::new(store.clone(), 1, 1);

        for epoch in 0..3 {
            let signal = policy
                .on_epoch_end(epoch, &MetricSnapshot::new(epoch, epoch, 0.2))
                .await
                .unwrap();
            assert_eq!(signal, CallbackSignal::Continue);
        }

        assert_eq!(*store.delete_attempts.lock().unwrap(), 2);
        assert_eq!(policy.saved_checkpoints().len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let dir = TempDir::new().unwrap();
        // A regular file where the checkpoint directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();

        let mut policy = CheckpointPolicy::in_directory(&blocker, 1, 1);
        let err = policy
            .save_checkpoint(0, &MetricSnapshot::new(0, 0, 1.0))
            .await
            .unwrap_err();

        assert!(matches!(err, TrackError::Checkpoint(_)));
        assert!(policy.saved_checkpoints().is_empty());
    }
}
