//! Checkpoint manifest for training runs.

use crate::error::MlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const MANIFEST: &str = "checkpoints.json";

/// A saved checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub experiment_id: String,
    /// One-based epoch after which the checkpoint was written.
    pub epoch: usize,
    /// Name of the monitored metric, e.g. `val_loss`.
    pub monitor: String,
    pub value: f64,
    pub path: PathBuf,
    /// SHA-256 of the checkpoint file contents.
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Keeps `checkpoints.json` in a run directory up to date.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
    max_checkpoints: usize,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>, max_checkpoints: usize) -> Self {
        Self {
            dir: dir.into(),
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST)
    }

    pub fn list(&self) -> Result<Vec<Checkpoint>, MlError> {
        Ok(transferkit_core::load_json(&self.manifest_path())?.unwrap_or_default())
    }

    /// Checkpoint with the lowest monitored value.
    pub fn best(&self) -> Result<Option<Checkpoint>, MlError> {
        let checkpoints = self.list()?;
        Ok(checkpoints
            .into_iter()
            .min_by(|a, b| a.value.total_cmp(&b.value)))
    }

    /// Hash the file at `path` and append an entry to the manifest.
    pub fn record(
        &self,
        experiment_id: &str,
        epoch: usize,
        monitor: &str,
        value: f64,
        path: &Path,
    ) -> Result<Checkpoint, MlError> {
        transferkit_core::ensure_dir(&self.dir)?;

        let bytes = std::fs::read(path)?;
        let hash = format!("{:x}", Sha256::digest(&bytes));

        let checkpoint = Checkpoint {
            id: format!("{experiment_id}-e{epoch:04}"),
            experiment_id: experiment_id.to_string(),
            epoch,
            monitor: monitor.to_string(),
            value,
            path: path.to_path_buf(),
            hash,
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };

        let mut checkpoints = self.list()?;
        checkpoints.push(checkpoint.clone());
        // Oldest entries go first.
        let excess = checkpoints.len().saturating_sub(self.max_checkpoints);
        checkpoints.drain(..excess);

        transferkit_core::atomic_write_json(&self.manifest_path(), &checkpoints)?;
        Ok(checkpoint)
    }

    /// Whether the file at `checkpoint.path` still matches its recorded hash.
    pub fn verify(&self, checkpoint: &Checkpoint) -> Result<bool, MlError> {
        let bytes = std::fs::read(&checkpoint.path)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)) == checkpoint.hash)
    }
}
