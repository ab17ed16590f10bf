//! Checkpoint management for training runs.
//!
//! Each checkpoint is a JSON dump of the model parameters. A `checkpoints.json`
//! manifest next to them records epoch, loss and a SHA-256 of the file contents.

use crate::error::MlError;
use crate::persistence::{read_json_file, write_json_file};
use crate::training::model::VoxelClassifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "checkpoints.json";

/// A training checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub label: String,
    pub epoch: usize,
    pub loss: Option<f64>,
    pub path: PathBuf,
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Checkpoint manager.
pub struct CheckpointManager {
    base_dir: PathBuf,
    max_checkpoints: usize,
}

fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

impl CheckpointManager {
    pub fn new(base_dir: PathBuf, max_checkpoints: usize) -> Self {
        Self {
            base_dir,
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    fn manifest_path(&self) -> PathBuf {
        self.base_dir.join(MANIFEST_FILE_NAME)
    }

    /// List recorded checkpoints, oldest first.
    pub fn list(&self) -> Result<Vec<Checkpoint>, MlError> {
        Ok(read_json_file(&self.manifest_path())?.unwrap_or_default())
    }

    /// Get the best checkpoint (lowest loss).
    pub fn best(&self) -> Result<Option<Checkpoint>, MlError> {
        let checkpoints = self.list()?;
        Ok(checkpoints
            .into_iter()
            .filter(|c| c.loss.is_some())
            .min_by(|a, b| {
                a.loss
                    .partial_cmp(&b.loss)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }))
    }

    /// Write `model` to `<base_dir>/<label>.json` and record it in the manifest.
    ///
    /// Models with non-finite parameters are rejected. When the manifest
    /// exceeds `max_checkpoints`, the oldest entries and their files are removed.
    pub fn save(
        &self,
        label: &str,
        epoch: usize,
        loss: Option<f64>,
        model: &VoxelClassifier,
    ) -> Result<Checkpoint, MlError> {
        model.validate()?;
        std::fs::create_dir_all(&self.base_dir)?;

        let path = self.base_dir.join(format!("{label}.json"));
        let bytes = write_json_file(&path, model)?;

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            epoch,
            loss,
            path: path.clone(),
            hash: content_hash(&bytes),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        };

        let mut checkpoints = self.list()?;
        // a label saved twice keeps only its latest entry
        checkpoints.retain(|c| c.label != label);
        checkpoints.push(checkpoint.clone());

        while checkpoints.len() > self.max_checkpoints {
            let evicted = checkpoints.remove(0);
            if evicted.path.exists() {
                std::fs::remove_file(&evicted.path)?;
            }
        }

        write_json_file(&self.manifest_path(), &checkpoints)?;
        tracing::debug!(label, epoch, path = %path.display(), "Saved checkpoint");

        Ok(checkpoint)
    }

    /// Recompute a checkpoint's hash and compare it to the manifest entry.
    pub fn verify(&self, checkpoint: &Checkpoint) -> Result<bool, MlError> {
        let bytes = std::fs::read(&checkpoint.path)?;
        Ok(content_hash(&bytes) == checkpoint.hash)
    }
}

/// Read model parameters from a checkpoint file.
pub fn load_model(path: &Path) -> Result<VoxelClassifier, MlError> {
    let model: VoxelClassifier = read_json_file(path)?
        .ok_or_else(|| MlError::not_found(format!("checkpoint {}", path.display())))?;
    model.validate()?;
    Ok(model)
}
