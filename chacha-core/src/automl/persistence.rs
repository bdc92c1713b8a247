//! Versioned snapshots of a running search.
//!
//! A snapshot is a JSON document carrying a format version, the save time,
//! and the SHA-256 of its body. Loading rejects unknown versions, checksum
//! mismatches and any body that does not rebuild a consistent scheduler.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::driver::{AutoMl, AutomlState};
use super::error::InvariantViolation;
use super::manager::{ConfigManager, ManagerRecord};
use crate::learner::Learner;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unsupported snapshot version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("snapshot checksum mismatch: recorded {recorded}, computed {computed}")]
    ChecksumMismatch { recorded: String, computed: String },
    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(#[from] InvariantViolation),
}

impl PersistError {
    fn io(source: std::io::Error, path: &Path) -> Self {
        PersistError::Io {
            source,
            path: path.to_path_buf(),
        }
    }
}

pub type PersistResult<T> = std::result::Result<T, PersistError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBody {
    pub state: AutomlState,
    pub manager: ManagerRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomlSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub checksum: String,
    pub body: SnapshotBody,
}

impl AutomlSnapshot {
    pub fn capture<L: Learner>(automl: &AutoMl<L>) -> PersistResult<Self> {
        Self::seal(SnapshotBody {
            state: automl.state(),
            manager: automl.manager().to_record(),
        })
    }

    /// Like [`AutomlSnapshot::capture`], but only the champion keeps its
    /// weights and learner scalars. Challenger slots are zeroed, which is all
    /// a prediction-only consumer needs.
    pub fn capture_predict_only<L: Learner>(automl: &AutoMl<L>) -> PersistResult<Self> {
        let mut manager = automl.manager().to_record();
        for slot in 1..manager.arena.slot_count() {
            manager.arena.clear_slot(slot);
        }
        tracing::debug!(
            target: "automl.persistence",
            cleared = manager.arena.slot_count().saturating_sub(1),
            "challenger weights dropped from snapshot"
        );
        Self::seal(SnapshotBody {
            state: automl.state(),
            manager,
        })
    }

    fn seal(body: SnapshotBody) -> PersistResult<Self> {
        Ok(Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            checksum: body_checksum(&body)?,
            body,
        })
    }

    /// Checks version and checksum without rebuilding anything.
    pub fn verify(&self) -> PersistResult<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let computed = body_checksum(&self.body)?;
        if computed != self.checksum {
            return Err(PersistError::ChecksumMismatch {
                recorded: self.checksum.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Rebuilds the scheduler state only, after full verification.
    pub fn into_manager(self) -> PersistResult<(AutomlState, ConfigManager)> {
        self.verify()?;
        let manager = ConfigManager::from_record(self.body.manager)?;
        Ok((self.body.state, manager))
    }

    /// Rebuilds a driver around `learner`. The learner's own state is not
    /// part of the snapshot; its weights live in the restored arena.
    pub fn restore<L: Learner>(self, learner: L) -> PersistResult<AutoMl<L>> {
        let (state, manager) = self.into_manager()?;
        tracing::info!(
            target: "automl.persistence",
            state = %state,
            round = manager.total_learn_count(),
            champion = manager.champion_config_id(),
            live_slots = manager.slots().len(),
            "snapshot restored"
        );
        Ok(AutoMl::from_parts(state, manager, learner))
    }

    pub fn to_json(&self) -> PersistResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(content: &str) -> PersistResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Writes the snapshot through a temporary file and a rename.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> PersistResult<()> {
        let path = path.as_ref();
        let content = self.to_json()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| PersistError::io(err, parent))?;
            }
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content).map_err(|err| PersistError::io(err, &temp_path))?;
        fs::rename(&temp_path, path).map_err(|err| PersistError::io(err, path))?;
        tracing::info!(
            target: "automl.persistence",
            path = %path.display(),
            round = self.body.manager.total_learn_count,
            switches = self.body.manager.total_champ_switches,
            "snapshot saved"
        );
        Ok(())
    }

    /// Reads a snapshot and checks version and checksum.
    pub fn load<P: AsRef<Path>>(path: P) -> PersistResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| PersistError::io(err, path))?;
        let snapshot = Self::from_json(&content)?;
        snapshot.verify()?;
        Ok(snapshot)
    }
}

fn body_checksum(body: &SnapshotBody) -> PersistResult<String> {
    let bytes = serde_json::to_vec(body)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
