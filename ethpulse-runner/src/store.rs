//! Last-known-good snapshot file.
//!
//! Layout: `{path}` holds the snapshot JSON, `{stem}.meta.json` next to it
//! holds a small sidecar (content hash, dates, counts) that `status` reads
//! without parsing the whole snapshot.
//!
//! Writes are atomic (write to .tmp, rename into place). One writer per run,
//! last write wins.

use chrono::{DateTime, NaiveDate, Utc};
use ethpulse_core::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("malformed snapshot file {path}: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Metadata sidecar for the stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub data_hash: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<NaiveDate>,
    pub field_count: usize,
    pub missing_count: usize,
    pub stored_at: DateTime<Utc>,
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar path: `last_known_good.json` → `last_known_good.meta.json`.
    pub fn meta_path(&self) -> PathBuf {
        self.path.with_extension("meta.json")
    }

    /// Read the stored snapshot. `Ok(None)` when nothing has been stored.
    pub fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Malformed {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    /// Persist `snapshot` and its sidecar.
    pub fn save(&self, snapshot: &Snapshot) -> Result<SnapshotMeta, StoreError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&self.path, &json)?;

        let meta = SnapshotMeta {
            data_hash: blake3::hash(&json).to_hex().to_string(),
            generated_at: snapshot.generated_at,
            target_date: snapshot.target_date,
            field_count: snapshot.data.len(),
            missing_count: snapshot.missing.len(),
            stored_at: Utc::now(),
        };
        write_atomic(&self.meta_path(), &serde_json::to_vec_pretty(&meta)?)?;
        Ok(meta)
    }

    /// Read the sidecar, if present and parseable.
    pub fn meta(&self) -> Option<SnapshotMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// True when the stored file still hashes to the sidecar's `data_hash`.
    pub fn verify(&self) -> Result<bool, StoreError> {
        let Some(meta) = self.meta() else {
            return Ok(false);
        };
        let bytes = fs::read(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(blake3::hash(&bytes).to_hex().as_str() == meta.data_hash)
    }
}

/// Write `bytes` to `path` via a sibling `.tmp` file and a rename, creating
/// parent directories as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, bytes).map_err(io_err)?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err(e)
    })
}
