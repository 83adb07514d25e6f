//! Refresh trigger used by schedulers and the CLI.

use crate::builder::SnapshotBuilder;
use crate::store::SnapshotStore;
use chrono::NaiveDate;
use ethpulse_core::snapshot::Snapshot;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRequest {
    Latest,
    Historical(NaiveDate),
}

impl RefreshRequest {
    pub fn from_target(target: Option<NaiveDate>) -> Self {
        target.map_or(Self::Latest, Self::Historical)
    }

    pub fn target(&self) -> Option<NaiveDate> {
        match self {
            Self::Latest => None,
            Self::Historical(date) => Some(*date),
        }
    }
}

/// Build a snapshot for `request`, backfilling from the last-known-good
/// file.
///
/// Only a `Latest` snapshot replaces the last-known-good file; historical
/// snapshots are returned without touching it. Store problems never fail the
/// refresh: they are appended to the snapshot's diagnostics.
pub fn handle_refresh(
    builder: &SnapshotBuilder,
    store: &SnapshotStore,
    request: RefreshRequest,
) -> Snapshot {
    let (previous, load_error) = match store.load() {
        Ok(previous) => (previous, None),
        Err(e) => {
            warn!(error = %e, "ignoring last-known-good snapshot");
            (None, Some(format!("last-known-good: {e}; treated as absent")))
        }
    };

    let mut snapshot = builder.build(request.target(), previous.as_ref());
    if let Some(message) = load_error {
        snapshot.errors.insert(0, message);
    }

    if request == RefreshRequest::Latest {
        match store.save(&snapshot) {
            Ok(meta) => {
                info!(
                    path = %store.path().display(),
                    hash = %meta.data_hash,
                    "stored last-known-good"
                );
            }
            Err(e) => {
                warn!(error = %e, "could not store last-known-good");
                snapshot.errors.push(format!("last-known-good: {e}"));
            }
        }
    }
    snapshot
}
