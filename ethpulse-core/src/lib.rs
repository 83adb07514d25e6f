//! ethpulse core: field catalogue, snapshot record, point-in-time alignment,
//! derived indicator math, staleness policy, network egress and the source
//! adapters.
//!
//! This crate knows how to fetch and compute individual indicators. Assembling
//! them into a snapshot (merge, backfill, provenance) lives in the runner.

pub mod align;
pub mod derive;
pub mod field;
pub mod net;
pub mod snapshot;
pub mod sources;
pub mod staleness;

pub use field::{FieldValue, REQUIRED_FIELDS};
pub use snapshot::{ProxyProbe, Snapshot};
