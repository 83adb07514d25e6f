//! ethpulse runner: turns adapter outputs into one attributed snapshot.
//!
//! This crate builds on `ethpulse-core` to provide:
//! - Failure-isolated adapter fan-out and merge
//! - Derived indicator wiring
//! - Staleness-governed backfill from the last-known-good snapshot
//! - Provenance assembly
//! - The last-known-good store and the refresh trigger
//! - TOML + environment configuration

pub mod backfill;
pub mod builder;
pub mod config;
pub mod derived;
pub mod merge;
pub mod provenance;
pub mod refresh;
pub mod store;

pub use backfill::{backfill, BackfillReport};
pub use builder::SnapshotBuilder;
pub use config::{Config, ConfigError};
pub use merge::FieldSet;
pub use provenance::{assemble, Timeline};
pub use refresh::{handle_refresh, RefreshRequest};
pub use store::{write_atomic, SnapshotMeta, SnapshotStore, StoreError};
