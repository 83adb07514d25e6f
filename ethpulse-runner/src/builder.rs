//! Snapshot orchestration.
//!
//! Flow: every adapter in order (failure-isolated) → merge → derived keys →
//! backfill from the previous snapshot → provenance assembly.

use crate::backfill::backfill;
use crate::derived;
use crate::merge::FieldSet;
use crate::provenance::{assemble, Timeline};
use chrono::{DateTime, NaiveDate, Utc};
use ethpulse_core::net::Fetcher;
use ethpulse_core::snapshot::Snapshot;
use ethpulse_core::sources::{default_adapters, AdapterSettings, FetchContext, SourceAdapter};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, info, warn};

pub struct SnapshotBuilder {
    fetcher: Box<dyn Fetcher>,
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl SnapshotBuilder {
    pub fn new(fetcher: Box<dyn Fetcher>, adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self { fetcher, adapters }
    }

    /// Builder with the full adapter set.
    pub fn with_default_adapters(fetcher: Box<dyn Fetcher>, settings: &AdapterSettings) -> Self {
        Self::new(fetcher, default_adapters(settings))
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Build a snapshot for `target` (`None` = latest) as of now.
    pub fn build(&self, target: Option<NaiveDate>, previous: Option<&Snapshot>) -> Snapshot {
        self.build_at(target, Utc::now(), previous)
    }

    /// Build a snapshot with an explicit generation time.
    ///
    /// Never fails: adapter errors and panics become diagnostics and the
    /// adapter's keys stay missing unless backfilled.
    pub fn build_at(
        &self,
        target: Option<NaiveDate>,
        generated_at: DateTime<Utc>,
        previous: Option<&Snapshot>,
    ) -> Snapshot {
        let timeline = Timeline::new(target, generated_at);
        let ctx = FetchContext {
            target,
            fetcher: self.fetcher.as_ref(),
            now: generated_at,
        };
        info!(target = ?target, adapters = self.adapters.len(), "building snapshot");

        let mut fields = FieldSet::default();
        for adapter in &self.adapters {
            let name = adapter.name();
            debug!(adapter = name, "fetching");
            match catch_unwind(AssertUnwindSafe(|| adapter.fetch(&ctx))) {
                Ok(Ok(output)) => {
                    debug!(
                        adapter = name,
                        resolved = output.data.len(),
                        missing = output.missing.len(),
                        "adapter finished"
                    );
                    fields.merge(name, output, &timeline);
                }
                Ok(Err(e)) => fields.fail(name, e),
                Err(payload) => {
                    fields.fail(name, format!("panicked: {}", panic_message(&*payload)))
                }
            }
        }

        derived::apply(&mut fields);

        if let Some(previous) = previous {
            backfill(&mut fields, previous, &timeline);
        }

        let snapshot = assemble(fields, &timeline, self.fetcher.probe());
        if snapshot.missing.is_empty() {
            info!(fields = snapshot.data.len(), "snapshot complete");
        } else {
            warn!(
                fields = snapshot.data.len(),
                missing = snapshot.missing.len(),
                diagnostics = snapshot.errors.len(),
                "snapshot has missing fields"
            );
        }
        snapshot
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
