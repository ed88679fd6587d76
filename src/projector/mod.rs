//! Read side: rebuilds what monitors, clients and reports show from the
//! counters, sets and logs the engine writes.
//!
//! Nothing here takes a lock. The only writes are the idempotent corrections
//! done on the report path.

mod report;
mod status;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;

pub use report::{Cancellations, Report, ReportSummary, Stats, TicketRecord};
pub use status::{ClientView, StatusView};

use crate::clock::Clock;
use crate::error::Result;
use crate::store::TicketStore;
use crate::tenant::TenantRegistry;

/// Builds status and report views for any tenant.
#[derive(Clone)]
pub struct Projector<S> {
    store: S,
    tenants: TenantRegistry<S>,
    clock: Arc<dyn Clock>,
}

impl<S: TicketStore> Projector<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            tenants: TenantRegistry::new(store.clone()),
            store,
            clock,
        }
    }

    /// Members of a number set; anything that is not a ticket number is
    /// ignored.
    async fn numbers(&self, key: &str) -> Result<BTreeSet<u64>> {
        Ok(self
            .store
            .smembers(key)
            .await?
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect())
    }

    /// Log entries newest first. Entries that no longer parse are skipped.
    async fn log<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let raw = self.store.lrange_all(key).await?;
        let mut entries = Vec::with_capacity(raw.len());
        for line in &raw {
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::debug!(key, error = %e, "skipping unreadable log entry"),
            }
        }
        Ok(entries)
    }
}
