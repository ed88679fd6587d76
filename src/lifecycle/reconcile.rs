//! Idempotent corrections shared by the write and read paths.
//!
//! None of these hold a lock; running them twice, or from two callers at
//! once, leaves the same end state.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::keys::{SetKind, TenantKeys};
use crate::lifecycle::TicketState;
use crate::store::{TicketStore, parse_u64};
use crate::tenant::TenantRegistry;

/// Clears the whole off-hours set once the tenant's window is open again.
/// Returns how many tickets were released.
pub async fn release_off_hours<S: TicketStore>(
    store: &S,
    tenants: &TenantRegistry<S>,
    keys: &TenantKeys,
    now: DateTime<Utc>,
) -> Result<usize> {
    let members = store.smembers(&keys.set(SetKind::OffHours)).await?;
    if members.is_empty() || !tenants.is_open(keys, now).await? {
        return Ok(0);
    }

    store.del(&keys.set(SetKind::OffHours)).await?;
    for member in &members {
        let state = store.hget(&keys.ticket_state(), member).await?;
        if state.as_deref() == Some(TicketState::OffHours.as_str()) {
            store
                .hset(&keys.ticket_state(), member, TicketState::Waiting.as_str())
                .await?;
        }
    }

    tracing::debug!(tenant = keys.tenant(), released = members.len(), "off-hours tickets released");
    Ok(members.len())
}

/// Clears the "now calling" pointer if it still points at `ticket`.
/// Returns whether it did.
pub async fn clear_current_call<S: TicketStore>(
    store: &S,
    keys: &TenantKeys,
    ticket: u64,
) -> Result<bool> {
    let current = parse_u64(store.get(&keys.current_call()).await?);
    if current != ticket {
        return Ok(false);
    }
    store.set(&keys.current_call(), "0").await?;
    store.del(&keys.current_call_ts()).await?;
    store.del(&keys.current_attendant()).await?;
    store.del(&keys.current_call_priority()).await?;
    Ok(true)
}
