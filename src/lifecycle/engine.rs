use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    AttendedEvent, CalledEvent, CancelReason, CancelledEvent, EnteredEvent, EntrySource,
    ResetEvent,
};
use super::reconcile;
use super::state::{StateMachine, TicketEvent, TicketState, Transition};
use crate::clock::Clock;
use crate::config::FilaConfig;
use crate::error::{QueueError, Result};
use crate::keys::{LogKind, SetKind, TICKET_KEY_FAMILIES, TenantKeys, TimingKind};
use crate::push::{NotifyError, PushMessage, PushRelay};
use crate::store::{TicketStore, parse_i64, parse_u64};
use crate::tenant::TenantRegistry;

const NAME_MAX_CHARS: usize = 80;
const LOCK_RETRY: Duration = Duration::from_millis(25);
/// Largest forward move of the ticket counter in one correction.
pub const MAX_COUNTER_JUMP: u64 = 10_000;

/// Sets whose members can never be called.
const UNCALLABLE: &[SetKind] = &[
    SetKind::Attended,
    SetKind::Cancelled,
    SetKind::Missed,
    SetKind::Skipped,
    SetKind::OffHours,
];

/// Sets whose members left the line for good.
const CLOSED: &[SetKind] = &[
    SetKind::Attended,
    SetKind::Cancelled,
    SetKind::Missed,
    SetKind::Skipped,
];

/// Tunables taken from [`FilaConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub log_cap: usize,
    pub retention_secs: u64,
    pub call_lock_ttl_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&FilaConfig::default())
    }
}

impl From<&FilaConfig> for EngineSettings {
    fn from(config: &FilaConfig) -> Self {
        Self {
            log_cap: config.log_cap,
            retention_secs: config.retention_secs(),
            call_lock_ttl_ms: config.call_lock_ttl_ms,
        }
    }
}

/// Body of an entry request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnterRequest {
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub name: Option<String>,
}

/// One line of a batch import.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntry {
    pub name: String,
    #[serde(default)]
    pub priority: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entered {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub ticket_number: u64,
    pub ts: i64,
    pub priority: bool,
    pub off_hours: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchImported {
    pub imported: usize,
    pub priority: usize,
    pub normal: usize,
    pub tickets: Vec<u64>,
}

/// Service class of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketClass {
    Normal,
    Priority,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub ticket: u64,
    pub attendant: String,
    pub class: TicketClass,
    /// The ticket had been called before.
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Called(Call),
    /// Nobody is waiting.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attended {
    pub ticket: u64,
    /// Milliseconds between the call and the attend; 0 if the ticket was not
    /// the one being called.
    pub duration: i64,
    /// Milliseconds the ticket waited before its first call.
    pub wait: i64,
    /// False when the ticket was already attended.
    pub first: bool,
}

/// Who is cancelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    /// The browser session that took the ticket.
    Client(String),
    Ticket(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled {
        ticket: u64,
        reason: CancelReason,
        wait: i64,
        duration: i64,
    },
    /// Attend got there first; nothing was written.
    AlreadyAttended { ticket: u64 },
    /// The client session no longer maps to a ticket.
    NotCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    pub ts: i64,
    pub cleared_keys: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOutcome {
    /// The number the next entry will receive.
    pub ticket_number: u64,
    pub skipped: u64,
}

/// Drives tickets through their lifecycle against a [`TicketStore`].
///
/// Operations are sequences of single-key writes. Where two callers can race,
/// the writes are ordered so that re-running or interleaving them converges:
/// attend always clears cancel/miss, cancel re-checks attend after writing.
pub struct QueueEngine<S> {
    store: S,
    tenants: TenantRegistry<S>,
    clock: Arc<dyn Clock>,
    push: Option<PushRelay>,
    settings: EngineSettings,
}

impl<S: TicketStore> QueueEngine<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        Self {
            tenants: TenantRegistry::new(store.clone()),
            store,
            clock,
            push: None,
            settings,
        }
    }

    /// Notify clients through `relay` when their ticket is called.
    pub fn with_push(mut self, relay: PushRelay) -> Self {
        self.push = Some(relay);
        self
    }

    pub fn tenants(&self) -> &TenantRegistry<S> {
        &self.tenants
    }

    /// Take a ticket for a client. The returned `client_id` lets the same
    /// browser cancel it later without knowing the number.
    pub async fn enter(&self, tenant: &str, request: EnterRequest) -> Result<Entered> {
        let keys = self.tenants.require(tenant).await?;
        let client_id = Uuid::new_v4().to_string();
        let name = clean_name(request.name.as_deref());
        self.issue(&keys, name, request.priority, EntrySource::Client, Some(client_id))
            .await
    }

    /// Add a ticket at the desk on behalf of someone without a phone.
    pub async fn add_manual(&self, tenant: &str, name: &str, priority: bool) -> Result<Entered> {
        let keys = self.tenants.require(tenant).await?;
        let name = clean_name(Some(name))
            .ok_or_else(|| QueueError::InvalidArgument("name is required".into()))?;
        self.issue(&keys, Some(name), priority, EntrySource::Manual, None)
            .await
    }

    /// Issue one ticket per entry, priority entries first, keeping the given
    /// order within each class.
    pub async fn enter_batch(&self, tenant: &str, entries: Vec<BatchEntry>) -> Result<BatchImported> {
        let keys = self.tenants.require(tenant).await?;
        if entries.is_empty() {
            return Err(QueueError::InvalidArgument("no entries to import".into()));
        }

        let mut cleaned = Vec::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            let name = clean_name(Some(&entry.name))
                .ok_or_else(|| QueueError::InvalidArgument(format!("entry {} has no name", i + 1)))?;
            cleaned.push((name, entry.priority));
        }
        let (priority, normal): (Vec<_>, Vec<_>) = cleaned.into_iter().partition(|(_, p)| *p);

        let mut imported = BatchImported {
            imported: 0,
            priority: priority.len(),
            normal: normal.len(),
            tickets: Vec::new(),
        };
        for (name, is_priority) in priority.into_iter().chain(normal) {
            let entered = self
                .issue(&keys, Some(name), is_priority, EntrySource::Import, None)
                .await?;
            imported.tickets.push(entered.ticket_number);
            imported.imported += 1;
        }

        tracing::info!(tenant = keys.tenant(), imported = imported.imported, "batch imported");
        Ok(imported)
    }

    async fn issue(
        &self,
        keys: &TenantKeys,
        name: Option<String>,
        priority: bool,
        source: EntrySource,
        client_id: Option<String>,
    ) -> Result<Entered> {
        let now = self.clock.now();
        let ts = now.timestamp_millis();
        let ticket = self.store.incr(&keys.ticket_counter(), 1).await?.max(0) as u64;
        let member = ticket.to_string();
        let ttl = self.settings.retention_secs;

        if let Some(client_id) = &client_id {
            self.store
                .set_ex(&keys.client_ticket(client_id), &member, ttl)
                .await?;
        }
        self.set_timing(keys, TimingKind::Entered, ticket, ts).await?;

        if let Some(name) = &name {
            self.store.hset(&keys.ticket_names(), &member, name).await?;
            if source != EntrySource::Client {
                self.store.set_ex(&keys.manual_name(ticket), name, ttl).await?;
            }
        }

        if priority {
            self.store
                .zadd(&keys.priority_queue(), &member, ticket as f64)
                .await?;
            self.store.sadd(&keys.set(SetKind::Priority), &member).await?;
            self.store
                .sadd(&keys.set(SetKind::PriorityHistory), &member)
                .await?;
        }

        let off_hours = !self.tenants.is_open(keys, now).await?;
        if off_hours {
            self.store.sadd(&keys.set(SetKind::OffHours), &member).await?;
        }
        let state = StateMachine::next(None, TicketEvent::Enter { off_hours }).state();
        self.record_state(keys, ticket, state).await?;

        self.push_log(
            keys,
            LogKind::Entered,
            &EnteredEvent {
                ticket,
                ts,
                name,
                priority,
                off_hours,
                source,
                client_id: client_id.clone(),
            },
        )
        .await?;

        tracing::info!(tenant = keys.tenant(), ticket, priority, off_hours, "ticket issued");
        Ok(Entered {
            client_id,
            ticket_number: ticket,
            ts,
            priority,
            off_hours,
        })
    }

    /// Call the next ticket, or `explicit` when the attendant picked one.
    ///
    /// Without an explicit number the lowest waiting priority ticket wins,
    /// then the lowest waiting ticket after the call counter. Calls are
    /// serialized per tenant so two desks never get the same ticket.
    pub async fn call(
        &self,
        tenant: &str,
        attendant: &str,
        explicit: Option<u64>,
    ) -> Result<CallOutcome> {
        let keys = self.tenants.require(tenant).await?;
        let attendant = attendant.trim();
        if attendant.is_empty() {
            return Err(QueueError::InvalidArgument("attendant is required".into()));
        }
        if explicit == Some(0) {
            return Err(QueueError::InvalidArgument("ticket numbers start at 1".into()));
        }

        let token = self.acquire_call_lock(&keys).await?;
        let outcome = self.call_locked(&keys, attendant, explicit).await;
        if let Err(e) = self.release_call_lock(&keys, &token).await {
            tracing::warn!(tenant = keys.tenant(), error = %e, "failed to release call lock");
        }
        outcome
    }

    async fn call_locked(
        &self,
        keys: &TenantKeys,
        attendant: &str,
        explicit: Option<u64>,
    ) -> Result<CallOutcome> {
        let now = self.clock.now();
        let ts = now.timestamp_millis();
        let ticket_counter = parse_u64(self.store.get(&keys.ticket_counter()).await?);
        let call_counter = parse_u64(self.store.get(&keys.call_counter()).await?);

        let ticket = match explicit {
            Some(n) if n > ticket_counter => {
                return Err(QueueError::NotFound(format!("ticket {n} was never issued")));
            }
            Some(n) => n,
            None => {
                reconcile::release_off_hours(&self.store, &self.tenants, keys, now).await?;
                match self.next_in_line(keys, call_counter, ticket_counter).await? {
                    Some(n) => n,
                    None => {
                        tracing::debug!(tenant = keys.tenant(), "call found nobody waiting");
                        return Ok(CallOutcome::Empty);
                    }
                }
            }
        };
        let member = ticket.to_string();
        self.store.zrem(&keys.priority_queue(), &member).await?;
        self.store.srem(&keys.set(SetKind::Priority), &member).await?;

        let repeat = self.timing(keys, TimingKind::Called, ticket).await?.is_some();
        let is_priority = self
            .store
            .sismember(&keys.set(SetKind::PriorityHistory), &member)
            .await?;

        self.store.set(&keys.current_call(), &member).await?;
        self.store.set(&keys.current_call_ts(), &ts.to_string()).await?;
        self.store.set(&keys.current_attendant(), attendant).await?;
        self.store
            .set(&keys.current_call_priority(), if is_priority { "1" } else { "0" })
            .await?;
        self.set_timing(keys, TimingKind::Called, ticket, ts).await?;

        // Queue wait is measured to the first call only.
        if let Some(entered) = self.timing(keys, TimingKind::Entered, ticket).await? {
            let wait = (ts - entered).max(0);
            self.store
                .set_nx_px(
                    &keys.timing(TimingKind::Wait, ticket),
                    &wait.to_string(),
                    self.settings.retention_secs * 1000,
                )
                .await?;
        }

        self.advance_call_counter(keys, call_counter, ticket_counter)
            .await?;

        let current = self.state_of(keys, ticket).await?;
        if let Transition::Next(state) = StateMachine::next(current, TicketEvent::Call) {
            self.record_state(keys, ticket, state).await?;
        }

        self.push_log(
            keys,
            LogKind::Called,
            &CalledEvent {
                ticket,
                ts,
                attendant: attendant.to_string(),
                call_id: Uuid::new_v4().to_string(),
                priority: is_priority,
                repeat,
            },
        )
        .await?;

        tracing::info!(tenant = keys.tenant(), ticket, attendant, repeat, "ticket called");
        self.notify_called(keys, ticket, attendant).await;

        Ok(CallOutcome::Called(Call {
            ticket,
            attendant: attendant.to_string(),
            class: if is_priority {
                TicketClass::Priority
            } else {
                TicketClass::Normal
            },
            repeat,
        }))
    }

    /// Pops the priority queue first, dropping stale entries on the way, then
    /// scans forward from the call counter.
    async fn next_in_line(
        &self,
        keys: &TenantKeys,
        call_counter: u64,
        ticket_counter: u64,
    ) -> Result<Option<u64>> {
        let excluded = self.numbers_in(keys, UNCALLABLE).await?;

        for member in self.store.zrange_all(&keys.priority_queue()).await? {
            let Ok(ticket) = member.parse::<u64>() else {
                self.store.zrem(&keys.priority_queue(), &member).await?;
                continue;
            };
            // A ticket leaves the priority queue the moment it is picked or
            // found already consumed.
            self.store.zrem(&keys.priority_queue(), &member).await?;
            self.store.srem(&keys.set(SetKind::Priority), &member).await?;

            // Off-hours priority tickets go back once the window opens.
            if excluded.contains(&ticket) {
                if self
                    .store
                    .sismember(&keys.set(SetKind::OffHours), &member)
                    .await?
                {
                    self.store
                        .zadd(&keys.priority_queue(), &member, ticket as f64)
                        .await?;
                    self.store.sadd(&keys.set(SetKind::Priority), &member).await?;
                }
                continue;
            }
            if self.timing(keys, TimingKind::Called, ticket).await?.is_some() {
                continue;
            }
            return Ok(Some(ticket));
        }

        for ticket in call_counter + 1..=ticket_counter {
            if excluded.contains(&ticket) {
                continue;
            }
            if self.timing(keys, TimingKind::Called, ticket).await?.is_some() {
                continue;
            }
            return Ok(Some(ticket));
        }
        Ok(None)
    }

    /// Moves the call counter over every following number that no longer
    /// waits: called, closed or skipped. Stops at the first one still in line.
    async fn advance_call_counter(
        &self,
        keys: &TenantKeys,
        call_counter: u64,
        ticket_counter: u64,
    ) -> Result<u64> {
        let closed = self.numbers_in(keys, CLOSED).await?;
        let mut reached = call_counter;
        while reached < ticket_counter {
            let next = reached + 1;
            if !closed.contains(&next)
                && self.timing(keys, TimingKind::Called, next).await?.is_none()
            {
                break;
            }
            reached = next;
        }
        if reached > call_counter {
            self.store
                .set(&keys.call_counter(), &reached.to_string())
                .await?;
        }
        Ok(reached)
    }

    async fn numbers_in(&self, keys: &TenantKeys, kinds: &[SetKind]) -> Result<HashSet<u64>> {
        let mut numbers = HashSet::new();
        for kind in kinds {
            numbers.extend(
                self.store
                    .smembers(&keys.set(*kind))
                    .await?
                    .iter()
                    .filter_map(|m| m.parse::<u64>().ok()),
            );
        }
        Ok(numbers)
    }

    async fn acquire_call_lock(&self, keys: &TenantKeys) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let ttl_ms = self.settings.call_lock_ttl_ms;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(ttl_ms);

        loop {
            if self
                .store
                .set_nx_px(&keys.call_lock(), &token, ttl_ms)
                .await?
            {
                return Ok(token);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(QueueError::Contention(keys.tenant().to_string()));
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
    }

    async fn release_call_lock(&self, keys: &TenantKeys, token: &str) -> Result<()> {
        let holder = self.store.get(&keys.call_lock()).await?;
        if holder.as_deref() == Some(token) {
            self.store.del(&keys.call_lock()).await?;
        }
        Ok(())
    }

    /// Best effort: failures are logged and never reach the caller.
    async fn notify_called(&self, keys: &TenantKeys, ticket: u64, attendant: &str) {
        let Some(relay) = &self.push else {
            return;
        };
        let key = keys.push_subscription(ticket);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(tenant = keys.tenant(), ticket, error = %e, "could not read push subscription");
                return;
            }
        };
        let subscription = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(tenant = keys.tenant(), ticket, error = %e, "unreadable push subscription");
                return;
            }
        };

        let message = PushMessage {
            tenant: keys.tenant().to_string(),
            ticket,
            attendant: attendant.to_string(),
            subscription,
        };
        match relay.send(&message).await {
            Ok(()) => tracing::debug!(tenant = keys.tenant(), ticket, "push sent"),
            Err(e) if e.is_gone() => {
                tracing::info!(tenant = keys.tenant(), ticket, "push subscription gone, dropping it");
                if let Err(e) = self.store.del(&key).await {
                    tracing::warn!(tenant = keys.tenant(), ticket, error = %e, "could not drop push subscription");
                }
            }
            Err(NotifyError::RateLimited { retry_after_ms }) => tracing::warn!(
                tenant = keys.tenant(),
                ticket,
                retry_after_ms,
                "push relay rate limited, notification dropped"
            ),
            Err(e) => tracing::warn!(tenant = keys.tenant(), ticket, error = %e, "push failed"),
        }
    }

    /// Mark a ticket attended. Attended overrides any cancel or miss recorded
    /// for the same ticket, whichever arrived first.
    pub async fn attend(&self, tenant: &str, ticket: u64) -> Result<Attended> {
        let keys = self.tenants.require(tenant).await?;
        if ticket == 0 {
            return Err(QueueError::InvalidArgument("ticket is required".into()));
        }
        self.ensure_issued(&keys, ticket).await?;

        let ts = self.clock.now_ms();
        let member = ticket.to_string();

        let first = self.store.sadd(&keys.set(SetKind::Attended), &member).await?;
        self.store.srem(&keys.set(SetKind::Cancelled), &member).await?;
        self.store.srem(&keys.set(SetKind::Missed), &member).await?;
        self.store.zrem(&keys.priority_queue(), &member).await?;
        self.store.srem(&keys.set(SetKind::Priority), &member).await?;

        let current = parse_u64(self.store.get(&keys.current_call()).await?);
        let duration = if current == ticket {
            let called_at = parse_i64(self.store.get(&keys.current_call_ts()).await?);
            reconcile::clear_current_call(&self.store, &keys, ticket).await?;
            called_at.map_or(0, |c| (ts - c).max(0))
        } else {
            0
        };

        let state = self.state_of(&keys, ticket).await?;
        if let Transition::Next(next) = StateMachine::next(state, TicketEvent::Attend) {
            self.record_state(&keys, ticket, next).await?;
        }

        if !first {
            tracing::debug!(tenant = keys.tenant(), ticket, "ticket already attended");
            return Ok(Attended {
                ticket,
                duration: 0,
                wait: 0,
                first,
            });
        }

        let wait_key = keys.timing(TimingKind::Wait, ticket);
        let wait = parse_i64(self.store.get(&wait_key).await?).unwrap_or(0);
        self.store.del(&wait_key).await?;
        self.set_timing(&keys, TimingKind::Attended, ticket, ts).await?;

        self.push_log(
            &keys,
            LogKind::Attended,
            &AttendedEvent {
                ticket,
                ts,
                duration,
                wait,
            },
        )
        .await?;

        tracing::info!(tenant = keys.tenant(), ticket, duration, wait, "ticket attended");
        Ok(Attended {
            ticket,
            duration,
            wait,
            first,
        })
    }

    /// Close a ticket as cancelled by the client or missed at the desk.
    ///
    /// `duration` is used only when the ticket was never called; otherwise the
    /// call-to-cancel time is measured from the recorded call.
    pub async fn cancel(
        &self,
        tenant: &str,
        target: CancelTarget,
        reason: CancelReason,
        duration: Option<i64>,
    ) -> Result<CancelOutcome> {
        let keys = self.tenants.require(tenant).await?;

        let ticket = match target {
            CancelTarget::Client(client_id) => {
                let key = keys.client_ticket(&client_id);
                let ticket = parse_u64(self.store.get(&key).await?);
                self.store.del(&key).await?;
                if ticket == 0 {
                    return Ok(CancelOutcome::NotCancelled);
                }
                ticket
            }
            CancelTarget::Ticket(ticket) => {
                self.ensure_issued(&keys, ticket).await?;
                ticket
            }
        };
        let member = ticket.to_string();
        let ts = self.clock.now_ms();

        self.store.srem(&keys.set(SetKind::OffHours), &member).await?;
        self.store.zrem(&keys.priority_queue(), &member).await?;
        self.store.srem(&keys.set(SetKind::Priority), &member).await?;

        let wait = self
            .timing(&keys, TimingKind::Entered, ticket)
            .await?
            .map_or(0, |entered| (ts - entered).max(0));

        if self
            .store
            .sismember(&keys.set(SetKind::Attended), &member)
            .await?
        {
            tracing::info!(tenant = keys.tenant(), ticket, %reason, "cancel ignored, ticket already attended");
            return Ok(CancelOutcome::AlreadyAttended { ticket });
        }

        let current = self.state_of(&keys, ticket).await?;
        let next = match StateMachine::next(current, TicketEvent::Cancel(reason)) {
            Transition::Blocked(_) => return Ok(CancelOutcome::AlreadyAttended { ticket }),
            Transition::Unchanged(state) => {
                // A closed ticket can still be the current call after a repeat call.
                reconcile::clear_current_call(&self.store, &keys, ticket).await?;
                let kept = if state == TicketState::Missed {
                    CancelReason::Missed
                } else {
                    CancelReason::Client
                };
                tracing::debug!(tenant = keys.tenant(), ticket, %state, "ticket already closed");
                return Ok(CancelOutcome::Cancelled {
                    ticket,
                    reason: kept,
                    wait,
                    duration: 0,
                });
            }
            Transition::Next(state) => state,
        };

        let (add, remove) = match next {
            TicketState::Missed => (SetKind::Missed, SetKind::Cancelled),
            _ => (SetKind::Cancelled, SetKind::Missed),
        };
        self.store.sadd(&keys.set(add), &member).await?;
        self.store.srem(&keys.set(remove), &member).await?;
        self.record_state(&keys, ticket, next).await?;

        let duration = match self.timing(&keys, TimingKind::Called, ticket).await? {
            Some(called) => (ts - called).max(0),
            None => duration.unwrap_or(0).max(0),
        };
        self.set_timing(&keys, TimingKind::Cancelled, ticket, ts).await?;
        self.store.del(&keys.timing(TimingKind::Wait, ticket)).await?;

        self.push_log(
            &keys,
            LogKind::Cancelled,
            &CancelledEvent {
                ticket,
                ts,
                reason,
                duration,
                wait,
            },
        )
        .await?;

        reconcile::clear_current_call(&self.store, &keys, ticket).await?;

        // An attend may have landed between the check above and the writes.
        if self
            .store
            .sismember(&keys.set(SetKind::Attended), &member)
            .await?
        {
            self.store.srem(&keys.set(add), &member).await?;
            self.record_state(&keys, ticket, TicketState::Attended).await?;
            tracing::info!(tenant = keys.tenant(), ticket, "attend won a race with cancel");
            return Ok(CancelOutcome::AlreadyAttended { ticket });
        }

        tracing::info!(tenant = keys.tenant(), ticket, %reason, wait, duration, "ticket cancelled");
        Ok(CancelOutcome::Cancelled {
            ticket,
            reason,
            wait,
            duration,
        })
    }

    /// Wipe every counter, set, per-ticket key and log of the tenant except
    /// the reset log, then record the reset.
    pub async fn reset(&self, tenant: &str, attendant: &str) -> Result<ResetOutcome> {
        let keys = self.tenants.require(tenant).await?;
        let ts = self.clock.now_ms();
        let previous = parse_u64(self.store.get(&keys.ticket_counter()).await?);

        self.store.set(&keys.ticket_counter(), "0").await?;
        self.store.set(&keys.call_counter(), "0").await?;
        self.store.set(&keys.current_call(), "0").await?;
        self.store.del(&keys.current_call_ts()).await?;
        self.store.del(&keys.current_attendant()).await?;
        self.store.del(&keys.current_call_priority()).await?;

        let mut cleared = 0;
        for family in TICKET_KEY_FAMILIES {
            cleared += self.store.scan_delete(&keys.family_prefix(family)).await?;
        }

        let mut collections = vec![keys.priority_queue(), keys.ticket_names(), keys.ticket_state()];
        collections.extend(
            [
                SetKind::Attended,
                SetKind::Cancelled,
                SetKind::Missed,
                SetKind::OffHours,
                SetKind::Skipped,
                SetKind::Priority,
                SetKind::PriorityHistory,
            ]
            .into_iter()
            .map(|kind| keys.set(kind)),
        );
        collections.extend(
            [
                LogKind::Entered,
                LogKind::Called,
                LogKind::Attended,
                LogKind::Cancelled,
            ]
            .into_iter()
            .map(|kind| keys.log(kind)),
        );
        for key in &collections {
            self.store.del(key).await?;
        }

        self.push_log(
            &keys,
            LogKind::Reset,
            &ResetEvent {
                ts,
                attendant: attendant.trim().to_string(),
                ticket_counter: previous,
            },
        )
        .await?;

        tracing::info!(tenant = keys.tenant(), attendant, previous, cleared, "queue reset");
        Ok(ResetOutcome {
            ts,
            cleared_keys: cleared,
        })
    }

    /// Move the issuance counter so the next entry gets `next_ticket`.
    ///
    /// The numbers jumped over are marked skipped so reports do not invent
    /// tickets for them. If every issued ticket was already called, the call
    /// counter jumps along.
    pub async fn set_ticket_counter(&self, tenant: &str, next_ticket: u64) -> Result<CounterOutcome> {
        let keys = self.tenants.require(tenant).await?;
        let current = parse_u64(self.store.get(&keys.ticket_counter()).await?);
        if next_ticket <= current {
            return Err(QueueError::InvalidArgument(format!(
                "nextTicket {next_ticket} must be greater than the current counter {current}"
            )));
        }
        if next_ticket - current > MAX_COUNTER_JUMP {
            return Err(QueueError::InvalidArgument(format!(
                "nextTicket {next_ticket} is more than {MAX_COUNTER_JUMP} ahead of the current counter {current}"
            )));
        }
        let call_counter = parse_u64(self.store.get(&keys.call_counter()).await?);
        let target = next_ticket - 1;

        for ticket in current + 1..next_ticket {
            self.store
                .sadd(&keys.set(SetKind::Skipped), &ticket.to_string())
                .await?;
        }
        if call_counter >= current {
            self.store
                .set(&keys.call_counter(), &target.to_string())
                .await?;
        }
        // Increment rather than overwrite so a concurrent entry is never
        // handed a number twice.
        let delta = i64::try_from(target - current)
            .map_err(|_| QueueError::InvalidArgument(format!("nextTicket {next_ticket} is out of range")))?;
        if delta > 0 {
            self.store.incr(&keys.ticket_counter(), delta).await?;
        }

        let skipped = next_ticket - current - 1;
        tracing::info!(tenant = keys.tenant(), from = current, next_ticket, skipped, "ticket counter moved");
        Ok(CounterOutcome {
            ticket_number: next_ticket,
            skipped,
        })
    }

    /// Store the browser push subscription for the client's ticket.
    pub async fn subscribe_push(
        &self,
        tenant: &str,
        client_id: &str,
        subscription: &serde_json::Value,
    ) -> Result<u64> {
        let keys = self.tenants.require(tenant).await?;
        let ticket = parse_u64(self.store.get(&keys.client_ticket(client_id)).await?);
        if ticket == 0 {
            return Err(QueueError::NotFound(format!("client {client_id} has no ticket")));
        }
        self.store
            .set_ex(
                &keys.push_subscription(ticket),
                &serde_json::to_string(subscription)?,
                self.settings.retention_secs,
            )
            .await?;
        Ok(ticket)
    }

    async fn ensure_issued(&self, keys: &TenantKeys, ticket: u64) -> Result<()> {
        let counter = parse_u64(self.store.get(&keys.ticket_counter()).await?);
        if ticket == 0 || ticket > counter {
            return Err(QueueError::NotFound(format!("ticket {ticket} was never issued")));
        }
        Ok(())
    }

    async fn state_of(&self, keys: &TenantKeys, ticket: u64) -> Result<Option<TicketState>> {
        Ok(self
            .store
            .hget(&keys.ticket_state(), &ticket.to_string())
            .await?
            .and_then(|raw| raw.parse().ok()))
    }

    async fn record_state(&self, keys: &TenantKeys, ticket: u64, state: TicketState) -> Result<()> {
        self.store
            .hset(&keys.ticket_state(), &ticket.to_string(), state.as_str())
            .await?;
        Ok(())
    }

    async fn timing(&self, keys: &TenantKeys, kind: TimingKind, ticket: u64) -> Result<Option<i64>> {
        Ok(parse_i64(self.store.get(&keys.timing(kind, ticket)).await?))
    }

    async fn set_timing(&self, keys: &TenantKeys, kind: TimingKind, ticket: u64, ts: i64) -> Result<()> {
        self.store
            .set_ex(&keys.timing(kind, ticket), &ts.to_string(), self.settings.retention_secs)
            .await?;
        Ok(())
    }

    /// Append to a bounded, expiring, most-recent-first log.
    async fn push_log<T: Serialize>(&self, keys: &TenantKeys, kind: LogKind, event: &T) -> Result<()> {
        let key = keys.log(kind);
        self.store.lpush(&key, &serde_json::to_string(event)?).await?;
        self.store.ltrim(&key, self.settings.log_cap).await?;
        self.store.expire(&key, self.settings.retention_secs).await?;
        Ok(())
    }
}

fn clean_name(name: Option<&str>) -> Option<String> {
    let trimmed = name?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(NAME_MAX_CHARS).collect())
}
