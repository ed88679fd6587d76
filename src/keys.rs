//! Per-tenant key layout.
//!
//! Every tenant key lives under `tenant:<id>:` so a tenant can be wiped with
//! one prefix delete. Monitor configuration sits outside that prefix.

use crate::error::{QueueError, Result};

/// Per-ticket scalar key families removed by reset.
pub const TICKET_KEY_FAMILIES: &[&str] = &[
    "ticketTime:",
    "calledTime:",
    "attendedTime:",
    "cancelledTime:",
    "wait:",
    "manualName:",
    "push:",
    "ticket:",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Entered,
    Called,
    Attended,
    Cancelled,
    Reset,
}

impl LogKind {
    fn suffix(self) -> &'static str {
        match self {
            LogKind::Entered => "log:entered",
            LogKind::Called => "log:called",
            LogKind::Attended => "log:attended",
            LogKind::Cancelled => "log:cancelled",
            LogKind::Reset => "log:reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Attended,
    Cancelled,
    Missed,
    OffHours,
    Skipped,
    Priority,
    PriorityHistory,
}

impl SetKind {
    fn suffix(self) -> &'static str {
        match self {
            SetKind::Attended => "attendedSet",
            SetKind::Cancelled => "cancelledSet",
            SetKind::Missed => "missedSet",
            SetKind::OffHours => "offHoursSet",
            SetKind::Skipped => "skippedSet",
            SetKind::Priority => "prioritySet",
            SetKind::PriorityHistory => "priorityHistory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingKind {
    Entered,
    Called,
    Attended,
    Cancelled,
    Wait,
}

impl TimingKind {
    fn family(self) -> &'static str {
        match self {
            TimingKind::Entered => "ticketTime:",
            TimingKind::Called => "calledTime:",
            TimingKind::Attended => "attendedTime:",
            TimingKind::Cancelled => "cancelledTime:",
            TimingKind::Wait => "wait:",
        }
    }
}

/// Builds the keys of one tenant. Construct through [`TenantKeys::new`],
/// which validates the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantKeys {
    tenant: String,
    prefix: String,
}

impl TenantKeys {
    /// Tenant ids are 1-64 characters of `[A-Za-z0-9_-]`, which keeps them
    /// free of key separators and scan glob characters.
    pub fn new(tenant: &str) -> Result<Self> {
        let valid = !tenant.is_empty()
            && tenant.len() <= 64
            && tenant
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(QueueError::InvalidTenant(tenant.to_string()));
        }
        Ok(Self {
            tenant: tenant.to_string(),
            prefix: format!("tenant:{tenant}:"),
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Prefix shared by every key of the tenant.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }

    pub fn credential_hash(&self) -> String {
        self.key("pwHash")
    }

    pub fn label(&self) -> String {
        self.key("label")
    }

    pub fn schedule(&self) -> String {
        self.key("schedule")
    }

    pub fn monitor(&self) -> String {
        format!("monitor:{}", self.tenant)
    }

    pub fn ticket_counter(&self) -> String {
        self.key("ticketCounter")
    }

    pub fn call_counter(&self) -> String {
        self.key("callCounter")
    }

    pub fn current_call(&self) -> String {
        self.key("currentCall")
    }

    pub fn current_call_ts(&self) -> String {
        self.key("currentCallTs")
    }

    pub fn current_attendant(&self) -> String {
        self.key("currentAttendant")
    }

    pub fn current_call_priority(&self) -> String {
        self.key("currentCallPriority")
    }

    pub fn call_lock(&self) -> String {
        self.key("callLock")
    }

    pub fn set(&self, kind: SetKind) -> String {
        self.key(kind.suffix())
    }

    pub fn priority_queue(&self) -> String {
        self.key("priorityQueue")
    }

    pub fn log(&self, kind: LogKind) -> String {
        self.key(kind.suffix())
    }

    pub fn timing(&self, kind: TimingKind, ticket: u64) -> String {
        self.key(&format!("{}{ticket}", kind.family()))
    }

    /// Hash of ticket number to display name.
    pub fn ticket_names(&self) -> String {
        self.key("ticketNames")
    }

    /// Name typed by an attendant for a manually added ticket.
    pub fn manual_name(&self, ticket: u64) -> String {
        self.key(&format!("manualName:{ticket}"))
    }

    /// Hash of ticket number to explicit lifecycle state.
    pub fn ticket_state(&self) -> String {
        self.key("ticketState")
    }

    pub fn client_ticket(&self, client_id: &str) -> String {
        self.key(&format!("ticket:{client_id}"))
    }

    pub fn push_subscription(&self, ticket: u64) -> String {
        self.key(&format!("push:{ticket}"))
    }

    /// Prefix of one per-ticket key family, for scan-delete.
    pub fn family_prefix(&self, family: &str) -> String {
        self.key(family)
    }
}
