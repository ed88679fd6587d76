use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::Projector;
use crate::error::{QueueError, Result};
use crate::keys::SetKind;
use crate::lifecycle::{StateFlags, TicketState};
use crate::store::{TicketStore, parse_i64, parse_u64};

/// Snapshot polled by clients and monitors. Carries enough for a client to
/// work out its own position without another round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub current_call: u64,
    pub call_counter: u64,
    pub ticket_counter: u64,
    pub current_attendant: String,
    pub current_call_ts: Option<i64>,
    pub current_call_priority: bool,
    /// When the snapshot was taken.
    pub ts: i64,
    pub cancelled: BTreeSet<u64>,
    pub missed: BTreeSet<u64>,
    pub attended: BTreeSet<u64>,
    pub skipped: BTreeSet<u64>,
    pub off_hours: BTreeSet<u64>,
    /// Priority tickets not yet called.
    pub priority: BTreeSet<u64>,
    /// Every ticket that was ever priority.
    pub priority_history: BTreeSet<u64>,
    pub names: BTreeMap<u64, String>,
    /// Tickets still in line, lowest first.
    pub queue: Vec<u64>,
    pub attended_count: usize,
    pub cancelled_count: usize,
    pub missed_count: usize,
    pub waiting: usize,
    pub preferential_desk: bool,
}

impl StatusView {
    /// How many tickets are ahead of `ticket`, or `None` if it is not in
    /// line. With a preferential desk only tickets of the same class count.
    pub fn position_of(&self, ticket: u64) -> Option<usize> {
        if !self.queue.contains(&ticket) {
            return None;
        }
        let is_priority = self.priority_history.contains(&ticket);
        Some(
            self.queue
                .iter()
                .take_while(|n| **n < ticket)
                .filter(|n| {
                    !self.preferential_desk || self.priority_history.contains(*n) == is_priority
                })
                .count(),
        )
    }

    /// State of `ticket` as seen through this snapshot.
    pub fn state_of(&self, ticket: u64) -> TicketState {
        TicketState::derive(StateFlags {
            off_hours: self.off_hours.contains(&ticket),
            attended: self.attended.contains(&ticket),
            cancelled: self.cancelled.contains(&ticket),
            missed: self.missed.contains(&ticket),
            called: ticket <= self.ticket_counter && !self.queue.contains(&ticket),
        })
    }

    /// True when anything but the snapshot time differs.
    pub fn differs_from(&self, other: &StatusView) -> bool {
        let mut this = self.clone();
        this.ts = other.ts;
        this != *other
    }
}

/// What the client page shows for one browser session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientView {
    pub ticket_number: u64,
    pub state: TicketState,
    pub priority: bool,
    /// Tickets ahead in line; absent once the ticket left the line.
    pub ahead: Option<usize>,
    pub being_called: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendant: Option<String>,
    pub current_call: u64,
}

impl<S: TicketStore> Projector<S> {
    pub async fn status(&self, tenant: &str) -> Result<StatusView> {
        let keys = self.tenants.require(tenant).await?;
        let store = &self.store;

        let ticket_counter = parse_u64(store.get(&keys.ticket_counter()).await?);
        let call_counter = parse_u64(store.get(&keys.call_counter()).await?);
        let current_call = parse_u64(store.get(&keys.current_call()).await?);
        let current_attendant = store
            .get(&keys.current_attendant())
            .await?
            .unwrap_or_default();
        let current_call_ts = parse_i64(store.get(&keys.current_call_ts()).await?);
        let current_call_priority =
            store.get(&keys.current_call_priority()).await?.as_deref() == Some("1");

        // Attended overrides whatever cancel or miss a race left behind.
        let attended = self.numbers(&keys.set(SetKind::Attended)).await?;
        let cancelled: BTreeSet<u64> = self
            .numbers(&keys.set(SetKind::Cancelled))
            .await?
            .difference(&attended)
            .copied()
            .collect();
        let missed: BTreeSet<u64> = self
            .numbers(&keys.set(SetKind::Missed))
            .await?
            .into_iter()
            .filter(|n| !attended.contains(n) && !cancelled.contains(n))
            .collect();
        let skipped = self.numbers(&keys.set(SetKind::Skipped)).await?;
        let off_hours = self.numbers(&keys.set(SetKind::OffHours)).await?;
        let priority = self.numbers(&keys.set(SetKind::Priority)).await?;
        let priority_history = self.numbers(&keys.set(SetKind::PriorityHistory)).await?;

        let names: BTreeMap<u64, String> = store
            .hgetall(&keys.ticket_names())
            .await?
            .into_iter()
            .filter_map(|(n, name)| Some((n.parse().ok()?, name)))
            .collect();
        let states: HashMap<u64, TicketState> = store
            .hgetall(&keys.ticket_state())
            .await?
            .into_iter()
            .filter_map(|(n, s)| Some((n.parse().ok()?, s.parse().ok()?)))
            .collect();

        let queue: Vec<u64> = (1..=ticket_counter)
            .filter(|n| {
                !attended.contains(n)
                    && !cancelled.contains(n)
                    && !missed.contains(n)
                    && !skipped.contains(n)
                    && *n != current_call
            })
            .filter(|n| match states.get(n) {
                Some(state) => matches!(state, TicketState::Waiting | TicketState::OffHours),
                None => *n > call_counter,
            })
            .collect();

        let preferential_desk = self.tenants.monitor(&keys).await?.preferential_desk;

        Ok(StatusView {
            current_call,
            call_counter,
            ticket_counter,
            current_attendant,
            current_call_ts,
            current_call_priority,
            ts: self.clock.now_ms(),
            attended_count: attended.len(),
            cancelled_count: cancelled.len(),
            missed_count: missed.len(),
            waiting: queue.len(),
            cancelled,
            missed,
            attended,
            skipped,
            off_hours,
            priority,
            priority_history,
            names,
            queue,
            preferential_desk,
        })
    }

    /// The ticket behind a client session and where it stands.
    pub async fn client_view(&self, tenant: &str, client_id: &str) -> Result<ClientView> {
        let keys = self.tenants.require(tenant).await?;
        let ticket = parse_u64(self.store.get(&keys.client_ticket(client_id)).await?);
        if ticket == 0 {
            return Err(QueueError::NotFound(format!("client {client_id} has no ticket")));
        }

        let view = self.status(tenant).await?;
        let being_called = view.current_call == ticket;
        Ok(ClientView {
            ticket_number: ticket,
            state: view.state_of(ticket),
            priority: view.priority_history.contains(&ticket),
            ahead: view.position_of(ticket),
            being_called,
            attendant: being_called.then(|| view.current_attendant.clone()),
            current_call: view.current_call,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::lifecycle::{
        CancelReason, CancelTarget, EngineSettings, EnterRequest, QueueEngine,
    };
    use crate::store::MemoryStore;
    use crate::tenant::{MonitorConfig, Registration};

    async fn setup() -> (QueueEngine<MemoryStore>, Projector<MemoryStore>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        ));
        let engine = QueueEngine::new(store.clone(), clock.clone(), EngineSettings::default());
        engine
            .tenants()
            .register(Registration {
                tenant_id: "acme".into(),
                credential_hash: "hash".into(),
                label: String::new(),
                schedule: None,
            })
            .await
            .unwrap();
        (engine, Projector::new(store, clock))
    }

    fn entry(priority: bool) -> EnterRequest {
        EnterRequest {
            priority,
            name: None,
        }
    }

    #[tokio::test]
    async fn status_after_a_full_cycle() {
        let (engine, projector) = setup().await;
        engine.enter("acme", entry(false)).await.unwrap();
        engine.call("acme", "A1", None).await.unwrap();

        let view = projector.status("acme").await.unwrap();
        assert_eq!(view.current_call, 1);
        assert_eq!(view.current_attendant, "A1");
        assert_eq!(view.waiting, 0);
        assert_eq!(view.state_of(1), TicketState::Called);

        engine.attend("acme", 1).await.unwrap();
        let view = projector.status("acme").await.unwrap();
        assert_eq!(view.attended_count, 1);
        assert_eq!(view.waiting, 0);
        assert_eq!(view.current_call, 0);
        assert_eq!(view.ticket_counter, 1);
    }

    #[tokio::test]
    async fn attended_hides_a_stale_cancel() {
        let (engine, projector) = setup().await;
        engine.enter("acme", entry(false)).await.unwrap();
        engine
            .cancel("acme", CancelTarget::Ticket(1), CancelReason::Missed, None)
            .await
            .unwrap();
        engine.attend("acme", 1).await.unwrap();

        let view = projector.status("acme").await.unwrap();
        assert!(view.missed.is_empty());
        assert_eq!(view.attended, BTreeSet::from([1]));
        assert_eq!(view.state_of(1), TicketState::Attended);
    }

    #[tokio::test]
    async fn position_counts_tickets_ahead() {
        let (engine, projector) = setup().await;
        for priority in [false, true, false, false] {
            engine.enter("acme", entry(priority)).await.unwrap();
        }
        engine
            .cancel("acme", CancelTarget::Ticket(3), CancelReason::Client, None)
            .await
            .unwrap();

        let view = projector.status("acme").await.unwrap();
        assert_eq!(view.queue, vec![1, 2, 4]);
        assert_eq!(view.position_of(1), Some(0));
        assert_eq!(view.position_of(4), Some(2));
        assert_eq!(view.position_of(3), None);

        engine
            .tenants()
            .set_monitor(
                "acme",
                &MonitorConfig {
                    label: String::new(),
                    preferential_desk: true,
                },
            )
            .await
            .unwrap();
        let view = projector.status("acme").await.unwrap();
        // Ticket 2 is priority and is counted in its own line.
        assert_eq!(view.position_of(4), Some(1));
        assert_eq!(view.position_of(2), Some(0));
    }

    #[tokio::test]
    async fn client_view_follows_the_ticket() {
        let (engine, projector) = setup().await;
        engine.enter("acme", entry(false)).await.unwrap();
        let client_id = engine
            .enter("acme", entry(false))
            .await
            .unwrap()
            .client_id
            .unwrap();

        let view = projector.client_view("acme", &client_id).await.unwrap();
        assert_eq!(view.ticket_number, 2);
        assert_eq!(view.ahead, Some(1));
        assert_eq!(view.state, TicketState::Waiting);

        engine.call("acme", "A1", None).await.unwrap();
        engine.call("acme", "Guichê 2", None).await.unwrap();
        let view = projector.client_view("acme", &client_id).await.unwrap();
        assert!(view.being_called);
        assert_eq!(view.attendant.as_deref(), Some("Guichê 2"));
        assert_eq!(view.ahead, None);

        let err = projector.client_view("acme", "nope").await.unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }

    #[tokio::test]
    async fn reset_zeroes_the_status() {
        let (engine, projector) = setup().await;
        engine.enter("acme", entry(true)).await.unwrap();
        engine.enter("acme", entry(false)).await.unwrap();
        engine.call("acme", "A1", None).await.unwrap();
        engine.attend("acme", 1).await.unwrap();
        engine.reset("acme", "A1").await.unwrap();

        let view = projector.status("acme").await.unwrap();
        assert_eq!(
            (view.ticket_counter, view.call_counter, view.current_call),
            (0, 0, 0)
        );
        assert!(view.attended.is_empty() && view.priority_history.is_empty());
        assert!(view.names.is_empty() && view.queue.is_empty());
    }

    #[tokio::test]
    async fn differs_ignores_the_timestamp() {
        let (engine, projector) = setup().await;
        let a = projector.status("acme").await.unwrap();
        let mut b = a.clone();
        b.ts += 5_000;
        assert!(!a.differs_from(&b));

        engine.enter("acme", entry(false)).await.unwrap();
        let c = projector.status("acme").await.unwrap();
        assert!(c.differs_from(&a));
    }
}
