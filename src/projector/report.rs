use std::collections::HashMap;

use serde::Serialize;

use super::Projector;
use crate::error::Result;
use crate::keys::{LogKind, SetKind, TenantKeys, TimingKind};
use crate::lifecycle::reconcile;
use crate::lifecycle::{
    AttendedEvent, CalledEvent, CancelReason, CancelledEvent, EnteredEvent, StateFlags,
    TicketState,
};
use crate::store::{TicketStore, parse_i64, parse_u64};

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    pub ticket: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub priority: bool,
    pub status: TicketState,
    pub entered_at: Option<i64>,
    pub called_at: Option<i64>,
    pub attended_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Milliseconds in line.
    pub wait: Option<i64>,
    /// Milliseconds at the desk.
    pub duration: Option<i64>,
}

/// Count and averages over a group of tickets. Averages only include tickets
/// that have the value and are 0 for an empty group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub count: usize,
    pub avg_wait: i64,
    pub avg_duration: i64,
}

impl Stats {
    fn of<'a>(records: impl Iterator<Item = &'a TicketRecord>) -> Self {
        let (mut count, mut waits, mut durations) = (0, Vec::new(), Vec::new());
        for record in records {
            count += 1;
            waits.extend(record.wait);
            durations.extend(record.duration);
        }
        Self {
            count,
            avg_wait: average(&waits),
            avg_duration: average(&durations),
        }
    }
}

fn average(values: &[i64]) -> i64 {
    if values.is_empty() {
        0
    } else {
        values.iter().sum::<i64>() / values.len() as i64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub waiting: Stats,
    pub off_hours: Stats,
    pub called: Stats,
    pub attended: Stats,
    pub cancelled: Stats,
    pub missed: Stats,
    pub priority: Stats,
    pub normal: Stats,
}

impl ReportSummary {
    fn from_records(records: &[TicketRecord]) -> Self {
        let by_state = |state: TicketState| Stats::of(records.iter().filter(|r| r.status == state));
        Self {
            total: records.len(),
            waiting: by_state(TicketState::Waiting),
            off_hours: by_state(TicketState::OffHours),
            called: by_state(TicketState::Called),
            attended: by_state(TicketState::Attended),
            cancelled: by_state(TicketState::Cancelled),
            missed: by_state(TicketState::Missed),
            priority: Stats::of(records.iter().filter(|r| r.priority)),
            normal: Stats::of(records.iter().filter(|r| !r.priority)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub tenant: String,
    pub generated_at: i64,
    pub ticket_counter: u64,
    pub tickets: Vec<TicketRecord>,
    pub summary: ReportSummary,
}

/// The shared cancelled log split by reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellations {
    pub cancelled: Vec<CancelledEvent>,
    pub missed: Vec<CancelledEvent>,
}

/// Timestamps of one ticket, logs first, timing keys as fallback.
#[derive(Debug, Default)]
struct Timeline {
    entered: Option<i64>,
    called: Option<i64>,
    attended: Option<i64>,
    cancelled: Option<i64>,
}

impl Timeline {
    fn is_empty(&self) -> bool {
        self.entered.is_none()
            && self.called.is_none()
            && self.attended.is_none()
            && self.cancelled.is_none()
    }
}

/// Logs indexed by ticket, keeping the newest event for each.
#[derive(Default)]
struct LogIndex {
    entered: HashMap<u64, EnteredEvent>,
    called: HashMap<u64, CalledEvent>,
    attended: HashMap<u64, AttendedEvent>,
    cancelled: HashMap<u64, CancelledEvent>,
}

fn keep_newest<T>(index: &mut HashMap<u64, T>, events: Vec<T>, key: impl Fn(&T) -> (u64, i64)) {
    for event in events {
        let (ticket, ts) = key(&event);
        match index.get(&ticket) {
            Some(existing) if key(existing).1 >= ts => {}
            _ => {
                index.insert(ticket, event);
            }
        }
    }
}

impl<S: TicketStore> Projector<S> {
    /// Every issued ticket with its status and timings, plus a summary.
    ///
    /// Also clears off-hours markers once the schedule is open and drops skip
    /// markers from numbers that turn out to have been used.
    pub async fn report(&self, tenant: &str) -> Result<Report> {
        let keys = self.tenants.require(tenant).await?;
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        reconcile::release_off_hours(&self.store, &self.tenants, &keys, now).await?;

        let ticket_counter = parse_u64(self.store.get(&keys.ticket_counter()).await?);
        let attended_set = self.numbers(&keys.set(SetKind::Attended)).await?;
        let cancelled_set = self.numbers(&keys.set(SetKind::Cancelled)).await?;
        let missed_set = self.numbers(&keys.set(SetKind::Missed)).await?;
        let off_hours_set = self.numbers(&keys.set(SetKind::OffHours)).await?;
        let skipped_set = self.numbers(&keys.set(SetKind::Skipped)).await?;
        let priority_set = self.numbers(&keys.set(SetKind::PriorityHistory)).await?;
        let names = self.store.hgetall(&keys.ticket_names()).await?;
        let logs = self.log_index(&keys).await?;

        let mut tickets = Vec::new();
        for ticket in 1..=ticket_counter {
            let timeline = self.timeline(&keys, ticket, &logs).await?;
            if skipped_set.contains(&ticket) {
                if timeline.is_empty() {
                    continue;
                }
                tracing::debug!(tenant = keys.tenant(), ticket, "dropping stale skip marker");
                self.store
                    .srem(&keys.set(SetKind::Skipped), &ticket.to_string())
                    .await?;
            }

            let cancel_event = logs.cancelled.get(&ticket);
            let in_cancel_sets = cancelled_set.contains(&ticket) || missed_set.contains(&ticket);
            let flags = StateFlags {
                off_hours: off_hours_set.contains(&ticket),
                attended: attended_set.contains(&ticket) || timeline.attended.is_some(),
                cancelled: cancelled_set.contains(&ticket)
                    || (!in_cancel_sets
                        && cancel_event.is_some_and(|e| e.reason == CancelReason::Client)),
                missed: missed_set.contains(&ticket)
                    || (!in_cancel_sets
                        && cancel_event.is_some_and(|e| e.reason == CancelReason::Missed)),
                called: timeline.called.is_some(),
            };
            let status = TicketState::derive(flags);

            let wait = timeline.entered.map(|entered| {
                let until = timeline
                    .called
                    .or(timeline.cancelled)
                    .or(timeline.attended)
                    .unwrap_or(now_ms);
                (until - entered).max(0)
            });
            let duration = match (timeline.called, timeline.attended) {
                (Some(called), Some(attended)) => Some((attended - called).max(0)),
                (Some(called), None) if status == TicketState::Called => {
                    Some((now_ms - called).max(0))
                }
                _ => cancel_event
                    .filter(|_| matches!(status, TicketState::Cancelled | TicketState::Missed))
                    .map(|e| e.duration),
            };

            let entered_event = logs.entered.get(&ticket);
            let called_event = logs.called.get(&ticket);
            let name = match names.get(&ticket.to_string()) {
                Some(name) => Some(name.clone()),
                None => match entered_event.and_then(|e| e.name.clone()) {
                    Some(name) => Some(name),
                    None => self.store.get(&keys.manual_name(ticket)).await?,
                },
            };

            tickets.push(TicketRecord {
                ticket,
                name,
                priority: priority_set.contains(&ticket) || entered_event.is_some_and(|e| e.priority),
                status,
                entered_at: timeline.entered,
                called_at: timeline.called,
                attended_at: timeline.attended,
                cancelled_at: timeline.cancelled,
                attendant: called_event.map(|e| e.attendant.clone()),
                call_id: called_event.map(|e| e.call_id.clone()),
                wait,
                duration,
            });
        }

        let summary = ReportSummary::from_records(&tickets);
        tracing::debug!(tenant = keys.tenant(), tickets = tickets.len(), "report built");
        Ok(Report {
            tenant: keys.tenant().to_string(),
            generated_at: now_ms,
            ticket_counter,
            tickets,
            summary,
        })
    }

    /// Cancelled-log entries split into cancelled and missed, newest first.
    /// Tickets that ended up attended are left out.
    pub async fn cancellations(&self, tenant: &str) -> Result<Cancellations> {
        let keys = self.tenants.require(tenant).await?;
        let attended = self.numbers(&keys.set(SetKind::Attended)).await?;
        let events: Vec<CancelledEvent> = self.log(&keys.log(LogKind::Cancelled)).await?;

        let (missed, cancelled) = events
            .into_iter()
            .filter(|e| !attended.contains(&e.ticket))
            .partition(|e| e.reason == CancelReason::Missed);
        Ok(Cancellations { cancelled, missed })
    }

    /// Attended-log entries, newest first.
    pub async fn attendances(&self, tenant: &str) -> Result<Vec<AttendedEvent>> {
        let keys = self.tenants.require(tenant).await?;
        self.log(&keys.log(LogKind::Attended)).await
    }

    async fn log_index(&self, keys: &TenantKeys) -> Result<LogIndex> {
        let mut index = LogIndex::default();
        keep_newest(
            &mut index.entered,
            self.log(&keys.log(LogKind::Entered)).await?,
            |e: &EnteredEvent| (e.ticket, e.ts),
        );
        keep_newest(
            &mut index.called,
            self.log(&keys.log(LogKind::Called)).await?,
            |e: &CalledEvent| (e.ticket, e.ts),
        );
        keep_newest(
            &mut index.attended,
            self.log(&keys.log(LogKind::Attended)).await?,
            |e: &AttendedEvent| (e.ticket, e.ts),
        );
        keep_newest(
            &mut index.cancelled,
            self.log(&keys.log(LogKind::Cancelled)).await?,
            |e: &CancelledEvent| (e.ticket, e.ts),
        );
        Ok(index)
    }

    async fn timeline(&self, keys: &TenantKeys, ticket: u64, logs: &LogIndex) -> Result<Timeline> {
        let mut timeline = Timeline {
            entered: logs.entered.get(&ticket).map(|e| e.ts),
            called: logs.called.get(&ticket).map(|e| e.ts),
            attended: logs.attended.get(&ticket).map(|e| e.ts),
            cancelled: logs.cancelled.get(&ticket).map(|e| e.ts),
        };
        for (slot, kind) in [
            (&mut timeline.entered, TimingKind::Entered),
            (&mut timeline.called, TimingKind::Called),
            (&mut timeline.attended, TimingKind::Attended),
            (&mut timeline.cancelled, TimingKind::Cancelled),
        ] {
            if slot.is_none() {
                *slot = parse_i64(self.store.get(&keys.timing(kind, ticket)).await?);
            }
        }
        Ok(timeline)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::lifecycle::{CancelTarget, EngineSettings, EnterRequest, QueueEngine};
    use crate::schedule::Schedule;
    use crate::store::MemoryStore;
    use crate::tenant::Registration;

    struct Fixture {
        engine: QueueEngine<MemoryStore>,
        projector: Projector<MemoryStore>,
        clock: Arc<ManualClock>,
        store: MemoryStore,
        keys: TenantKeys,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
        ));
        let engine = QueueEngine::new(store.clone(), clock.clone(), EngineSettings::default());
        let keys = engine
            .tenants()
            .register(Registration {
                tenant_id: "acme".into(),
                credential_hash: "hash".into(),
                label: String::new(),
                schedule: None,
            })
            .await
            .unwrap();
        Fixture {
            engine,
            projector: Projector::new(store.clone(), clock.clone()),
            clock,
            store,
            keys,
        }
    }

    fn enter(priority: bool, name: Option<&str>) -> EnterRequest {
        EnterRequest {
            priority,
            name: name.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn statuses_wait_and_duration() {
        let f = fixture().await;
        f.engine.enter("acme", enter(false, Some("Ana"))).await.unwrap();
        f.engine.enter("acme", enter(true, None)).await.unwrap();
        f.engine.enter("acme", enter(false, None)).await.unwrap();
        f.engine.enter("acme", enter(false, None)).await.unwrap();

        f.clock.advance(Duration::seconds(60));
        // Priority ticket 2 goes first.
        f.engine.call("acme", "A1", None).await.unwrap();
        f.clock.advance(Duration::seconds(30));
        f.engine.attend("acme", 2).await.unwrap();

        f.engine.call("acme", "A1", None).await.unwrap();
        f.clock.advance(Duration::seconds(10));
        f.engine
            .cancel("acme", CancelTarget::Ticket(1), CancelReason::Missed, None)
            .await
            .unwrap();
        f.engine
            .cancel("acme", CancelTarget::Ticket(4), CancelReason::Client, None)
            .await
            .unwrap();
        f.clock.advance(Duration::seconds(20));

        let report = f.projector.report("acme").await.unwrap();
        assert_eq!(report.tickets.len(), 4);
        let t = |n: usize| &report.tickets[n - 1];

        assert_eq!(t(1).status, TicketState::Missed);
        assert_eq!(t(1).name.as_deref(), Some("Ana"));
        assert_eq!(t(1).wait, Some(90_000));
        assert_eq!(t(1).duration, Some(10_000));

        assert_eq!(t(2).status, TicketState::Attended);
        assert!(t(2).priority);
        assert_eq!(t(2).wait, Some(60_000));
        assert_eq!(t(2).duration, Some(30_000));
        assert_eq!(t(2).attendant.as_deref(), Some("A1"));

        // Still waiting: measured up to now.
        assert_eq!(t(3).status, TicketState::Waiting);
        assert_eq!(t(3).wait, Some(120_000));
        assert_eq!(t(3).duration, None);

        assert_eq!(t(4).status, TicketState::Cancelled);
        assert_eq!(t(4).wait, Some(100_000));

        let s = &report.summary;
        assert_eq!(s.total, 4);
        assert_eq!(
            (s.attended.count, s.missed.count, s.cancelled.count, s.waiting.count),
            (1, 1, 1, 1)
        );
        assert_eq!(s.attended.avg_duration, 30_000);
        assert_eq!((s.priority.count, s.normal.count), (1, 3));
        assert_eq!(s.priority.avg_wait, 60_000);
    }

    #[tokio::test]
    async fn called_ticket_duration_runs_until_now() {
        let f = fixture().await;
        f.engine.enter("acme", enter(false, None)).await.unwrap();
        f.engine.call("acme", "A1", None).await.unwrap();
        f.clock.advance(Duration::seconds(42));

        let report = f.projector.report("acme").await.unwrap();
        assert_eq!(report.tickets[0].status, TicketState::Called);
        assert_eq!(report.tickets[0].duration, Some(42_000));
        assert_eq!(report.tickets[0].wait, Some(0));
    }

    #[tokio::test]
    async fn most_recent_call_wins() {
        let f = fixture().await;
        f.engine.enter("acme", enter(false, None)).await.unwrap();
        f.engine.call("acme", "A1", None).await.unwrap();
        f.clock.advance(Duration::seconds(5));
        f.engine.call("acme", "A2", Some(1)).await.unwrap();

        let report = f.projector.report("acme").await.unwrap();
        assert_eq!(report.tickets[0].attendant.as_deref(), Some("A2"));
        let log: Vec<CalledEvent> = f.projector.log(&f.keys.log(LogKind::Called)).await.unwrap();
        assert_eq!(report.tickets[0].call_id.as_ref(), Some(&log[0].call_id));
    }

    #[tokio::test]
    async fn timing_keys_fill_in_for_trimmed_logs() {
        let f = fixture().await;
        f.engine.enter("acme", enter(false, None)).await.unwrap();
        f.engine.call("acme", "A1", None).await.unwrap();
        f.clock.advance(Duration::seconds(15));
        f.engine.attend("acme", 1).await.unwrap();

        for kind in [LogKind::Entered, LogKind::Called, LogKind::Attended] {
            f.store.del(&f.keys.log(kind)).await.unwrap();
        }
        let report = f.projector.report("acme").await.unwrap();
        assert_eq!(report.tickets[0].status, TicketState::Attended);
        assert_eq!(report.tickets[0].duration, Some(15_000));
        assert_eq!(report.tickets[0].attendant, None);
    }

    #[tokio::test]
    async fn skipped_numbers_are_left_out_unless_used() {
        let f = fixture().await;
        f.engine.enter("acme", enter(false, None)).await.unwrap();
        f.engine.set_ticket_counter("acme", 5).await.unwrap();
        f.engine.enter("acme", enter(false, None)).await.unwrap();

        // Number 3 was used after all, say by an import from another desk.
        f.store
            .set(&f.keys.timing(TimingKind::Entered, 3), "1772452800000")
            .await
            .unwrap();

        let report = f.projector.report("acme").await.unwrap();
        let numbers: Vec<u64> = report.tickets.iter().map(|t| t.ticket).collect();
        assert_eq!(numbers, vec![1, 3, 5]);

        let skipped = f.projector.numbers(&f.keys.set(SetKind::Skipped)).await.unwrap();
        assert_eq!(skipped, BTreeSet::from([2, 4]));
    }

    #[tokio::test]
    async fn report_releases_off_hours_once_open() {
        let f = fixture().await;
        let schedule = Schedule {
            enabled: true,
            timezone: "UTC".into(),
            days: vec![1],
            start: "13:00".into(),
            end: "18:00".into(),
        };
        f.engine.tenants().set_schedule("acme", &schedule).await.unwrap();
        f.engine.enter("acme", enter(false, None)).await.unwrap();

        let report = f.projector.report("acme").await.unwrap();
        assert_eq!(report.tickets[0].status, TicketState::OffHours);
        assert_eq!(report.summary.off_hours.count, 1);

        f.clock.advance(Duration::hours(1));
        let report = f.projector.report("acme").await.unwrap();
        assert_eq!(report.tickets[0].status, TicketState::Waiting);
        assert!(
            f.store
                .smembers(&f.keys.set(SetKind::OffHours))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn cancellations_split_by_reason_and_respect_attend() {
        let f = fixture().await;
        for _ in 0..3 {
            f.engine.enter("acme", enter(false, None)).await.unwrap();
        }
        f.engine
            .cancel("acme", CancelTarget::Ticket(1), CancelReason::Client, None)
            .await
            .unwrap();
        f.engine
            .cancel("acme", CancelTarget::Ticket(2), CancelReason::Missed, None)
            .await
            .unwrap();
        f.engine
            .cancel("acme", CancelTarget::Ticket(3), CancelReason::Missed, None)
            .await
            .unwrap();
        f.engine.attend("acme", 3).await.unwrap();

        let split = f.projector.cancellations("acme").await.unwrap();
        assert_eq!(split.cancelled.iter().map(|e| e.ticket).collect::<Vec<_>>(), vec![1]);
        assert_eq!(split.missed.iter().map(|e| e.ticket).collect::<Vec<_>>(), vec![2]);

        let attended = f.projector.attendances("acme").await.unwrap();
        assert_eq!(attended.len(), 1);
        assert_eq!(attended[0].ticket, 3);
    }

    #[tokio::test]
    async fn empty_tenant_reports_nothing() {
        let f = fixture().await;
        let report = f.projector.report("acme").await.unwrap();
        assert!(report.tickets.is_empty());
        assert_eq!(report.summary, ReportSummary::default());
    }

    #[tokio::test]
    async fn reset_leaves_an_empty_report() {
        let f = fixture().await;
        for priority in [false, true, false, false] {
            f.engine.enter("acme", enter(priority, Some("Ana"))).await.unwrap();
        }
        f.engine.call("acme", "A1", None).await.unwrap();
        f.engine.attend("acme", 2).await.unwrap();
        f.engine
            .cancel("acme", CancelTarget::Ticket(3), CancelReason::Missed, None)
            .await
            .unwrap();
        f.engine
            .cancel("acme", CancelTarget::Ticket(4), CancelReason::Client, None)
            .await
            .unwrap();
        f.engine.set_ticket_counter("acme", 8).await.unwrap();

        f.engine.reset("acme", "A1").await.unwrap();

        let report = f.projector.report("acme").await.unwrap();
        assert_eq!(report.ticket_counter, 0);
        assert!(report.tickets.is_empty());
        assert_eq!(report.summary, ReportSummary::default());

        let split = f.projector.cancellations("acme").await.unwrap();
        assert!(split.cancelled.is_empty() && split.missed.is_empty());
        assert!(f.projector.attendances("acme").await.unwrap().is_empty());
        for kind in [SetKind::Skipped, SetKind::OffHours, SetKind::Attended] {
            assert!(f.store.smembers(&f.keys.set(kind)).await.unwrap().is_empty());
        }
    }
}
