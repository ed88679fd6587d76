use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::events::CancelReason;

/// The lifecycle states of a ticket.
///
/// Each ticket flows through: WAITING | OFF_HOURS → CALLED → ATTENDED | CANCELLED | MISSED.
/// Cancelled and missed can also be reached straight from waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Waiting,
    OffHours,
    Called,
    Attended,
    Cancelled,
    Missed,
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(TicketState::Waiting),
            "off_hours" => Ok(TicketState::OffHours),
            "called" => Ok(TicketState::Called),
            "attended" => Ok(TicketState::Attended),
            "cancelled" => Ok(TicketState::Cancelled),
            "missed" => Ok(TicketState::Missed),
            other => Err(format!("unknown ticket state {other:?}")),
        }
    }
}

/// Evidence about one ticket gathered from sets, logs and timing keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateFlags {
    pub off_hours: bool,
    pub attended: bool,
    pub cancelled: bool,
    pub missed: bool,
    pub called: bool,
}

impl TicketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketState::Waiting => "waiting",
            TicketState::OffHours => "off_hours",
            TicketState::Called => "called",
            TicketState::Attended => "attended",
            TicketState::Cancelled => "cancelled",
            TicketState::Missed => "missed",
        }
    }

    /// Whether the ticket has left the line for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketState::Attended | TicketState::Cancelled | TicketState::Missed
        )
    }

    /// Rank used when several pieces of evidence disagree. Higher wins:
    /// off-hours > attended > cancelled > missed > called > waiting.
    pub fn precedence(&self) -> u8 {
        match self {
            TicketState::OffHours => 5,
            TicketState::Attended => 4,
            TicketState::Cancelled => 3,
            TicketState::Missed => 2,
            TicketState::Called => 1,
            TicketState::Waiting => 0,
        }
    }

    /// Collapses all evidence into the single highest-precedence state.
    pub fn derive(flags: StateFlags) -> TicketState {
        [
            (flags.off_hours, TicketState::OffHours),
            (flags.attended, TicketState::Attended),
            (flags.cancelled, TicketState::Cancelled),
            (flags.missed, TicketState::Missed),
            (flags.called, TicketState::Called),
        ]
        .into_iter()
        .filter(|(present, _)| *present)
        .map(|(_, state)| state)
        .max_by_key(TicketState::precedence)
        .unwrap_or(TicketState::Waiting)
    }
}

/// Something that happened to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketEvent {
    Enter { off_hours: bool },
    Call,
    Attend,
    Cancel(CancelReason),
}

/// The result of evaluating a ticket event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to the given state.
    Next(TicketState),
    /// Nothing to record; the ticket keeps its state.
    Unchanged(TicketState),
    /// The event lost against a terminal state that outranks it.
    Blocked(TicketState),
}

impl Transition {
    /// The state the ticket is in after the transition.
    pub fn state(&self) -> TicketState {
        match self {
            Transition::Next(s) | Transition::Unchanged(s) | Transition::Blocked(s) => *s,
        }
    }
}

/// Computes ticket transitions.
pub struct StateMachine;

impl StateMachine {
    /// Compute the transition for a ticket currently in `current` (or with no
    /// recorded state) receiving `event`.
    ///
    /// - Attend always wins: it moves any state to `Attended`, and a later
    ///   cancel or miss against `Attended` is `Blocked`.
    /// - A client cancel upgrades a `Missed` ticket to `Cancelled`; a miss
    ///   never downgrades a `Cancelled` ticket.
    /// - Calling a ticket that already left the line keeps its state.
    pub fn next(current: Option<TicketState>, event: TicketEvent) -> Transition {
        use TicketState::*;

        match (current, event) {
            (None, TicketEvent::Enter { off_hours: true }) => Transition::Next(OffHours),
            (None, TicketEvent::Enter { off_hours: false }) => Transition::Next(Waiting),
            (Some(state), TicketEvent::Enter { .. }) => Transition::Unchanged(state),

            (Some(state), TicketEvent::Call) if state.is_terminal() => Transition::Unchanged(state),
            (_, TicketEvent::Call) => Transition::Next(Called),

            (Some(Attended), TicketEvent::Attend) => Transition::Unchanged(Attended),
            (_, TicketEvent::Attend) => Transition::Next(Attended),

            (Some(Attended), TicketEvent::Cancel(_)) => Transition::Blocked(Attended),
            (Some(Cancelled), TicketEvent::Cancel(_)) => Transition::Unchanged(Cancelled),
            (Some(Missed), TicketEvent::Cancel(CancelReason::Missed)) => {
                Transition::Unchanged(Missed)
            }
            (_, TicketEvent::Cancel(CancelReason::Missed)) => Transition::Next(Missed),
            (_, TicketEvent::Cancel(CancelReason::Client)) => Transition::Next(Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_waiting_called_attended() {
        let t = StateMachine::next(None, TicketEvent::Enter { off_hours: false });
        assert_eq!(t, Transition::Next(TicketState::Waiting));

        let t = StateMachine::next(Some(t.state()), TicketEvent::Call);
        assert_eq!(t, Transition::Next(TicketState::Called));

        let t = StateMachine::next(Some(t.state()), TicketEvent::Attend);
        assert_eq!(t, Transition::Next(TicketState::Attended));

        // Attended is terminal for a second attend too.
        let t = StateMachine::next(Some(t.state()), TicketEvent::Attend);
        assert_eq!(t, Transition::Unchanged(TicketState::Attended));
    }

    #[test]
    fn off_hours_entry() {
        let t = StateMachine::next(None, TicketEvent::Enter { off_hours: true });
        assert_eq!(t, Transition::Next(TicketState::OffHours));
    }

    #[test]
    fn attend_wins_in_either_order() {
        // attend, then a late cancel
        let attended = StateMachine::next(Some(TicketState::Called), TicketEvent::Attend).state();
        let t = StateMachine::next(Some(attended), TicketEvent::Cancel(CancelReason::Missed));
        assert_eq!(t, Transition::Blocked(TicketState::Attended));

        // cancel, then a late attend
        let cancelled =
            StateMachine::next(Some(TicketState::Called), TicketEvent::Cancel(CancelReason::Client))
                .state();
        let t = StateMachine::next(Some(cancelled), TicketEvent::Attend);
        assert_eq!(t, Transition::Next(TicketState::Attended));
    }

    #[test]
    fn cancel_outranks_missed_but_not_the_reverse() {
        let t = StateMachine::next(
            Some(TicketState::Missed),
            TicketEvent::Cancel(CancelReason::Client),
        );
        assert_eq!(t, Transition::Next(TicketState::Cancelled));

        let t = StateMachine::next(
            Some(TicketState::Cancelled),
            TicketEvent::Cancel(CancelReason::Missed),
        );
        assert_eq!(t, Transition::Unchanged(TicketState::Cancelled));
    }

    #[test]
    fn calling_a_closed_ticket_keeps_its_state() {
        let t = StateMachine::next(Some(TicketState::Missed), TicketEvent::Call);
        assert_eq!(t, Transition::Unchanged(TicketState::Missed));
        let t = StateMachine::next(Some(TicketState::Called), TicketEvent::Call);
        assert_eq!(t, Transition::Next(TicketState::Called));
    }

    #[test]
    fn derive_uses_strict_precedence() {
        let all = StateFlags {
            off_hours: true,
            attended: true,
            cancelled: true,
            missed: true,
            called: true,
        };
        assert_eq!(TicketState::derive(all), TicketState::OffHours);

        let raced = StateFlags {
            attended: true,
            cancelled: true,
            called: true,
            ..Default::default()
        };
        assert_eq!(TicketState::derive(raced), TicketState::Attended);

        let both_closed = StateFlags {
            cancelled: true,
            missed: true,
            ..Default::default()
        };
        assert_eq!(TicketState::derive(both_closed), TicketState::Cancelled);

        assert_eq!(TicketState::derive(StateFlags::default()), TicketState::Waiting);
    }

    #[test]
    fn state_string_roundtrip() {
        for state in [
            TicketState::Waiting,
            TicketState::OffHours,
            TicketState::Called,
            TicketState::Attended,
            TicketState::Cancelled,
            TicketState::Missed,
        ] {
            assert_eq!(state.to_string().parse::<TicketState>(), Ok(state));
        }
        assert!("gone".parse::<TicketState>().is_err());
    }
}
