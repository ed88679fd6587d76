//! Ticket lifecycle: the state machine, the log records it writes and the
//! engine that applies it to the store.

pub mod engine;
pub mod events;
pub mod reconcile;
pub mod state;

pub use engine::{
    Attended, BatchEntry, BatchImported, Call, CallOutcome, CancelOutcome, CancelTarget,
    CounterOutcome, EngineSettings, EnterRequest, Entered, QueueEngine, ResetOutcome, TicketClass,
};
pub use events::{
    AttendedEvent, CalledEvent, CancelReason, CancelledEvent, EnteredEvent, EntrySource,
    ResetEvent,
};
pub use state::{StateFlags, StateMachine, TicketEvent, TicketState, Transition};
