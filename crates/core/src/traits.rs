//! State machine traits.

use crate::{Action, Event};
use std::time::Duration;

/// A deterministic, synchronous state machine.
///
/// Implementations mutate internal state and return actions; they never
/// perform I/O. The runner sets the current time before delivering each
/// event so elapsed-time logic stays deterministic.
pub trait StateMachine {
    /// Process one event and return the resulting actions.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time. Called by the runner before `handle`.
    fn set_time(&mut self, now: Duration);

    /// The machine's view of the current time.
    fn now(&self) -> Duration;
}

/// A component state machine that handles a subset of events.
///
/// Composite machines route events to sub-machines; `try_handle` returns
/// `None` when the event is not this sub-machine's concern.
pub trait SubStateMachine {
    fn try_handle(&mut self, event: &Event) -> Option<Vec<Action>>;

    fn set_time(&mut self, now: Duration);
}
