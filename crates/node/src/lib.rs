//! Node state machine.
//!
//! Composes the per-round consensus engine with the node-lifetime state
//! around it: the open ledger (local transaction pool), the trusted
//! validation tally, the proposal replay buffer, held closed ledgers, and
//! the local clock offset. Routes events, finishes rounds, and starts the
//! next one.

mod open_ledger;
mod state;

pub use open_ledger::OpenLedgerState;
pub use state::NodeStateMachine;
