//! Event types for the deterministic state machine.

use meridian_types::{
    CloseTime, Ledger, LedgerId, LedgerSeq, NodeId, Proposal, Transaction, TxSet, TxSetId,
    Validation,
};
use std::sync::Arc;

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
///
/// This ensures causality is preserved: internal events (consequences of
/// processing an event) are handled before new external inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    /// Processed first to maintain causality.
    Internal = 0,

    /// Timer events: scheduled by the node itself.
    Timer = 1,

    /// Network events: external inputs from other nodes.
    Network = 2,

    /// Client events: external inputs from users.
    Client = 3,
}

/// Outcome of publishing a position to the external arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterOutcome {
    /// No record existed; ours was stored. The network will converge on it.
    Agreed,
    /// A record already existed. The caller must adopt it once the
    /// referenced set is acquired.
    Exists {
        tx_set: TxSetId,
        close_time: CloseTime,
    },
    /// Transient backend failure; publish again next tick.
    Retry,
    /// The stored record extends a different prior ledger: this node is
    /// stale. Fatal for the round's validation, not for acceptance.
    Error,
}

/// A ledger close being replayed from the acquisition subsystem.
///
/// Replay overrides the converged set's ordering and close time with those
/// of the ledger being replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReplay {
    /// Transactions in their original application order.
    pub transactions: Vec<Transaction>,
    pub close_time: CloseTime,
    pub close_agree: bool,
}

/// All possible events a node can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// Periodic tick; the only driver of round state transitions.
    RoundTimer,

    /// Periodic cleanup of stale state.
    CleanupTimer,

    // ═══════════════════════════════════════════════════════════════════════
    // Network Messages (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// A peer announced a position.
    ///
    /// Sender identity comes from the proposal's signature.
    ProposalReceived { proposal: Proposal },

    /// A signed validation arrived.
    ValidationReceived { validation: Validation },

    /// A peer announced it holds a transaction set.
    HaveTxSetReceived { peer: NodeId, id: TxSetId },

    /// A relayed transaction arrived.
    TransactionReceived { tx: Transaction },

    // ═══════════════════════════════════════════════════════════════════════
    // Client (priority: Client)
    // ═══════════════════════════════════════════════════════════════════════
    /// A locally submitted transaction.
    SubmitTransaction { tx: Transaction },

    // ═══════════════════════════════════════════════════════════════════════
    // Acquisition results (priority: Internal)
    // ═══════════════════════════════════════════════════════════════════════
    /// A requested transaction set was acquired and validated.
    TxSetAcquired { set: Arc<TxSet> },

    /// A requested transaction set could not be acquired (or its tree was
    /// invalid). Recorded as a failed marker for the round.
    TxSetUnavailable { id: TxSetId },

    /// A requested ledger was acquired.
    LedgerAcquired { ledger: Arc<Ledger> },

    // ═══════════════════════════════════════════════════════════════════════
    // Delegated work results (priority: Internal)
    // ═══════════════════════════════════════════════════════════════════════
    /// Ledger application completed.
    ///
    /// `prev_ledger` identifies the round that dispatched the work; a stale
    /// result (from an abandoned round) is discarded on mismatch.
    LedgerApplied {
        prev_ledger: LedgerId,
        ledger: Arc<Ledger>,
        /// Transactions from the consensus set that failed application but
        /// may succeed later.
        retriable: Vec<Transaction>,
    },

    /// Ledger application hit a missing node in the authenticated tree.
    /// The round is abandoned; the next round restarts cleanly.
    LedgerApplyFailed {
        prev_ledger: LedgerId,
        missing_node: bool,
    },

    /// The external arbiter answered a publish request.
    ArbiterResponse {
        seq: LedgerSeq,
        outcome: ArbiterOutcome,
    },
}

impl Event {
    /// The scheduling priority of this event.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::RoundTimer | Event::CleanupTimer => EventPriority::Timer,
            Event::ProposalReceived { .. }
            | Event::ValidationReceived { .. }
            | Event::HaveTxSetReceived { .. }
            | Event::TransactionReceived { .. } => EventPriority::Network,
            Event::SubmitTransaction { .. } => EventPriority::Client,
            Event::TxSetAcquired { .. }
            | Event::TxSetUnavailable { .. }
            | Event::LedgerAcquired { .. }
            | Event::LedgerApplied { .. }
            | Event::LedgerApplyFailed { .. }
            | Event::ArbiterResponse { .. } => EventPriority::Internal,
        }
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::RoundTimer => "RoundTimer",
            Event::CleanupTimer => "CleanupTimer",
            Event::ProposalReceived { .. } => "ProposalReceived",
            Event::ValidationReceived { .. } => "ValidationReceived",
            Event::HaveTxSetReceived { .. } => "HaveTxSetReceived",
            Event::TransactionReceived { .. } => "TransactionReceived",
            Event::SubmitTransaction { .. } => "SubmitTransaction",
            Event::TxSetAcquired { .. } => "TxSetAcquired",
            Event::TxSetUnavailable { .. } => "TxSetUnavailable",
            Event::LedgerAcquired { .. } => "LedgerAcquired",
            Event::LedgerApplied { .. } => "LedgerApplied",
            Event::LedgerApplyFailed { .. } => "LedgerApplyFailed",
            Event::ArbiterResponse { .. } => "ArbiterResponse",
        }
    }
}
