//! Action types for the deterministic state machine.

use crate::{message::OutboundMessage, Event, LedgerReplay, TimerId};
use meridian_types::{CloseTime, Ledger, LedgerId, LedgerSeq, TxSet, TxSetId};
use std::sync::Arc;
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Broadcast a message to all directly connected peers.
    Broadcast { message: OutboundMessage },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal (fed back as events with Internal priority)
    // ═══════════════════════════════════════════════════════════════════════
    /// Enqueue an internal event for immediate processing.
    EnqueueInternal { event: Event },

    // ═══════════════════════════════════════════════════════════════════════
    // Acquisition requests (runner I/O, returns callback event)
    // ═══════════════════════════════════════════════════════════════════════
    /// Fetch a transaction set referenced by a peer position.
    ///
    /// Returns `Event::TxSetAcquired` or `Event::TxSetUnavailable`.
    AcquireTxSet { id: TxSetId },

    /// Hand a locally built or acquired set to the acquisition subsystem so
    /// peers can fetch it from us.
    ShareTxSet { set: Arc<TxSet> },

    /// Fetch a closed ledger we do not hold (the network's preferred prior
    /// ledger). Returns `Event::LedgerAcquired`.
    AcquireLedger { id: LedgerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Delegated Work (job queue in production, inline in simulation)
    // ═══════════════════════════════════════════════════════════════════════
    /// Apply the converged transaction set on top of the parent ledger and
    /// build the new closed ledger.
    ///
    /// Returns `Event::LedgerApplied` or `Event::LedgerApplyFailed`. The
    /// job is never cancelled; a stale result is discarded by the receiver.
    ApplyTransactions {
        parent: Arc<Ledger>,
        tx_set: Arc<TxSet>,
        close_time: CloseTime,
        close_agree: bool,
        close_resolution: u64,
        /// When a ledger close is being replayed, its transactions are
        /// applied in their original order instead of canonical order.
        replay: Option<LedgerReplay>,
    },

    /// Publish our position to the external arbiter (first writer wins).
    ///
    /// Returns `Event::ArbiterResponse`.
    PublishPosition {
        seq: LedgerSeq,
        prev_ledger: LedgerId,
        tx_set: TxSetId,
        close_time: CloseTime,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Storage
    // ═══════════════════════════════════════════════════════════════════════
    /// Persist an accepted ledger to the ledger store.
    PersistLedger { ledger: Arc<Ledger> },

    // ═══════════════════════════════════════════════════════════════════════
    // Host notifications
    // ═══════════════════════════════════════════════════════════════════════
    /// Nudge the local close-time clock by the observed network offset.
    AdjustClock { offset_secs: i64 },

    /// A consensus round completed and the node moved to the next one.
    RoundComplete {
        ledger_id: LedgerId,
        seq: LedgerSeq,
        proposers: usize,
        duration: Duration,
        have_correct_lcl: bool,
    },

    /// An unrecoverable fault was absorbed by abandoning the round.
    ReportFault { description: String },
}

impl Action {
    /// Check if this action requires async I/O (network or storage writes).
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            Action::Broadcast { .. } | Action::PersistLedger { .. }
        )
    }

    /// Check if this action is delegated work (runs on a job queue, returns
    /// a callback event).
    pub fn is_delegated(&self) -> bool {
        matches!(
            self,
            Action::AcquireTxSet { .. }
                | Action::AcquireLedger { .. }
                | Action::ApplyTransactions { .. }
                | Action::PublishPosition { .. }
        )
    }

    /// Check if this is an internal event action.
    pub fn is_internal(&self) -> bool {
        matches!(self, Action::EnqueueInternal { .. })
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
            Action::AcquireTxSet { .. } => "AcquireTxSet",
            Action::ShareTxSet { .. } => "ShareTxSet",
            Action::AcquireLedger { .. } => "AcquireLedger",
            Action::ApplyTransactions { .. } => "ApplyTransactions",
            Action::PublishPosition { .. } => "PublishPosition",
            Action::PersistLedger { .. } => "PersistLedger",
            Action::AdjustClock { .. } => "AdjustClock",
            Action::RoundComplete { .. } => "RoundComplete",
            Action::ReportFault { .. } => "ReportFault",
        }
    }
}
