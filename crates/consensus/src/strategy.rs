//! Round convergence strategies.
//!
//! A round converges either through the built-in threshold rule or through
//! the external arbiter. The two variants share the whole round state
//! machine; the strategy value carries only what differs. Selection is
//! process-wide configuration and never changes mid-round.

use crate::config::ConsensusKind;
use meridian_types::{CloseTime, TxSetId};

/// How close-time agreement is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTimeMode {
    /// Tallied from peer proposals against the rising threshold.
    Tallied,
    /// Unconditionally agreed; the arbiter record carries the close time.
    Unconditional,
}

/// Arbiter-variant progress within one round.
#[derive(Debug, Clone, Default)]
pub struct ArbiterProgress {
    /// A publish request is in flight; don't issue another until it answers.
    pub in_flight: bool,
    /// The arbiter agreed with (or we adopted) the round position.
    pub agreed: bool,
    /// A published position we must adopt once its set is acquired.
    pub pending_adopt: Option<(TxSetId, CloseTime)>,
}

/// Per-round strategy state.
#[derive(Debug, Clone)]
pub enum RoundStrategy {
    /// Built-in avalanche convergence.
    Avalanche,
    /// External first-writer-wins arbiter.
    Arbiter(ArbiterProgress),
}

impl RoundStrategy {
    pub fn for_kind(kind: ConsensusKind) -> Self {
        match kind {
            ConsensusKind::Builtin => RoundStrategy::Avalanche,
            ConsensusKind::ExternalArbiter => RoundStrategy::Arbiter(ArbiterProgress::default()),
        }
    }

    pub fn close_time_mode(&self) -> CloseTimeMode {
        match self {
            RoundStrategy::Avalanche => CloseTimeMode::Tallied,
            RoundStrategy::Arbiter(_) => CloseTimeMode::Unconditional,
        }
    }

    /// Reset per-round progress (used when the round re-enters open after a
    /// view shift).
    pub fn reset(&mut self) {
        if let RoundStrategy::Arbiter(progress) = self {
            *progress = ArbiterProgress::default();
        }
    }
}
