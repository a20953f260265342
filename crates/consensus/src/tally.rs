//! Trusted-validation tally.
//!
//! Tracks the most recent validation seen from each trusted validator and
//! answers the questions the round asks each tick: how many validators sit
//! on a given ledger, which recent ledger the network prefers, and how many
//! validators have already moved past ours.

use meridian_types::{LedgerId, LedgerSeq, NodeId, Validation};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct SeenValidation {
    ledger_id: LedgerId,
    ledger_seq: LedgerSeq,
    sign_time: u64,
}

/// Latest validation per trusted validator.
///
/// Callers verify trust and signatures before recording; the tally itself
/// only orders by signing time.
#[derive(Debug, Clone, Default)]
pub struct ValidationTally {
    latest: HashMap<NodeId, SeenValidation>,
}

impl ValidationTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a validation. Returns false when an equal-or-newer validation
    /// from the same signer is already recorded.
    pub fn record(&mut self, validation: &Validation) -> bool {
        let seen = SeenValidation {
            ledger_id: validation.ledger_id(),
            ledger_seq: validation.ledger_seq(),
            sign_time: validation.sign_time(),
        };
        match self.latest.get(&validation.node()) {
            Some(existing) if existing.sign_time >= seen.sign_time => false,
            _ => {
                trace!(node = ?validation.node(), ledger = ?seen.ledger_id, "Recorded validation");
                self.latest.insert(validation.node(), seen);
                true
            }
        }
    }

    /// Number of validators currently validating `ledger`.
    pub fn count(&self, ledger: &LedgerId) -> usize {
        self.latest
            .values()
            .filter(|seen| seen.ledger_id == *ledger)
            .count()
    }

    /// Number of validators whose latest validation is past `seq`.
    pub fn moved_on(&self, seq: LedgerSeq) -> usize {
        self.latest
            .values()
            .filter(|seen| seen.ledger_seq > seq)
            .count()
    }

    /// The ledger the network currently prefers, restricted to the favored
    /// ledger, its parent, and anything more recent than `newer_than`.
    ///
    /// Ties break toward `favored` so a node never flaps off the ledger it
    /// already holds; remaining ties break by ledger id for determinism.
    pub fn preferred(
        &self,
        favored: LedgerId,
        parent: Option<LedgerId>,
        newer_than: LedgerSeq,
    ) -> (LedgerId, usize) {
        let mut counts: BTreeMap<LedgerId, usize> = BTreeMap::new();
        for seen in self.latest.values() {
            let relevant = seen.ledger_id == favored
                || parent == Some(seen.ledger_id)
                || seen.ledger_seq > newer_than;
            if relevant {
                *counts.entry(seen.ledger_id).or_default() += 1;
            }
        }

        let mut best = (favored, counts.get(&favored).copied().unwrap_or(0));
        for (ledger, count) in counts {
            if count > best.1 {
                best = (ledger, count);
            }
        }
        best
    }

    /// Drop validations signed before `cutoff_secs`.
    pub fn prune(&mut self, cutoff_secs: u64) {
        self.latest.retain(|_, seen| seen.sign_time >= cutoff_secs);
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
