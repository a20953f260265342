//! Disputed transactions.
//!
//! A transaction is disputed when some acquired peer position disagrees with
//! ours about including it. Each dispute tallies peer votes; our own vote is
//! recomputed each tick against the rising avalanche threshold.

use crate::config::AvalancheSchedule;
use meridian_types::{Hash, NodeId, Transaction};
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct DisputedTx {
    tx: Transaction,
    our_vote: bool,
    yays: usize,
    nays: usize,
    votes: HashMap<NodeId, bool>,
}

impl DisputedTx {
    pub fn new(tx: Transaction, our_vote: bool) -> Self {
        Self {
            tx,
            our_vote,
            yays: 0,
            nays: 0,
            votes: HashMap::new(),
        }
    }

    pub fn id(&self) -> Hash {
        self.tx.id()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn our_vote(&self) -> bool {
        self.our_vote
    }

    pub fn set_our_vote(&mut self, vote: bool) {
        self.our_vote = vote;
    }

    pub fn peer_votes(&self) -> usize {
        self.votes.len()
    }

    /// Record a peer's vote, replacing any previous one.
    pub fn set_vote(&mut self, peer: NodeId, vote: bool) {
        match self.votes.insert(peer, vote) {
            None => {
                if vote {
                    self.yays += 1;
                } else {
                    self.nays += 1;
                }
            }
            Some(previous) if previous != vote => {
                if vote {
                    self.nays -= 1;
                    self.yays += 1;
                } else {
                    self.yays -= 1;
                    self.nays += 1;
                }
            }
            Some(_) => {}
        }
    }

    /// Retract a peer's vote (bow-out or stale proposal sweep).
    pub fn unvote(&mut self, peer: &NodeId) {
        match self.votes.remove(peer) {
            Some(true) => self.yays -= 1,
            Some(false) => self.nays -= 1,
            None => {}
        }
    }

    /// Recompute our vote at `close_percent` of the previous round's
    /// duration. Returns true when the vote flipped.
    ///
    /// A proposing node counts itself at full weight and follows the rising
    /// schedule; an observer merely recognizes the existing majority.
    pub fn update_vote(
        &mut self,
        close_percent: u32,
        proposing: bool,
        schedule: &AvalancheSchedule,
    ) -> bool {
        // Unanimous support for our current vote: nothing to reconsider.
        if self.our_vote && self.nays == 0 {
            return false;
        }
        if !self.our_vote && self.yays == 0 {
            return false;
        }

        let new_vote = if proposing {
            let weight =
                (self.yays * 100 + if self.our_vote { 100 } else { 0 }) / (self.yays + self.nays + 1);
            let required = schedule.required_pct(close_percent) as usize;
            trace!(tx = ?self.id(), weight, required, "Dispute vote weight");
            weight > required
        } else {
            self.yays > self.nays
        };

        if new_vote == self.our_vote {
            return false;
        }

        debug!(tx = ?self.id(), close_percent, our_vote = new_vote, "Dispute vote flipped");
        self.our_vote = new_vote;
        true
    }
}
