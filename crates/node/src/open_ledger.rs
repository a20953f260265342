//! The open ledger: transactions waiting for the next close.

use meridian_types::{Hash, Ledger, Transaction};
use std::collections::HashSet;
use tracing::{debug, trace};

/// Local pool of transactions to include in the next position.
///
/// Rebuilt after every accepted ledger: retried disputes get the first
/// crack (they are the most likely to receive agreement next round), then
/// the locals the closed ledger did not include.
#[derive(Debug, Default)]
pub struct OpenLedgerState {
    txs: Vec<Transaction>,
    ids: HashSet<Hash>,
}

impl OpenLedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction. Returns false for duplicates.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if !self.ids.insert(tx.id()) {
            return false;
        }
        trace!(tx = ?tx.id(), "Transaction added to open ledger");
        self.txs.push(tx);
        true
    }

    pub fn contains(&self, tx_id: &Hash) -> bool {
        self.ids.contains(tx_id)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Rebuild after `closed` was accepted: `reseed` (retriables and
    /// disputes we voted against) first, then surviving locals.
    pub fn rebuild(&mut self, closed: &Ledger, reseed: Vec<Transaction>) {
        let closed_ids: HashSet<Hash> = closed.transactions.iter().map(|tx| tx.id()).collect();
        let survivors: Vec<Transaction> = self
            .txs
            .drain(..)
            .filter(|tx| !closed_ids.contains(&tx.id()))
            .collect();

        self.ids.clear();
        for tx in reseed.into_iter().chain(survivors) {
            if !closed_ids.contains(&tx.id()) && self.ids.insert(tx.id()) {
                self.txs.push(tx);
            }
        }
        debug!(pending = self.txs.len(), "Open ledger rebuilt");
    }
}
