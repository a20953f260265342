//! Per-node ledger store and deterministic ledger application.

use meridian_core::LedgerReplay;
use meridian_types::{CloseTime, Ledger, LedgerId, Transaction, TxSet};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A node's closed-ledger store.
///
/// Applies tx sets inline (the simulation's stand-in for the host job
/// queue) and can inject an authenticated-tree fault for failure tests.
#[derive(Debug)]
pub struct SimLedgerStore {
    ledgers: HashMap<LedgerId, Arc<Ledger>>,
    by_seq: BTreeMap<u64, LedgerId>,
    fail_next_apply: bool,
}

impl SimLedgerStore {
    pub fn new(genesis: Arc<Ledger>) -> Self {
        let mut store = Self {
            ledgers: HashMap::new(),
            by_seq: BTreeMap::new(),
            fail_next_apply: false,
        };
        store.insert(genesis);
        store
    }

    pub fn insert(&mut self, ledger: Arc<Ledger>) {
        self.by_seq.insert(ledger.seq().0, ledger.id());
        self.ledgers.insert(ledger.id(), ledger);
    }

    pub fn get(&self, id: &LedgerId) -> Option<&Arc<Ledger>> {
        self.ledgers.get(id)
    }

    /// The highest-sequence ledger held.
    pub fn latest(&self) -> Arc<Ledger> {
        let (_, id) = self.by_seq.iter().next_back().expect("genesis present");
        self.ledgers[id].clone()
    }

    pub fn ledger_count(&self) -> usize {
        self.ledgers.len()
    }

    /// Make the next `apply` report a missing node in the tree.
    pub fn fail_next_apply(&mut self) {
        self.fail_next_apply = true;
    }

    /// Build the next ledger from a converged tx set.
    ///
    /// Returns the new ledger and the retriable transactions (those that
    /// failed application but may succeed later; the simulation's executor
    /// accepts everything).
    pub fn apply(
        &mut self,
        parent: &Arc<Ledger>,
        tx_set: &Arc<TxSet>,
        close_time: CloseTime,
        close_agree: bool,
        close_resolution: u64,
        replay: Option<&LedgerReplay>,
    ) -> Result<(Arc<Ledger>, Vec<Transaction>), MissingNode> {
        if self.fail_next_apply {
            self.fail_next_apply = false;
            return Err(MissingNode);
        }

        let transactions = match replay {
            Some(replay) => replay.transactions.clone(),
            None => tx_set.canonical_order(),
        };
        let ledger = Arc::new(Ledger::build_next(
            parent,
            tx_set.id(),
            transactions,
            close_time,
            close_agree,
            close_resolution,
        ));
        debug!(ledger = %ledger.id(), seq = %ledger.seq(), "Applied tx set");
        self.insert(ledger.clone());
        Ok((ledger, Vec::new()))
    }
}

/// The authenticated tree reported a missing node during application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingNode;
