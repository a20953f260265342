//! Canonical transaction sets.
//!
//! A `TxSet` is the immutable snapshot a position refers to. Its id is the
//! root hash of the canonical tree: sets are built through [`TxSetBuilder`],
//! sealed once, then shared by reference (`Arc<TxSet>`) between the round,
//! the acquisition subsystem, and background jobs.

use crate::hash::{Hash, Hasher};
use crate::identifiers::TxSetId;
use crate::transaction::{canonical_order, Transaction};
use std::collections::BTreeMap;

/// Cap on the number of symmetric-difference entries examined when two sets
/// are compared, bounding dispute-creation work.
pub const MAX_SET_DIFFERENCES: usize = 16_384;

/// An immutable, hashed transaction set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSet {
    id: TxSetId,
    txs: BTreeMap<Hash, Transaction>,
}

impl TxSet {
    /// The empty set.
    pub fn empty() -> Self {
        TxSetBuilder::new().seal()
    }

    pub fn id(&self) -> TxSetId {
        self.id
    }

    pub fn contains(&self, tx_id: &Hash) -> bool {
        self.txs.contains_key(tx_id)
    }

    pub fn get(&self, tx_id: &Hash) -> Option<&Transaction> {
        self.txs.get(tx_id)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.txs.values()
    }

    /// Reopen this set for modification. The returned builder starts from a
    /// copy; the set itself stays immutable.
    pub fn to_builder(&self) -> TxSetBuilder {
        TxSetBuilder {
            txs: self.txs.clone(),
        }
    }

    /// Transactions in the canonical application order, salted by set id.
    pub fn canonical_order(&self) -> Vec<Transaction> {
        canonical_order(&self.id.0, self.txs.values().cloned().collect())
    }

    /// Symmetric difference against another set, capped at
    /// [`MAX_SET_DIFFERENCES`] entries.
    ///
    /// Each entry carries the transaction from whichever set has it.
    pub fn compare(&self, other: &TxSet) -> BTreeMap<Hash, SetDifference> {
        let mut differences = BTreeMap::new();
        if self.id == other.id {
            return differences;
        }

        for (id, tx) in &self.txs {
            if differences.len() >= MAX_SET_DIFFERENCES {
                return differences;
            }
            if !other.contains(id) {
                differences.insert(*id, SetDifference::OnlyInSelf(tx.clone()));
            }
        }
        for (id, tx) in &other.txs {
            if differences.len() >= MAX_SET_DIFFERENCES {
                return differences;
            }
            if !self.contains(id) {
                differences.insert(*id, SetDifference::OnlyInOther(tx.clone()));
            }
        }
        differences
    }
}

/// One side of a symmetric difference between two transaction sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetDifference {
    OnlyInSelf(Transaction),
    OnlyInOther(Transaction),
}

impl SetDifference {
    pub fn transaction(&self) -> &Transaction {
        match self {
            SetDifference::OnlyInSelf(tx) | SetDifference::OnlyInOther(tx) => tx,
        }
    }
}

/// Mutable builder for a [`TxSet`].
#[derive(Debug, Clone, Default)]
pub struct TxSetBuilder {
    txs: BTreeMap<Hash, Transaction>,
}

impl TxSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction. Returns false if it was already present.
    pub fn insert(&mut self, tx: Transaction) -> bool {
        self.txs.insert(tx.id(), tx).is_none()
    }

    /// Remove a transaction by id.
    pub fn remove(&mut self, tx_id: &Hash) -> Option<Transaction> {
        self.txs.remove(tx_id)
    }

    pub fn contains(&self, tx_id: &Hash) -> bool {
        self.txs.contains_key(tx_id)
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Seal into an immutable set, computing the root hash over the
    /// lexicographically ordered transaction ids.
    pub fn seal(self) -> TxSet {
        let mut hasher = Hasher::new();
        hasher.update(b"tx-set:");
        for id in self.txs.keys() {
            hasher.update(id.as_bytes());
        }
        TxSet {
            id: TxSetId(hasher.finish()),
            txs: self.txs,
        }
    }
}

impl FromIterator<Transaction> for TxSetBuilder {
    fn from_iter<I: IntoIterator<Item = Transaction>>(iter: I) -> Self {
        let mut builder = TxSetBuilder::new();
        for tx in iter {
            builder.insert(tx);
        }
        builder
    }
}
