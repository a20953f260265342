//! Transactions as the consensus core sees them.
//!
//! Transaction semantics live outside the core; here a transaction is an
//! opaque byte blob identified by its hash. The only structured transactions
//! the core itself produces are the flag-ledger voting pseudo-transactions.

use crate::hash::{Hash, Hasher};
use sbor::prelude::BasicSbor;

/// An opaque transaction: raw bytes plus the derived id.
#[derive(Clone, PartialEq, Eq, BasicSbor)]
pub struct Transaction {
    id: Hash,
    raw: Vec<u8>,
}

impl Transaction {
    pub fn new(raw: Vec<u8>) -> Self {
        let id = Hash::digest(&raw);
        Self { id, raw }
    }

    pub fn id(&self) -> Hash {
        self.id
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.raw
    }

    /// Whether this is a protocol-generated pseudo-transaction.
    pub fn is_pseudo(&self) -> bool {
        self.raw.starts_with(PSEUDO_TX_PREFIX)
    }

    /// Build the fee-voting pseudo-transaction carried by a flag ledger.
    pub fn fee_vote(seq_of_flag_ledger: u64, vote: &FeeVote) -> Self {
        let mut raw = Vec::with_capacity(64);
        raw.extend_from_slice(PSEUDO_TX_PREFIX);
        raw.extend_from_slice(b"fee:");
        raw.extend_from_slice(&seq_of_flag_ledger.to_le_bytes());
        raw.extend_from_slice(&vote.base_fee.to_le_bytes());
        raw.extend_from_slice(&vote.reserve_base.to_le_bytes());
        raw.extend_from_slice(&vote.reserve_increment.to_le_bytes());
        Self::new(raw)
    }

    /// Build an amendment-voting pseudo-transaction carried by a flag ledger.
    pub fn amendment_vote(seq_of_flag_ledger: u64, amendment: &Hash) -> Self {
        let mut raw = Vec::with_capacity(64);
        raw.extend_from_slice(PSEUDO_TX_PREFIX);
        raw.extend_from_slice(b"amendment:");
        raw.extend_from_slice(&seq_of_flag_ledger.to_le_bytes());
        raw.extend_from_slice(amendment.as_bytes());
        Self::new(raw)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("len", &self.raw.len())
            .finish()
    }
}

const PSEUDO_TX_PREFIX: &[u8] = b"meridian-pseudo:";

/// A fee vote, expressed in the network's base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub struct FeeVote {
    pub base_fee: u64,
    pub reserve_base: u64,
    pub reserve_increment: u64,
}

/// Sort transactions into the canonical application order: deterministic,
/// but salted by the set id so the order is not predictable in advance.
pub fn canonical_order(salt: &Hash, mut txs: Vec<Transaction>) -> Vec<Transaction> {
    txs.sort_by_cached_key(|tx| {
        let mut hasher = Hasher::new();
        hasher.update(salt.as_bytes()).update(tx.id().as_bytes());
        hasher.finish()
    });
    txs
}
