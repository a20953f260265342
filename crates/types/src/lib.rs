//! Core types for Meridian ledger consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, cryptographic keys and signatures
//! - **Identifiers**: LedgerId, TxSetId, NodeId, sequence numbers
//! - **Consensus types**: Transaction, TxSet, Ledger, Proposal, Validation
//! - **Trust**: the validator registry
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer. Everything
//! here is passive data: the round logic lives in `meridian-consensus`.

mod crypto;
mod hash;
mod identifiers;
mod ledger;
mod proposal;
mod signing;
mod transaction;
mod tx_set;
mod validation;
mod validator;

pub use crypto::{KeyPair, PublicKey, Signature};
pub use hash::{Hash, Hasher, HexError};
pub use identifiers::{CloseTime, LedgerId, LedgerSeq, NodeId, ProposeSeq, TxSetId};
pub use ledger::{
    is_flag_seq, next_close_resolution, round_close_time, Ledger, LedgerHeader,
    CLOSE_TIME_RESOLUTIONS, DEFAULT_CLOSE_RESOLUTION, FLAG_LEDGER_INTERVAL,
};
pub use proposal::Proposal;
pub use signing::{proposal_message, validation_message, DOMAIN_PROPOSAL, DOMAIN_VALIDATION};
pub use transaction::{canonical_order, FeeVote, Transaction};
pub use tx_set::{SetDifference, TxSet, TxSetBuilder, MAX_SET_DIFFERENCES};
pub use validation::{Validation, ValidationContent};
pub use validator::{ValidatorInfo, ValidatorRegistry};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Deterministic key pair from a seed byte.
    pub fn test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed(&[seed; 32])
    }

    /// A small opaque transaction from a seed byte.
    pub fn test_transaction(seed: u8) -> Transaction {
        Transaction::new(vec![seed, seed.wrapping_add(1), seed.wrapping_add(2)])
    }

    /// A sealed set containing transactions for each seed.
    pub fn test_tx_set(seeds: &[u8]) -> TxSet {
        let mut builder = TxSetBuilder::new();
        for &seed in seeds {
            builder.insert(test_transaction(seed));
        }
        builder.seal()
    }

    /// A registry trusting the keys derived from each seed.
    pub fn test_registry(seeds: &[u8]) -> ValidatorRegistry {
        ValidatorRegistry::from_keys(seeds.iter().map(|&s| test_keypair(s).public_key()))
    }
}
