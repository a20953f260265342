//! Signed ledger validations.
//!
//! A validation asserts that its signer accepted a particular ledger. Flag
//! ledger validations additionally carry the signer's fee and amendment
//! votes. Partial validations (sent while out of sync) assert liveness
//! without endorsing the ledger as fully validated.

use crate::crypto::{KeyPair, PublicKey, Signature};
use crate::hash::Hash;
use crate::identifiers::{LedgerId, LedgerSeq, NodeId};
use crate::signing::validation_message;
use crate::transaction::FeeVote;
use sbor::prelude::BasicSbor;

#[derive(Clone, PartialEq, Eq, BasicSbor)]
pub struct Validation {
    ledger_id: LedgerId,
    ledger_seq: LedgerSeq,
    /// Signing time, seconds since the epoch.
    sign_time: u64,
    node: NodeId,
    public_key: PublicKey,
    /// Full validations endorse the ledger; partial ones only prove
    /// liveness while out of sync.
    full: bool,
    /// Reported load fee level, present when the signer is charging above
    /// the reference level.
    load_fee: Option<u32>,
    /// Fee vote, present only on flag-ledger validations.
    fee_vote: Option<FeeVote>,
    /// Amendments voted for, present only on flag-ledger validations.
    amendments: Vec<Hash>,
    signature: Signature,
}

/// Unsigned content of a validation, used to build one before signing.
#[derive(Debug, Clone)]
pub struct ValidationContent {
    pub ledger_id: LedgerId,
    pub ledger_seq: LedgerSeq,
    pub sign_time: u64,
    pub full: bool,
    pub load_fee: Option<u32>,
    pub fee_vote: Option<FeeVote>,
    pub amendments: Vec<Hash>,
}

impl Validation {
    pub fn sign(key: &KeyPair, content: ValidationContent) -> Self {
        let body = encode_body(&content);
        let message = validation_message(&content.ledger_id, content.ledger_seq, &body);
        Self {
            ledger_id: content.ledger_id,
            ledger_seq: content.ledger_seq,
            sign_time: content.sign_time,
            node: key.node_id(),
            public_key: key.public_key(),
            full: content.full,
            load_fee: content.load_fee,
            fee_vote: content.fee_vote,
            amendments: content.amendments,
            signature: key.sign(&message),
        }
    }

    pub fn verify(&self) -> bool {
        if self.public_key.node_id() != self.node {
            return false;
        }
        let body = encode_body(&ValidationContent {
            ledger_id: self.ledger_id,
            ledger_seq: self.ledger_seq,
            sign_time: self.sign_time,
            full: self.full,
            load_fee: self.load_fee,
            fee_vote: self.fee_vote,
            amendments: self.amendments.clone(),
        });
        let message = validation_message(&self.ledger_id, self.ledger_seq, &body);
        self.public_key.verify(&message, &self.signature)
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn ledger_seq(&self) -> LedgerSeq {
        self.ledger_seq
    }

    pub fn sign_time(&self) -> u64 {
        self.sign_time
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn load_fee(&self) -> Option<u32> {
        self.load_fee
    }

    pub fn fee_vote(&self) -> Option<&FeeVote> {
        self.fee_vote.as_ref()
    }

    pub fn amendments(&self) -> &[Hash] {
        &self.amendments
    }

    /// Whether this validation carries flag-ledger vote fields.
    pub fn has_flag_votes(&self) -> bool {
        self.fee_vote.is_some() || !self.amendments.is_empty()
    }
}

impl std::fmt::Debug for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validation")
            .field("ledger_id", &self.ledger_id)
            .field("ledger_seq", &self.ledger_seq)
            .field("node", &self.node)
            .field("full", &self.full)
            .finish()
    }
}

fn encode_body(content: &ValidationContent) -> Vec<u8> {
    let mut body = Vec::with_capacity(64);
    body.extend_from_slice(&content.sign_time.to_le_bytes());
    body.push(content.full as u8);
    match content.load_fee {
        Some(fee) => {
            body.push(1);
            body.extend_from_slice(&fee.to_le_bytes());
        }
        None => body.push(0),
    }
    match &content.fee_vote {
        Some(vote) => {
            body.push(1);
            body.extend_from_slice(&vote.base_fee.to_le_bytes());
            body.extend_from_slice(&vote.reserve_base.to_le_bytes());
            body.extend_from_slice(&vote.reserve_increment.to_le_bytes());
        }
        None => body.push(0),
    }
    body.extend_from_slice(&(content.amendments.len() as u32).to_le_bytes());
    for amendment in &content.amendments {
        body.extend_from_slice(amendment.as_bytes());
    }
    body
}
