//! Signing message construction.
//!
//! Every signed artifact signs a domain-tagged byte string so a signature
//! for one message kind can never be replayed as another.

use crate::identifiers::{CloseTime, LedgerId, LedgerSeq, ProposeSeq, TxSetId};

/// Domain tag for round proposals.
pub const DOMAIN_PROPOSAL: &[u8] = b"proposal:";

/// Domain tag for ledger validations.
pub const DOMAIN_VALIDATION: &[u8] = b"validation:";

/// Message bytes signed by a proposal.
pub fn proposal_message(
    prev_ledger: &LedgerId,
    tx_set: &TxSetId,
    close_time: CloseTime,
    seq: ProposeSeq,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(84);
    message.extend_from_slice(DOMAIN_PROPOSAL);
    message.extend_from_slice(prev_ledger.0.as_bytes());
    message.extend_from_slice(tx_set.0.as_bytes());
    message.extend_from_slice(&close_time.0.to_le_bytes());
    message.extend_from_slice(&seq.0.to_le_bytes());
    message
}

/// Message bytes signed by a validation. `body` is the validation's encoded
/// unsigned content (including any flag-ledger vote fields).
pub fn validation_message(ledger: &LedgerId, seq: LedgerSeq, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(64 + body.len());
    message.extend_from_slice(DOMAIN_VALIDATION);
    message.extend_from_slice(ledger.0.as_bytes());
    message.extend_from_slice(&seq.0.to_le_bytes());
    message.extend_from_slice(body);
    message
}
