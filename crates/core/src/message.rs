//! Outbound message types for network communication.

use meridian_messages::{
    HaveTxSetGossip, ProposalGossip, StatusChangeGossip, TransactionGossip, ValidationGossip,
};

/// Outbound network messages.
///
/// These are the messages that a node can send to other nodes.
/// The runner handles the actual network I/O.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Our current round position.
    Proposal(ProposalGossip),

    /// We hold (or can fetch) a transaction set.
    HaveTxSet(HaveTxSetGossip),

    /// Node state transition (closing, accepted, lost sync).
    StatusChange(StatusChangeGossip),

    /// A signed ledger validation.
    Validation(ValidationGossip),

    /// A relayed (disputed) transaction.
    Transaction(TransactionGossip),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Proposal(_) => "Proposal",
            OutboundMessage::HaveTxSet(_) => "HaveTxSet",
            OutboundMessage::StatusChange(_) => "StatusChange",
            OutboundMessage::Validation(_) => "Validation",
            OutboundMessage::Transaction(_) => "Transaction",
        }
    }

    /// Check if this message is part of the consensus hot path (proposals
    /// and validations), as opposed to availability/status gossip.
    pub fn is_consensus(&self) -> bool {
        matches!(
            self,
            OutboundMessage::Proposal(_) | OutboundMessage::Validation(_)
        )
    }
}
