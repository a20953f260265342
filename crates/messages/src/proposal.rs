//! Proposal gossip message.

use crate::NetworkMessage;
use meridian_types::Proposal;
use sbor::prelude::BasicSbor;

/// Announces a node's current round position to its peers.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ProposalGossip {
    pub proposal: Proposal,
}

impl ProposalGossip {
    pub fn new(proposal: Proposal) -> Self {
        Self { proposal }
    }

    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    pub fn into_proposal(self) -> Proposal {
        self.proposal
    }
}

impl NetworkMessage for ProposalGossip {
    fn message_type_id() -> &'static str {
        "consensus.proposal"
    }
}
