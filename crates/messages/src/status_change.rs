//! Node status announcements.

use crate::NetworkMessage;
use meridian_types::{LedgerId, LedgerSeq};
use sbor::prelude::BasicSbor;

/// What happened to the announcing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub enum NodeEvent {
    /// The node is closing its open ledger and entering consensus.
    ClosingLedger,
    /// The node accepted a new closed ledger.
    AcceptedLedger,
    /// The node lost track of the network's preferred chain.
    LostSync,
}

/// Announces a node state transition together with the ledger range the
/// node is willing to serve.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct StatusChangeGossip {
    pub event: NodeEvent,
    pub ledger_seq: LedgerSeq,
    /// Sender's network time, seconds since the epoch.
    pub network_time: u64,
    pub prev_ledger: LedgerId,
    pub ledger: LedgerId,
    /// First ledger sequence the sender serves (0 when unknown).
    pub first_seq: u64,
    /// Last ledger sequence the sender serves (0 when unknown).
    pub last_seq: u64,
}

impl NetworkMessage for StatusChangeGossip {
    fn message_type_id() -> &'static str {
        "consensus.status-change"
    }
}
