//! Transaction relay message.

use crate::NetworkMessage;
use meridian_types::Transaction;
use sbor::prelude::BasicSbor;

/// Relay status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub enum TransactionStatus {
    /// Newly seen; relayed once per round (disputed transactions).
    New,
}

/// Relays a transaction to peers, typically because it became disputed.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct TransactionGossip {
    pub transaction: Transaction,
    /// When the sender first saw the transaction, seconds since the epoch.
    pub receive_timestamp: u64,
    pub status: TransactionStatus,
}

impl TransactionGossip {
    pub fn new(transaction: Transaction, receive_timestamp: u64) -> Self {
        Self {
            transaction,
            receive_timestamp,
            status: TransactionStatus::New,
        }
    }
}

impl NetworkMessage for TransactionGossip {
    fn message_type_id() -> &'static str {
        "transaction.relay"
    }
}
