//! Transaction-set availability announcement.

use crate::NetworkMessage;
use meridian_types::TxSetId;
use sbor::prelude::BasicSbor;

/// How the sender can supply the announced set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BasicSbor)]
pub enum TxSetStatus {
    /// The sender holds the full set and will serve it directly.
    Have,
    /// The sender can fetch the set on request.
    CanGet,
}

/// Tells peers a transaction set is available for acquisition.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct HaveTxSetGossip {
    pub id: TxSetId,
    pub status: TxSetStatus,
}

impl HaveTxSetGossip {
    pub fn have(id: TxSetId) -> Self {
        Self {
            id,
            status: TxSetStatus::Have,
        }
    }

    pub fn can_get(id: TxSetId) -> Self {
        Self {
            id,
            status: TxSetStatus::CanGet,
        }
    }
}

impl NetworkMessage for HaveTxSetGossip {
    fn message_type_id() -> &'static str {
        "consensus.have-tx-set"
    }
}
