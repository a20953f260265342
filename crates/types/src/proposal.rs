//! Round proposals.
//!
//! A proposal is a peer's signed claim of its current position: the tx-set
//! id it wants in the next ledger, the prior ledger it extends, and its
//! close-time estimate. Proposals are immutable after construction; a node
//! changing position issues a new proposal with the next sequence number.

use crate::crypto::{KeyPair, PublicKey, Signature};
use crate::identifiers::{CloseTime, LedgerId, NodeId, ProposeSeq, TxSetId};
use crate::signing::proposal_message;
use sbor::prelude::BasicSbor;

#[derive(Clone, PartialEq, Eq, BasicSbor)]
pub struct Proposal {
    peer: NodeId,
    prev_ledger: LedgerId,
    tx_set: TxSetId,
    close_time: CloseTime,
    seq: ProposeSeq,
    public_key: PublicKey,
    signature: Signature,
}

impl Proposal {
    /// A peer's first position of the round.
    pub fn initial(
        key: &KeyPair,
        prev_ledger: LedgerId,
        tx_set: TxSetId,
        close_time: CloseTime,
    ) -> Self {
        Self::new(key, prev_ledger, tx_set, close_time, ProposeSeq::INITIAL)
    }

    /// A changed position: same prior ledger, next sequence number.
    pub fn advanced(&self, key: &KeyPair, tx_set: TxSetId, close_time: CloseTime) -> Self {
        Self::new(key, self.prev_ledger, tx_set, close_time, self.seq.next())
    }

    /// The bow-out announcement: this node stops participating this round.
    pub fn bowed_out(&self, key: &KeyPair) -> Self {
        Self::new(
            key,
            self.prev_ledger,
            TxSetId::NONE,
            CloseTime::NONE,
            ProposeSeq::BOW_OUT,
        )
    }

    /// Sign a proposal with an explicit sequence number.
    pub fn new(
        key: &KeyPair,
        prev_ledger: LedgerId,
        tx_set: TxSetId,
        close_time: CloseTime,
        seq: ProposeSeq,
    ) -> Self {
        let message = proposal_message(&prev_ledger, &tx_set, close_time, seq);
        Self {
            peer: key.node_id(),
            prev_ledger,
            tx_set,
            close_time,
            seq,
            public_key: key.public_key(),
            signature: key.sign(&message),
        }
    }

    /// Check the signature and that the claimed peer id matches the signing
    /// key.
    pub fn verify(&self) -> bool {
        if self.public_key.node_id() != self.peer {
            return false;
        }
        let message =
            proposal_message(&self.prev_ledger, &self.tx_set, self.close_time, self.seq);
        self.public_key.verify(&message, &self.signature)
    }

    pub fn peer(&self) -> NodeId {
        self.peer
    }

    pub fn prev_ledger(&self) -> LedgerId {
        self.prev_ledger
    }

    pub fn tx_set(&self) -> TxSetId {
        self.tx_set
    }

    pub fn close_time(&self) -> CloseTime {
        self.close_time
    }

    pub fn seq(&self) -> ProposeSeq {
        self.seq
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn is_initial(&self) -> bool {
        self.seq.is_initial()
    }

    pub fn is_bow_out(&self) -> bool {
        self.seq.is_bow_out()
    }

    pub fn extends(&self, ledger: &LedgerId) -> bool {
        self.prev_ledger == *ledger
    }
}

impl std::fmt::Debug for Proposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proposal")
            .field("peer", &self.peer)
            .field("seq", &self.seq)
            .field("tx_set", &self.tx_set)
            .field("close_time", &self.close_time)
            .finish()
    }
}
