//! Identifier newtypes.

use crate::hash::Hash;
use sbor::prelude::BasicSbor;

/// Identifier of a closed ledger: the hash of its header.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct LedgerId(pub Hash);

impl LedgerId {
    pub const ZERO: LedgerId = LedgerId(Hash::ZERO);

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl std::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for LedgerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L:{:?}", self.0)
    }
}

/// Identifier of a transaction set: the root hash of its canonical tree.
///
/// Equal ids imply identical sets.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct TxSetId(pub Hash);

impl TxSetId {
    /// Sentinel carried by a bow-out proposal.
    pub const NONE: TxSetId = TxSetId(Hash::ZERO);

    pub fn is_none(&self) -> bool {
        self.0.is_zero()
    }
}

impl std::fmt::Display for TxSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for TxSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T:{:?}", self.0)
    }
}

/// Identifier of a validator node: the hash of its validation public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct NodeId(pub [u8; 32]);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N:{}..", &hex::encode(self.0)[..8])
    }
}

/// Ledger sequence number. The genesis ledger has sequence 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct LedgerSeq(pub u64);

impl LedgerSeq {
    pub fn next(&self) -> LedgerSeq {
        LedgerSeq(self.0 + 1)
    }
}

impl std::fmt::Display for LedgerSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-round proposal sequence number.
///
/// Strictly increases across a peer's proposals within a round. Two values
/// are distinguished: the initial proposal and the bow-out announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct ProposeSeq(pub u32);

impl ProposeSeq {
    /// A peer's first proposal for a round.
    pub const INITIAL: ProposeSeq = ProposeSeq(0);

    /// A peer announcing it will no longer participate this round.
    pub const BOW_OUT: ProposeSeq = ProposeSeq(u32::MAX);

    pub fn is_initial(&self) -> bool {
        *self == Self::INITIAL
    }

    pub fn is_bow_out(&self) -> bool {
        *self == Self::BOW_OUT
    }

    pub fn next(&self) -> ProposeSeq {
        ProposeSeq(self.0 + 1)
    }
}

/// Ledger close time, in seconds since the epoch.
///
/// Zero is a sentinel: "no opinion" on a proposal, "agreed to disagree" on a
/// closed ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct CloseTime(pub u64);

impl CloseTime {
    pub const NONE: CloseTime = CloseTime(0);

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn plus_secs(&self, secs: u64) -> CloseTime {
        CloseTime(self.0 + secs)
    }
}

impl std::fmt::Display for CloseTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
