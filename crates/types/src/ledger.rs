//! Closed ledgers and close-time arithmetic.

use crate::hash::{Hash, Hasher};
use crate::identifiers::{CloseTime, LedgerId, LedgerSeq, TxSetId};
use crate::transaction::Transaction;
use sbor::prelude::BasicSbor;

/// Every 256th ledger is a flag ledger carrying fee and amendment votes.
pub const FLAG_LEDGER_INTERVAL: u64 = 256;

/// Close-time granularities a ledger may use, in seconds.
pub const CLOSE_TIME_RESOLUTIONS: [u64; 6] = [10, 20, 30, 60, 90, 120];

/// Default close-time granularity for fresh chains.
pub const DEFAULT_CLOSE_RESOLUTION: u64 = 30;

/// Coarsen the resolution after a disagreed close on this ledger cadence.
const COARSEN_RESOLUTION_EVERY: u64 = 8;

/// Refine the resolution after an agreed close on this ledger cadence.
const REFINE_RESOLUTION_EVERY: u64 = 256;

/// Header of a closed ledger. The ledger id is the hash of this header.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct LedgerHeader {
    pub seq: LedgerSeq,
    pub parent_id: LedgerId,
    pub tx_set_id: TxSetId,
    pub close_time: CloseTime,
    /// Granularity the close time was rounded to, in seconds.
    pub close_time_resolution: u64,
    /// Whether the network agreed on the close time. False means the close
    /// time is `parent_close_time + 1` and not canonical.
    pub close_agree: bool,
    pub parent_close_time: CloseTime,
}

/// A closed, immutable ledger.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Ledger {
    pub header: LedgerHeader,
    pub transactions: Vec<Transaction>,
}

impl Ledger {
    /// The genesis ledger: sequence 0, no parent, empty set.
    pub fn genesis(close_time: CloseTime) -> Self {
        Self {
            header: LedgerHeader {
                seq: LedgerSeq(0),
                parent_id: LedgerId::ZERO,
                tx_set_id: TxSetId::NONE,
                close_time,
                close_time_resolution: DEFAULT_CLOSE_RESOLUTION,
                close_agree: true,
                parent_close_time: CloseTime::NONE,
            },
            transactions: Vec::new(),
        }
    }

    /// Build the successor of `parent` from an applied transaction set.
    ///
    /// `transactions` arrive already ordered (canonical order, or the
    /// replayed ledger's original order).
    pub fn build_next(
        parent: &Ledger,
        tx_set_id: TxSetId,
        transactions: Vec<Transaction>,
        close_time: CloseTime,
        close_agree: bool,
        close_time_resolution: u64,
    ) -> Self {
        Self {
            header: LedgerHeader {
                seq: parent.seq().next(),
                parent_id: parent.id(),
                tx_set_id,
                close_time,
                close_time_resolution,
                close_agree,
                parent_close_time: parent.header.close_time,
            },
            transactions,
        }
    }

    /// The ledger id: a hash over the header fields.
    pub fn id(&self) -> LedgerId {
        let mut hasher = Hasher::new();
        hasher
            .update(b"ledger:")
            .update(&self.header.seq.0.to_le_bytes())
            .update(self.header.parent_id.0.as_bytes())
            .update(self.header.tx_set_id.0.as_bytes())
            .update(&self.header.close_time.0.to_le_bytes())
            .update(&self.header.close_time_resolution.to_le_bytes())
            .update(&[self.header.close_agree as u8])
            .update(&self.header.parent_close_time.0.to_le_bytes());
        LedgerId(hasher.finish())
    }

    pub fn seq(&self) -> LedgerSeq {
        self.header.seq
    }

    /// Flag ledgers carry fee and amendment votes.
    pub fn is_flag_ledger(&self) -> bool {
        self.header.seq.0 % FLAG_LEDGER_INTERVAL == 0 && self.header.seq.0 != 0
    }

    pub fn contains_tx(&self, tx_id: &Hash) -> bool {
        self.transactions.iter().any(|tx| tx.id() == *tx_id)
    }
}

/// Whether a ledger at `seq` is a flag ledger.
pub fn is_flag_seq(seq: LedgerSeq) -> bool {
    seq.0 % FLAG_LEDGER_INTERVAL == 0 && seq.0 != 0
}

/// Round a close time to the given resolution (to nearest, half up).
/// The zero sentinel is preserved.
pub fn round_close_time(close_time: CloseTime, resolution_secs: u64) -> CloseTime {
    if close_time.is_none() || resolution_secs == 0 {
        return close_time;
    }
    let t = close_time.0 + resolution_secs / 2;
    CloseTime(t - t % resolution_secs)
}

/// Close-time resolution for the ledger following one closed at
/// `prev_resolution` with agreement `prev_agree`, at sequence `seq`.
///
/// Disagreed closes coarsen the granularity (on an 8-ledger cadence);
/// agreed closes refine it (on a 256-ledger cadence).
pub fn next_close_resolution(prev_resolution: u64, prev_agree: bool, seq: LedgerSeq) -> u64 {
    let position = CLOSE_TIME_RESOLUTIONS
        .iter()
        .position(|&r| r == prev_resolution);
    let Some(position) = position else {
        return DEFAULT_CLOSE_RESOLUTION;
    };

    if !prev_agree && seq.0 % COARSEN_RESOLUTION_EVERY == 0 {
        if position + 1 < CLOSE_TIME_RESOLUTIONS.len() {
            return CLOSE_TIME_RESOLUTIONS[position + 1];
        }
    } else if prev_agree && seq.0 % REFINE_RESOLUTION_EVERY == 0 && position > 0 {
        return CLOSE_TIME_RESOLUTIONS[position - 1];
    }
    prev_resolution
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_ledger() {
        let genesis = Ledger::genesis(CloseTime(1000));
        assert_eq!(genesis.seq(), LedgerSeq(0));
        assert!(genesis.header.parent_id.is_zero());
        assert!(!genesis.is_flag_ledger());
    }

    #[test]
    fn test_ledger_id_covers_header() {
        let a = Ledger::genesis(CloseTime(1000));
        let mut b = a.clone();
        b.header.close_time = CloseTime(1010);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_flag_ledger_cadence() {
        assert!(!is_flag_seq(LedgerSeq(0)));
        assert!(!is_flag_seq(LedgerSeq(255)));
        assert!(is_flag_seq(LedgerSeq(256)));
        assert!(!is_flag_seq(LedgerSeq(257)));
        assert!(is_flag_seq(LedgerSeq(512)));
    }

    #[test]
    fn test_round_close_time() {
        assert_eq!(round_close_time(CloseTime(104), 10), CloseTime(100));
        assert_eq!(round_close_time(CloseTime(105), 10), CloseTime(110));
        assert_eq!(round_close_time(CloseTime(100), 10), CloseTime(100));
        // Zero sentinel survives rounding.
        assert_eq!(round_close_time(CloseTime::NONE, 10), CloseTime::NONE);
    }

    #[test]
    fn test_resolution_coarsens_on_disagreement() {
        assert_eq!(next_close_resolution(30, false, LedgerSeq(8)), 60);
        // Off-cadence sequence keeps the resolution.
        assert_eq!(next_close_resolution(30, false, LedgerSeq(9)), 30);
        // Already coarsest.
        assert_eq!(next_close_resolution(120, false, LedgerSeq(16)), 120);
    }

    #[test]
    fn test_resolution_refines_on_agreement() {
        assert_eq!(next_close_resolution(30, true, LedgerSeq(256)), 20);
        assert_eq!(next_close_resolution(30, true, LedgerSeq(257)), 30);
        // Already finest.
        assert_eq!(next_close_resolution(10, true, LedgerSeq(512)), 10);
    }

    #[test]
    fn test_unknown_resolution_resets_to_default() {
        assert_eq!(next_close_resolution(7, true, LedgerSeq(1)), 30);
    }
}
