//! Round keys and the published-position codec.

use meridian_types::{CloseTime, Hash, LedgerId, LedgerSeq, TxSetId};
use thiserror::Error;

/// Identifies the coordination record for one (namespace, sequence) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundKey {
    pub namespace: String,
    pub seq: LedgerSeq,
}

impl RoundKey {
    pub fn new(namespace: impl Into<String>, seq: LedgerSeq) -> Self {
        Self {
            namespace: namespace.into(),
            seq,
        }
    }

    /// Store path of this round's record.
    pub fn path(&self) -> String {
        format!("/{}/consensus/{}", self.namespace, self.seq.0)
    }

    /// Parent paths that must exist before any record can be created.
    /// Created once per process at startup.
    pub fn parent_paths(namespace: &str) -> [String; 2] {
        [format!("/{namespace}"), format!("/{namespace}/consensus")]
    }
}

/// Errors from parsing a stored record value.
#[derive(Debug, Error, PartialEq)]
pub enum PositionParseError {
    #[error("expected 3 '-'-separated fields, got {0}")]
    FieldCount(usize),

    #[error("bad hash field: {0}")]
    BadHash(#[from] meridian_types::HexError),

    #[error("bad close time field")]
    BadCloseTime,
}

/// The position stored in a round's coordination record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedPosition {
    pub tx_set: TxSetId,
    pub prev_ledger: LedgerId,
    pub close_time: CloseTime,
}

impl PublishedPosition {
    /// Record value format: `<tx_set_hex>-<prev_ledger_hex>-<close_time>`.
    pub fn encode(&self) -> String {
        format!(
            "{}-{}-{}",
            self.tx_set.0.to_hex(),
            self.prev_ledger.0.to_hex(),
            self.close_time.0
        )
    }

    pub fn parse(value: &str) -> Result<Self, PositionParseError> {
        let fields: Vec<&str> = value.split('-').collect();
        if fields.len() != 3 {
            return Err(PositionParseError::FieldCount(fields.len()));
        }
        let tx_set = TxSetId(Hash::from_hex(fields[0])?);
        let prev_ledger = LedgerId(Hash::from_hex(fields[1])?);
        let close_time = fields[2]
            .parse::<u64>()
            .map_err(|_| PositionParseError::BadCloseTime)?;
        Ok(Self {
            tx_set,
            prev_ledger,
            close_time: CloseTime(close_time),
        })
    }
}
