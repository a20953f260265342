//! 256-bit hash primitive.

use sbor::prelude::BasicSbor;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from parsing a hash out of a hex string.
#[derive(Debug, Error, PartialEq)]
pub enum HexError {
    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// A 256-bit content hash (sha256).
///
/// Ledgers and transaction sets are identified by hash; equality of hashes
/// implies equality of content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BasicSbor)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The all-zero hash. Used as the parent of the genesis ledger and as
    /// the tx-set id of a bow-out proposal.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        Hash(Sha256::digest(data).into())
    }

    /// Wrap raw hash bytes without hashing.
    pub const fn from_raw(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, HexError> {
        if s.len() != 64 {
            return Err(HexError::InvalidLength {
                expected: 64,
                actual: s.len(),
            });
        }
        let bytes = hex::decode(s)?;
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&bytes);
        Ok(Hash(raw))
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..", &self.to_hex()[..8])
    }
}

/// Incremental hasher for multi-part inputs.
///
/// Used where a hash covers several fields without materializing an
/// intermediate buffer.
#[derive(Default)]
pub struct Hasher(Sha256);

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.0.update(data);
        self
    }

    pub fn finish(self) -> Hash {
        Hash(self.0.finalize().into())
    }
}
