//! Validation gossip message.

use crate::NetworkMessage;
use meridian_types::{Hash, Hasher, Validation};
use sbor::prelude::BasicSbor;

/// Broadcasts a signed validation.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ValidationGossip {
    pub validation: Validation,
}

impl ValidationGossip {
    pub fn new(validation: Validation) -> Self {
        Self { validation }
    }

    pub fn validation(&self) -> &Validation {
        &self.validation
    }

    /// The hash a relay layer suppresses this message under.
    ///
    /// Covers the full signed validation (the signature pins the signed
    /// content), so a relayed copy of our own validation is recognized as
    /// ours. Suppressing only the signing half-hash would miss it.
    pub fn transport_hash(&self) -> Hash {
        let mut hasher = Hasher::new();
        hasher
            .update(b"validation-transport:")
            .update(self.validation.ledger_id().0.as_bytes());
        // Ed25519 signatures are deterministic: signature bytes pin the
        // signer and the signed content.
        let raw = sbor::basic_encode(&self.validation).unwrap_or_default();
        hasher.update(&raw);
        hasher.finish()
    }
}

impl NetworkMessage for ValidationGossip {
    fn message_type_id() -> &'static str {
        "consensus.validation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::test_utils::test_keypair;
    use meridian_types::{LedgerId, LedgerSeq, ValidationContent};

    fn validation(seed: u8, seq: u64) -> Validation {
        Validation::sign(
            &test_keypair(seed),
            ValidationContent {
                ledger_id: LedgerId(Hash::digest(b"ledger")),
                ledger_seq: LedgerSeq(seq),
                sign_time: 500,
                full: true,
                load_fee: None,
                fee_vote: None,
                amendments: vec![],
            },
        )
    }

    #[test]
    fn test_transport_hash_distinguishes_signers() {
        let a = ValidationGossip::new(validation(1, 5));
        let b = ValidationGossip::new(validation(2, 5));
        assert_ne!(a.transport_hash(), b.transport_hash());
    }

    #[test]
    fn test_transport_hash_is_stable() {
        let gossip = ValidationGossip::new(validation(1, 5));
        assert_eq!(gossip.transport_hash(), gossip.transport_hash());
    }
}
