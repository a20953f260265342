//! Ed25519 key and signature wrappers.
//!
//! Thin wrappers so the rest of the workspace never touches the dalek types
//! directly. Signatures and public keys travel on the wire; signing keys
//! never leave the node.

use crate::identifiers::NodeId;
use crate::Hash;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use sbor::prelude::BasicSbor;

/// A validation signing key pair.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Derive a key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// The node identifier derived from this key.
    pub fn node_id(&self) -> NodeId {
        self.public_key().node_id()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// An Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// The node identifier is the hash of the public key bytes.
    pub fn node_id(&self) -> NodeId {
        NodeId(*Hash::digest(&self.0).as_bytes())
    }

    /// Verify a signature over a message. Returns false for malformed keys
    /// or signatures; callers treat that as an untrusted message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig).is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PK:{}..", &hex::encode(self.0)[..8])
    }
}

/// An Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, BasicSbor)]
pub struct Signature(pub [u8; 64]);

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sig:{}..", &hex::encode(self.0)[..8])
    }
}
