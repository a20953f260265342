//! Trusted validator list.

use crate::crypto::PublicKey;
use crate::identifiers::NodeId;
use std::collections::HashMap;

/// A trusted validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub node_id: NodeId,
    pub public_key: PublicKey,
}

/// The set of validators this node trusts.
///
/// Proposals and validations from signers outside this set are dropped as
/// untrusted.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<NodeId, PublicKey>,
}

impl ValidatorRegistry {
    pub fn new(validators: Vec<ValidatorInfo>) -> Self {
        Self {
            validators: validators
                .into_iter()
                .map(|v| (v.node_id, v.public_key))
                .collect(),
        }
    }

    pub fn from_keys(keys: impl IntoIterator<Item = PublicKey>) -> Self {
        Self {
            validators: keys.into_iter().map(|k| (k.node_id(), k)).collect(),
        }
    }

    pub fn is_trusted(&self, node: &NodeId) -> bool {
        self.validators.contains_key(node)
    }

    pub fn public_key(&self, node: &NodeId) -> Option<&PublicKey> {
        self.validators.get(node)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.validators.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_registry_lookup() {
        let a = KeyPair::from_seed(&[1u8; 32]);
        let b = KeyPair::from_seed(&[2u8; 32]);
        let registry = ValidatorRegistry::from_keys([a.public_key()]);

        assert!(registry.is_trusted(&a.node_id()));
        assert!(!registry.is_trusted(&b.node_id()));
        assert_eq!(registry.public_key(&a.node_id()), Some(&a.public_key()));
        assert_eq!(registry.len(), 1);
    }
}
