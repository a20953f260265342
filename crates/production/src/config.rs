//! Validator configuration.
//!
//! Loaded from TOML; sections map onto the typed configs of the consensus
//! and arbiter crates.

use meridian_arbiter::ArbiterConfig;
use meridian_consensus::{ConsensusConfig, ConsensusKind};
use meridian_types::{KeyPair, PublicKey, ValidatorRegistry};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("bad hex in {field}: {value}")]
    BadHex { field: &'static str, value: String },

    #[error("unknown consensus_type: {0} (expected \"builtin\" or \"external_arbiter\")")]
    UnknownConsensusType(String),
}

/// Top-level validator configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub consensus: ConsensusSection,
    #[serde(default)]
    pub arbiter: ArbiterSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// 32-byte hex seed of the validation key. Absent means observer mode:
    /// the node tracks consensus without proposing or validating.
    pub validation_seed: Option<String>,
    /// Hex public keys of the trusted validators.
    pub trusted_validators: Vec<String>,
    /// Data directory for the ledger store.
    pub data_dir: PathBuf,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            validation_seed: None,
            trusted_validators: Vec::new(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusSection {
    /// "builtin" or "external_arbiter".
    pub consensus_type: String,
    pub tick_interval_ms: u64,
    pub min_consensus_ms: u64,
    pub min_close_ms: u64,
    pub idle_interval_ms: u64,
    pub converge_pct: u32,
    pub min_proposers: usize,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        let defaults = ConsensusConfig::default();
        Self {
            consensus_type: "builtin".to_string(),
            tick_interval_ms: defaults.tick_interval.as_millis() as u64,
            min_consensus_ms: defaults.min_consensus.as_millis() as u64,
            min_close_ms: defaults.min_close.as_millis() as u64,
            idle_interval_ms: defaults.idle_interval.as_millis() as u64,
            converge_pct: defaults.converge_pct,
            min_proposers: defaults.min_proposers,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbiterSection {
    pub hosts: String,
    pub namespace: String,
}

impl Default for ArbiterSection {
    fn default() -> Self {
        let defaults = ArbiterConfig::default();
        Self {
            hosts: defaults.hosts,
            namespace: defaults.namespace,
        }
    }
}

impl ValidatorConfig {
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// The validation key pair, when configured.
    pub fn keys(&self) -> Result<Option<KeyPair>, ConfigError> {
        let Some(seed_hex) = &self.node.validation_seed else {
            return Ok(None);
        };
        let seed = parse_hex32("node.validation_seed", seed_hex)?;
        Ok(Some(KeyPair::from_seed(&seed)))
    }

    /// The trusted-validator registry. A configured validation key is
    /// always trusted, whether or not it is listed.
    pub fn registry(&self) -> Result<ValidatorRegistry, ConfigError> {
        let mut keys = Vec::new();
        for entry in &self.node.trusted_validators {
            keys.push(PublicKey(parse_hex32("node.trusted_validators", entry)?));
        }
        if let Some(own) = self.keys()? {
            keys.push(own.public_key());
        }
        Ok(ValidatorRegistry::from_keys(keys))
    }

    pub fn consensus_config(&self) -> Result<ConsensusConfig, ConfigError> {
        let kind = match self.consensus.consensus_type.as_str() {
            "builtin" => ConsensusKind::Builtin,
            "external_arbiter" => ConsensusKind::ExternalArbiter,
            other => return Err(ConfigError::UnknownConsensusType(other.to_string())),
        };
        Ok(ConsensusConfig {
            kind,
            tick_interval: Duration::from_millis(self.consensus.tick_interval_ms),
            min_consensus: Duration::from_millis(self.consensus.min_consensus_ms),
            min_close: Duration::from_millis(self.consensus.min_close_ms),
            idle_interval: Duration::from_millis(self.consensus.idle_interval_ms),
            converge_pct: self.consensus.converge_pct,
            min_proposers: self.consensus.min_proposers,
            ..ConsensusConfig::default()
        })
    }

    pub fn arbiter_config(&self) -> ArbiterConfig {
        ArbiterConfig {
            hosts: self.arbiter.hosts.clone(),
            namespace: self.arbiter.namespace.clone(),
        }
    }
}

fn parse_hex32(field: &'static str, value: &str) -> Result<[u8; 32], ConfigError> {
    let bad = || ConfigError::BadHex {
        field,
        value: value.to_string(),
    };
    let bytes = hex::decode(value).map_err(|_| bad())?;
    let raw: [u8; 32] = bytes.try_into().map_err(|_| bad())?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::from_toml("").unwrap();
        assert!(config.keys().unwrap().is_none());
        let consensus = config.consensus_config().unwrap();
        assert_eq!(consensus.kind, ConsensusKind::Builtin);
        assert_eq!(consensus.tick_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_full_config() {
        let raw = r#"
            [node]
            validation_seed = "0101010101010101010101010101010101010101010101010101010101010101"
            trusted_validators = []
            data_dir = "/var/lib/meridian"

            [consensus]
            consensus_type = "external_arbiter"
            tick_interval_ms = 500

            [arbiter]
            hosts = "zk1:2181,zk2:2181"
            namespace = "testnet"
        "#;
        let config = ValidatorConfig::from_toml(raw).unwrap();

        let keys = config.keys().unwrap().expect("seed configured");
        assert!(config.registry().unwrap().is_trusted(&keys.node_id()));

        let consensus = config.consensus_config().unwrap();
        assert_eq!(consensus.kind, ConsensusKind::ExternalArbiter);
        assert_eq!(consensus.tick_interval, Duration::from_millis(500));

        let arbiter = config.arbiter_config();
        assert_eq!(arbiter.namespace, "testnet");
        assert_eq!(arbiter.hosts, "zk1:2181,zk2:2181");
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let bad_type = r#"
            [consensus]
            consensus_type = "quantum"
        "#;
        let config = ValidatorConfig::from_toml(bad_type).unwrap();
        assert!(matches!(
            config.consensus_config(),
            Err(ConfigError::UnknownConsensusType(_))
        ));

        let bad_seed = r#"
            [node]
            validation_seed = "zz"
        "#;
        let config = ValidatorConfig::from_toml(bad_seed).unwrap();
        assert!(matches!(config.keys(), Err(ConfigError::BadHex { .. })));
    }
}
