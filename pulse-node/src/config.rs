use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use pulse_common::auth::ed25519::Ed25519Authenticator;
use pulse_common::StaticRole;
use pulse_consensus::ConsensusConfig;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Ports reserved per simulated node: the declared port and its consensus
/// port must not collide with the next node's.
const LOCAL_PORT_STRIDE: u16 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub node_name: String,
    pub role: StaticRole,
    /// Declared `host:port`. Consensus traffic uses the port shifted by
    /// `consensus.consensus_port_offset`.
    pub address: String,
    pub version: String,
    /// Hex-encoded ed25519 seed. A fresh key is generated when absent.
    #[serde(default)]
    pub key_seed: Option<String>,
    /// Addresses join requests are sent to, tried in order.
    #[serde(default)]
    pub discovery: Vec<String>,
    #[serde(default)]
    pub is_discovery: bool,
    #[serde(default)]
    pub consensus: ConsensusConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: "node-0".to_string(),
            role: StaticRole::Virtual,
            address: "127.0.0.1:7000".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            key_seed: None,
            discovery: Vec::new(),
            is_discovery: true,
            consensus: ConsensusConfig::default(),
        }
    }
}

impl Config {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads `path`, writing the defaults there first if it does not exist.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            Config::default().save_to_file(path)?;
        }
        Self::load_from_file(path)
    }

    /// Configuration of the `index`-th node of a local cluster derived from
    /// this one. Node 0 is the discovery node; the others join through it.
    pub fn local_node(&self, index: usize) -> Result<Self> {
        let mut address: SocketAddr = self
            .address
            .parse()
            .map_err(|e| NodeError::Config(format!("{}: {}", self.address, e)))?;
        let shift = u16::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(LOCAL_PORT_STRIDE))
            .and_then(|s| address.port().checked_add(s))
            .ok_or_else(|| NodeError::Config(format!("no port left for node {}", index)))?;
        let discovery = address.to_string();
        address.set_port(shift);

        Ok(Self {
            node_name: format!("node-{}", index),
            address: address.to_string(),
            key_seed: None,
            discovery: if index == 0 { Vec::new() } else { vec![discovery] },
            is_discovery: index == 0,
            ..self.clone()
        })
    }

    pub fn authenticator<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Ed25519Authenticator> {
        match &self.key_seed {
            Some(seed) => Ok(Ed25519Authenticator::from_hex(seed)?),
            None => Ok(Ed25519Authenticator::generate(rng)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_common::auth::Authenticator;
    use rand::rngs::OsRng;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.consensus.phase_timeout_ms = 123;
        config.discovery = vec!["127.0.0.1:7000".to_string()];
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"node_name":"n","role":"Virtual","address":"127.0.0.1:8000","version":"1"}"#,
        )
        .unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert!(!loaded.is_discovery);
        assert_eq!(loaded.consensus, ConsensusConfig::default());
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_local_nodes_get_distinct_ports() {
        let base = Config::default();
        let first = base.local_node(0).unwrap();
        let third = base.local_node(2).unwrap();

        assert!(first.is_discovery);
        assert_eq!(first.address, "127.0.0.1:7000");
        assert_eq!(third.address, "127.0.0.1:7020");
        assert_eq!(third.discovery, vec!["127.0.0.1:7000".to_string()]);
        assert!(!third.is_discovery);
    }

    #[test]
    fn test_seeded_key_is_stable() {
        let config = Config {
            key_seed: Some("11".repeat(32)),
            ..Config::default()
        };
        let a = config.authenticator(&mut OsRng).unwrap();
        let b = config.authenticator(&mut OsRng).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }
}
