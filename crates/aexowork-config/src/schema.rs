// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Fabric configuration schema.
//!
//! Everything here is YAML-loadable with serde defaults; see the crate docs
//! for the search order. Example full config:
//!
//! ```yaml
//! ledger_network: testnet
//! bus_url: "nats://127.0.0.1:4222"
//! use_offchain_messaging: true
//! gateway_url: "http://127.0.0.1:5551"
//! status_bind: "127.0.0.1:18890"
//! agent:
//!   name: "worker-1"
//!   description: "Rust build agent"
//!   capabilities: ["rust", "wasm"]
//! peers:
//!   - name: client
//!     account_id: "0.0.1001"
//!     inbound_topic: "0.0.2001"
//!   - name: worker
//!     account_id: "0.0.1002"
//!     inbound_topic: "0.0.2002"
//! ```

use serde::{Deserialize, Serialize};

/// Which public ledger environment the fabric talks to. Selects the
/// mirror-node base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerNetwork {
    #[default]
    Testnet,
    Mainnet,
}

impl LedgerNetwork {
    pub fn mirror_base_url(&self) -> &'static str {
        match self {
            LedgerNetwork::Testnet => "https://testnet.mirrornode.hedera.com",
            LedgerNetwork::Mainnet => "https://mainnet-public.mirrornode.hedera.com",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerNetwork::Testnet => "testnet",
            LedgerNetwork::Mainnet => "mainnet",
        }
    }
}

fn default_bus_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}
fn default_gateway_url() -> String {
    "http://127.0.0.1:5551".to_string()
}
fn default_status_bind() -> String {
    "127.0.0.1:18890".to_string()
}
fn default_true() -> bool {
    true
}

/// Top-level fabric configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    #[serde(default)]
    pub ledger_network: LedgerNetwork,

    /// Low-latency bus endpoint. Unreachable at startup → the process runs
    /// in direct-ledger mode for its lifetime.
    #[serde(default = "default_bus_url")]
    pub bus_url: String,

    /// Whether to carry payloads off-bus at all. Forced off after a bus
    /// failure at startup.
    #[serde(default = "default_true")]
    pub use_offchain_messaging: bool,

    /// Consensus-gateway endpoint: the submit path for topic messages and
    /// the fetch fallback when the mirror node fails.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// `host:port` the agent host binds its status endpoint to.
    /// Loopback-only by default.
    #[serde(default = "default_status_bind")]
    pub status_bind: String,

    #[serde(default)]
    pub agent: AgentMetaConfig,

    /// The known-peer table: every agent this process can address
    /// directly. Immutable after startup.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            ledger_network: LedgerNetwork::default(),
            bus_url: default_bus_url(),
            use_offchain_messaging: true,
            gateway_url: default_gateway_url(),
            status_bind: default_status_bind(),
            agent: AgentMetaConfig::default(),
            peers: Vec::new(),
        }
    }
}

/// Human-readable identity advertised on the status endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetaConfig {
    /// Short display name, e.g. `"worker-1"`.
    pub name: Option<String>,
    pub description: Option<String>,
    /// Capability tags, e.g. `["rust", "verification"]`.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// One entry of the known-peer table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Logical name, e.g. `"escrow"`.
    pub name: String,
    pub account_id: String,
    /// The peer's inbound ledger topic — where anchors and direct
    /// messages for it are posted.
    pub inbound_topic: String,
    /// Compressed SEC1 public key, when known. Enables strict signature
    /// checks on messages from this peer.
    #[serde(default)]
    pub public_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_testnet_and_loopback() {
        let c = FabricConfig::default();
        assert_eq!(c.ledger_network, LedgerNetwork::Testnet);
        assert!(c.status_bind.starts_with("127.0.0.1"));
        assert!(c.bus_url.starts_with("nats://127.0.0.1"));
        assert!(c.use_offchain_messaging);
        assert!(c.peers.is_empty());
    }

    #[test]
    fn mirror_url_follows_network() {
        assert!(LedgerNetwork::Testnet.mirror_base_url().contains("testnet"));
        assert!(LedgerNetwork::Mainnet.mirror_base_url().contains("mainnet"));
    }

    #[test]
    fn config_yaml_round_trip() {
        let mut c = FabricConfig::default();
        c.peers.push(PeerConfig {
            name: "client".into(),
            account_id: "0.0.1001".into(),
            inbound_topic: "0.0.2001".into(),
            public_key: None,
        });
        let yaml = serde_yaml::to_string(&c).unwrap();
        let back: FabricConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.peers, c.peers);
        assert_eq!(back.bus_url, c.bus_url);
    }

    #[test]
    fn network_parses_lowercase() {
        let c: FabricConfig = serde_yaml::from_str("ledger_network: mainnet\n").unwrap();
        assert_eq!(c.ledger_network, LedgerNetwork::Mainnet);
    }
}
