// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Process-wide fabric configuration.
//!
//! Two layers, deliberately separate:
//!
//! 1. **Fabric config** — network selection, bus endpoint, known peers —
//!    loaded from YAML files that are deep-merged in search order (see
//!    [`loader::load`]). Everything has a production-safe default; running
//!    with no config file at all gives you testnet + a local bus.
//! 2. **Credentials** — account id, private key, and topic ids for one
//!    agent role — read from environment variables named by the role's
//!    prefix (see [`roles`]). These are secrets and never live in YAML.
//!
//! Missing credential variables are a fatal, typed [`ConfigError`] that
//! names every absent key, so a misconfigured deployment fails at startup
//! with an actionable message instead of half-working.

pub mod error;
pub mod loader;
pub mod roles;
pub mod schema;

pub use error::ConfigError;
pub use loader::load;
pub use roles::{credentials_from_env, AgentCredentials, AgentRole};
pub use schema::{AgentMetaConfig, FabricConfig, LedgerNetwork, PeerConfig};
