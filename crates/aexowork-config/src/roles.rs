// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Agent roles and their credential environment variables.
//!
//! Each role maps to a fixed env prefix; the variables
//! `<PREFIX>_ACCOUNT_ID`, `<PREFIX>_PRIVATE_KEY`, `<PREFIX>_INBOUND_TOPIC`,
//! and `<PREFIX>_OUTBOUND_TOPIC` are required, `<PREFIX>_PROFILE_TOPIC` is
//! optional. All missing required keys are reported together.

use std::str::FromStr;

use crate::error::ConfigError;

/// The marketplace agent roles this fabric provisions credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Client,
    Worker,
    Verification,
    Repute,
    Dispute,
    Data,
    Escrow,
    Marketplace,
}

impl AgentRole {
    pub const ALL: [AgentRole; 8] = [
        AgentRole::Client,
        AgentRole::Worker,
        AgentRole::Verification,
        AgentRole::Repute,
        AgentRole::Dispute,
        AgentRole::Data,
        AgentRole::Escrow,
        AgentRole::Marketplace,
    ];

    /// The env prefix carrying this role's credentials.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            AgentRole::Client => "CLIENT_AGENT",
            AgentRole::Worker => "WORKER_AGENT",
            AgentRole::Verification => "VERIFICATION_AGENT",
            AgentRole::Repute => "REPUTE_AGENT",
            AgentRole::Dispute => "DISPUTE_AGENT",
            AgentRole::Data => "DATA_AGENT",
            AgentRole::Escrow => "ESCROW_AGENT",
            AgentRole::Marketplace => "MARKETPLACE_AGENT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Client => "client",
            AgentRole::Worker => "worker",
            AgentRole::Verification => "verification",
            AgentRole::Repute => "repute",
            AgentRole::Dispute => "dispute",
            AgentRole::Data => "data",
            AgentRole::Escrow => "escrow",
            AgentRole::Marketplace => "marketplace",
        }
    }
}

impl FromStr for AgentRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentRole::ALL
            .iter()
            .find(|r| r.as_str() == s.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| ConfigError::UnknownRole(s.to_string()))
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential set provisioned once per agent; immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct AgentCredentials {
    pub account_id: String,
    /// ECDSA private key, hex. Never logged.
    pub private_key: String,
    pub inbound_topic: String,
    pub outbound_topic: String,
    pub profile_topic: Option<String>,
}

fn required(prefix: &str, suffix: &str, missing: &mut Vec<String>) -> String {
    let key = format!("{prefix}_{suffix}");
    match std::env::var(&key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => {
            missing.push(key);
            String::new()
        }
    }
}

/// Read a role's credentials from the environment.
///
/// Collects every absent key before failing so the startup error names the
/// complete fix, not just the first missing variable.
pub fn credentials_from_env(role: AgentRole) -> Result<AgentCredentials, ConfigError> {
    let prefix = role.env_prefix();
    let mut missing = Vec::new();

    let account_id = required(prefix, "ACCOUNT_ID", &mut missing);
    let private_key = required(prefix, "PRIVATE_KEY", &mut missing);
    let inbound_topic = required(prefix, "INBOUND_TOPIC", &mut missing);
    let outbound_topic = required(prefix, "OUTBOUND_TOPIC", &mut missing);
    let profile_topic = std::env::var(format!("{prefix}_PROFILE_TOPIC"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    if !missing.is_empty() {
        return Err(ConfigError::MissingCredentials {
            role: role.as_str().to_string(),
            keys: missing,
        });
    }

    Ok(AgentCredentials {
        account_id,
        private_key,
        inbound_topic,
        outbound_topic,
        profile_topic,
    })
}
