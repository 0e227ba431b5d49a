// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The agent's provisioned ledger identity.

use aexowork_config::AgentCredentials;
use aexowork_wire::Signer;

use crate::error::FabricError;

/// Immutable once built; the signing key stays inside [`Signer`] and is
/// never exposed or logged.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub account_id: String,
    /// Compressed SEC1 public key, hex.
    pub public_key: String,
    pub inbound_topic_id: String,
    pub outbound_topic_id: String,
    /// Reserved for discovery metadata.
    pub profile_topic_id: Option<String>,
    signer: Signer,
}

impl AgentIdentity {
    pub fn from_credentials(credentials: &AgentCredentials) -> Result<Self, FabricError> {
        let signer = Signer::from_hex(&credentials.private_key)?;
        Ok(Self {
            account_id: credentials.account_id.clone(),
            public_key: signer.public_key_hex(),
            inbound_topic_id: credentials.inbound_topic.clone(),
            outbound_topic_id: credentials.outbound_topic.clone(),
            profile_topic_id: credentials.profile_topic.clone(),
            signer,
        })
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }
}
