// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use aexowork_bus::BusError;
use aexowork_config::ConfigError;
use aexowork_ledger::LedgerError;
use aexowork_wire::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// Rate limited. Polling loops swallow this; send callers see it.
    #[error("rate limited by the ledger")]
    Throttled,

    #[error("bus unavailable: {0}")]
    BusUnavailable(String),

    /// Payload hash does not match the anchor. Never dispatched.
    #[error("payload integrity check failed for message {message_id}")]
    Integrity { message_id: String },

    /// The on-chain anchor was not visible within the retry budget.
    #[error("anchor not confirmed on-chain for message {message_id}")]
    AnchorNotConfirmed { message_id: String },

    /// Targeted send to an account missing from the known-peer table.
    /// Never falls back to broadcast.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("handler for {subject} failed: {message}")]
    Handler { subject: String, message: String },

    #[error("fabric runtime not initialized")]
    NotInitialized,

    #[error("wire error: {0}")]
    Wire(String),
}

impl From<ConfigError> for FabricError {
    fn from(e: ConfigError) -> Self {
        FabricError::Config(e.to_string())
    }
}

impl From<WireError> for FabricError {
    fn from(e: WireError) -> Self {
        FabricError::Wire(e.to_string())
    }
}

impl From<serde_json::Error> for FabricError {
    fn from(e: serde_json::Error) -> Self {
        FabricError::Wire(e.to_string())
    }
}

impl From<LedgerError> for FabricError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Throttled => FabricError::Throttled,
            other => FabricError::LedgerUnavailable(other.to_string()),
        }
    }
}

impl From<BusError> for FabricError {
    fn from(e: BusError) -> Self {
        FabricError::BusUnavailable(e.to_string())
    }
}
