// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// HTTP 429 from the mirror node. Polling loops swallow this; their
    /// own cadence is the backoff.
    #[error("rate limited by the ledger")]
    Throttled,

    #[error("ledger response decode error: {0}")]
    Decode(String),

    #[error("invalid topic id: {0}")]
    InvalidTopic(String),
}
