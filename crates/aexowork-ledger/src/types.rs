// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Topic service types and the reader/writer trait seams.

use async_trait::async_trait;

use crate::error::LedgerError;

/// One message read from a ledger topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMessage {
    /// Strictly increasing within a topic; the fabric's only ordering
    /// guarantee.
    pub sequence: u64,
    /// Account that paid for the submission, when the source exposes it.
    pub payer_account_id: Option<String>,
    /// Consensus timestamp as reported by the source, `seconds.nanos`.
    pub consensus_timestamp: String,
    /// Decoded message bytes.
    pub payload: Vec<u8>,
}

/// Receipt for an accepted topic submission.
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub transaction_id: String,
    pub topic_id: String,
}

/// Idempotent topic reads. Implementations: mirror node REST, consensus
/// gateway, in-memory double.
#[async_trait]
pub trait TopicReader: Send + Sync {
    /// Messages strictly newer than `since_sequence`, at most `limit`,
    /// in ascending or descending sequence order.
    async fn fetch(
        &self,
        topic_id: &str,
        since_sequence: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<TopicMessage>, LedgerError>;
}

/// Topic append.
#[async_trait]
pub trait TopicWriter: Send + Sync {
    async fn submit(&self, topic_id: &str, payload: &[u8]) -> Result<TxReceipt, LedgerError>;
}
