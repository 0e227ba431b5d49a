// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! In-memory topic service for tests and local development.
//!
//! Behaves like the real thing where the fabric cares: per-topic strictly
//! increasing sequences, `gt:` read semantics, asc/desc ordering, and
//! injectable throttling so rate-limit handling can be exercised without a
//! mirror node.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::Utc;

use crate::{
    error::LedgerError,
    types::{TopicMessage, TopicReader, TopicWriter, TxReceipt},
};

#[derive(Default)]
pub struct MemoryLedger {
    topics: Mutex<HashMap<String, Vec<TopicMessage>>>,
    throttled: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes to a topic, returning the assigned sequence.
    pub fn inject(&self, topic_id: &str, payload: &[u8], payer: Option<&str>) -> u64 {
        let mut topics = self.topics.lock().expect("ledger lock poisoned");
        let entries = topics.entry(topic_id.to_string()).or_default();
        let sequence = entries.last().map(|m| m.sequence).unwrap_or(0) + 1;
        let now = Utc::now();
        entries.push(TopicMessage {
            sequence,
            payer_account_id: payer.map(str::to_string),
            consensus_timestamp: format!("{}.{:09}", now.timestamp(), now.timestamp_subsec_nanos()),
            payload: payload.to_vec(),
        });
        sequence
    }

    /// Everything on a topic, in sequence order.
    pub fn messages(&self, topic_id: &str) -> Vec<TopicMessage> {
        self.topics
            .lock()
            .expect("ledger lock poisoned")
            .get(topic_id)
            .cloned()
            .unwrap_or_default()
    }

    /// While set, every fetch returns [`LedgerError::Throttled`].
    pub fn set_throttled(&self, throttled: bool) {
        self.throttled.store(throttled, Ordering::SeqCst);
    }

    /// While set, every fetch returns [`LedgerError::Unavailable`]
    /// (exercises the facade's fallback path).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TopicWriter for MemoryLedger {
    async fn submit(&self, topic_id: &str, payload: &[u8]) -> Result<TxReceipt, LedgerError> {
        if topic_id.trim().is_empty() {
            return Err(LedgerError::InvalidTopic(topic_id.to_string()));
        }
        let sequence = self.inject(topic_id, payload, None);
        Ok(TxReceipt {
            transaction_id: format!("{topic_id}@{sequence}"),
            topic_id: topic_id.to_string(),
        })
    }
}

#[async_trait]
impl TopicReader for MemoryLedger {
    async fn fetch(
        &self,
        topic_id: &str,
        since_sequence: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<TopicMessage>, LedgerError> {
        if self.throttled.load(Ordering::SeqCst) {
            return Err(LedgerError::Throttled);
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("memory ledger reads disabled".into()));
        }
        let topics = self.topics.lock().expect("ledger lock poisoned");
        let mut matching: Vec<TopicMessage> = topics
            .get(topic_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|m| m.sequence > since_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if !ascending {
            matching.reverse();
        }
        matching.truncate(limit as usize);
        Ok(matching)
    }
}
