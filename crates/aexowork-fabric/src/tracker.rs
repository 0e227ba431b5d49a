// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-topic high-water marks for ledger sequences.

use std::{collections::HashMap, sync::Mutex};

/// Highest ledger sequence already processed per topic. In-memory only; a
/// fresh process re-reads from sequence 0 and relies on the message-store
/// dedup for at-most-once dispatch.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    inner: Mutex<HashMap<String, u64>>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 0 for a topic never seen.
    pub fn get(&self, topic_id: &str) -> u64 {
        *self
            .inner
            .lock()
            .expect("tracker lock poisoned")
            .get(topic_id)
            .unwrap_or(&0)
    }

    /// Record `sequence` as processed. Regressions are ignored so a late
    /// writer can never move the mark backwards.
    pub fn record(&self, topic_id: &str, sequence: u64) {
        let mut inner = self.inner.lock().expect("tracker lock poisoned");
        let entry = inner.entry(topic_id.to_string()).or_insert(0);
        if sequence > *entry {
            *entry = sequence;
        }
    }
}
