// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The process-local buffer between bus delivery and verified dispatch.
//!
//! Off-bus payloads land here when the bus hands them over; verification
//! removes an entry atomically just before dispatch, which is what makes
//! dispatch at-most-once. A sweeper evicts anything older than the
//! retention window — entries whose anchor never showed up.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use aexowork_wire::OffBusMessage;
use dashmap::DashMap;
use lru::LruCache;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backoff::{STORE_RETENTION, STORE_WAIT_BUDGET, STORE_WAIT_SLICE};

struct StoredEntry {
    message: OffBusMessage,
    received_at: Instant,
}

pub struct MessageStore {
    entries: DashMap<String, StoredEntry>,
    retention: Duration,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(STORE_RETENTION)
    }
}

impl MessageStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    /// Buffer an off-bus message. The first copy wins; a replayed message
    /// id never overwrites an entry that may be mid-verification.
    pub fn insert(&self, message: OffBusMessage) {
        self.entries
            .entry(message.message_id.clone())
            .or_insert_with(|| StoredEntry {
                message,
                received_at: Instant::now(),
            });
    }

    pub fn get(&self, message_id: &str) -> Option<OffBusMessage> {
        self.entries.get(message_id).map(|e| e.message.clone())
    }

    /// Remove and return the entry. Atomic: exactly one concurrent caller
    /// observes `Some`, and that caller is the one allowed to dispatch.
    pub fn remove(&self, message_id: &str) -> Option<OffBusMessage> {
        self.entries.remove(message_id).map(|(_, e)| e.message)
    }

    /// Poll for an entry in [`STORE_WAIT_SLICE`] steps for up to
    /// [`STORE_WAIT_BUDGET`]; the off-bus delivery may lag the ledger by a
    /// small margin.
    pub async fn wait_for(&self, message_id: &str) -> Option<OffBusMessage> {
        let deadline = Instant::now() + STORE_WAIT_BUDGET;
        loop {
            if let Some(message) = self.get(message_id) {
                return Some(message);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(STORE_WAIT_SLICE).await;
        }
    }

    /// Evict entries past retention; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let cutoff = Instant::now() - self.retention;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.received_at > cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run the eviction sweep on `interval` until cancelled.
pub fn spawn_sweeper(
    store: Arc<MessageStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick would sweep an empty store.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = store.sweep();
                    if evicted > 0 {
                        debug!(evicted, remaining = store.len(), "message store swept");
                    }
                }
            }
        }
    })
}

// ── Verification cache ────────────────────────────────────────────────────────

/// Bounded set of hashes already confirmed on-chain. Purely an
/// optimization: a hit skips the mirror round-trips during confirmation.
pub struct VerificationCache {
    inner: Mutex<LruCache<String, ()>>,
}

impl Default for VerificationCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl VerificationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn record(&self, hash: &str) {
        self.inner
            .lock()
            .expect("cache lock poisoned")
            .put(hash.to_string(), ());
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.inner
            .lock()
            .expect("cache lock poisoned")
            .contains(hash)
    }
}
