// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Process-lifetime counters surfaced on the status endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct FabricStats {
    polls: AtomicU64,
    throttled_polls: AtomicU64,
    verified_dispatches: AtomicU64,
    direct_dispatches: AtomicU64,
    verify_failures: AtomicU64,
    dropped_records: AtomicU64,
    sent_messages: AtomicU64,
    send_failures: AtomicU64,
}

/// Point-in-time copy of the counters, JSON-ready.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub polls: u64,
    pub throttled_polls: u64,
    pub verified_dispatches: u64,
    pub direct_dispatches: u64,
    pub verify_failures: u64,
    pub dropped_records: u64,
    pub sent_messages: u64,
    pub send_failures: u64,
}

impl FabricStats {
    pub fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_throttled_poll(&self) {
        self.throttled_polls.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_verified_dispatch(&self) {
        self.verified_dispatches.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_direct_dispatch(&self) {
        self.direct_dispatches.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_verify_failure(&self) {
        self.verify_failures.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_dropped_record(&self) {
        self.dropped_records.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_sent(&self, count: u64) {
        self.sent_messages.fetch_add(count, Ordering::Relaxed);
    }
    pub fn record_send_failures(&self, count: u64) {
        self.send_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            throttled_polls: self.throttled_polls.load(Ordering::Relaxed),
            verified_dispatches: self.verified_dispatches.load(Ordering::Relaxed),
            direct_dispatches: self.direct_dispatches.load(Ordering::Relaxed),
            verify_failures: self.verify_failures.load(Ordering::Relaxed),
            dropped_records: self.dropped_records.load(Ordering::Relaxed),
            sent_messages: self.sent_messages.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}
