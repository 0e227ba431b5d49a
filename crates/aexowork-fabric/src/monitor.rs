// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The inbound monitor: one polling loop per subscribed ledger topic.
//!
//! Each tick reads everything past the topic's high-water mark (ascending,
//! capped at 100), classifies each record — legacy protocol frame, anchor,
//! direct envelope, junk — and dispatches in ledger sequence order. A 429
//! backs off until the next tick; any other error is logged and the loop
//! continues. The monitor never surfaces errors to anyone.

use std::sync::{Arc, Mutex};

use aexowork_ledger::{LedgerClient, TopicMessage};
use aexowork_wire::{AnchorRecord, Envelope};
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    backoff::{CONNECTION_POLL_INTERVAL, INBOUND_POLL_INTERVAL},
    registry::{DispatchContext, SubscriptionRegistry},
    stats::FabricStats,
    tracker::SequenceTracker,
    verify::VerificationPipeline,
};

/// Batch size per poll; keeps one tick bounded even after long downtime.
const FETCH_LIMIT: u32 = 100;

/// Which polling cadence a topic gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    /// Per-agent inbound topic: 10 s minimum tick.
    Inbound,
    /// Legacy connection topics: 15 s minimum tick.
    Connection,
}

impl TopicKind {
    pub fn poll_interval(&self) -> std::time::Duration {
        match self {
            TopicKind::Inbound => INBOUND_POLL_INTERVAL,
            TopicKind::Connection => CONNECTION_POLL_INTERVAL,
        }
    }
}

/// Observable loop state, per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    /// Rate limited on the last tick; the tick cadence is the backoff.
    BackedOff,
}

pub struct InboundMonitor {
    topic_id: String,
    kind: TopicKind,
    ledger: Arc<LedgerClient>,
    tracker: Arc<SequenceTracker>,
    verification: Arc<VerificationPipeline>,
    registry: Arc<SubscriptionRegistry>,
    stats: Arc<FabricStats>,
    state: Mutex<MonitorState>,
}

impl InboundMonitor {
    pub fn new(
        topic_id: impl Into<String>,
        kind: TopicKind,
        ledger: Arc<LedgerClient>,
        tracker: Arc<SequenceTracker>,
        verification: Arc<VerificationPipeline>,
        registry: Arc<SubscriptionRegistry>,
        stats: Arc<FabricStats>,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            kind,
            ledger,
            tracker,
            verification,
            registry,
            stats,
            state: Mutex::new(MonitorState::Idle),
        }
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn state(&self) -> MonitorState {
        *self.state.lock().expect("monitor lock poisoned")
    }

    fn set_state(&self, state: MonitorState) {
        *self.state.lock().expect("monitor lock poisoned") = state;
    }

    /// Run until cancelled. The first tick fires immediately.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.kind.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(topic = self.topic_id, "monitor cancelled");
                        break;
                    }
                    _ = ticker.tick() => self.poll_once().await,
                }
            }
        })
    }

    /// One tick: fetch past the high-water mark and process in order.
    pub async fn poll_once(&self) {
        self.set_state(MonitorState::Polling);
        self.stats.record_poll();
        let since = self.tracker.get(&self.topic_id);

        let batch = match self
            .ledger
            .fetch(&self.topic_id, since, FETCH_LIMIT, true)
            .await
        {
            Ok(batch) => batch,
            Err(aexowork_ledger::LedgerError::Throttled) => {
                // Swallowed: the poll cadence is the backoff.
                trace!(topic = self.topic_id, "poll throttled");
                self.stats.record_throttled_poll();
                self.set_state(MonitorState::BackedOff);
                return;
            }
            Err(error) => {
                debug!(topic = self.topic_id, %error, "poll failed");
                self.set_state(MonitorState::Idle);
                return;
            }
        };

        let mut max_sequence = since;
        for record in batch {
            max_sequence = max_sequence.max(record.sequence);
            self.process_record(record).await;
        }
        if max_sequence > since {
            self.tracker.record(&self.topic_id, max_sequence);
        }
        self.set_state(MonitorState::Idle);
    }

    async fn process_record(&self, record: TopicMessage) {
        let value: Value = match serde_json::from_slice(&record.payload) {
            Ok(value) => value,
            Err(_) => {
                debug!(
                    topic = self.topic_id,
                    sequence = record.sequence,
                    "dropping non-JSON record"
                );
                self.stats.record_dropped_record();
                return;
            }
        };
        if !value.is_object() {
            debug!(
                topic = self.topic_id,
                sequence = record.sequence,
                "dropping non-object record"
            );
            self.stats.record_dropped_record();
            return;
        }

        if is_legacy_protocol_frame(&value) {
            trace!(
                topic = self.topic_id,
                sequence = record.sequence,
                "skipping legacy protocol frame"
            );
            return;
        }

        if AnchorRecord::is_anchor(&value) {
            match serde_json::from_value::<AnchorRecord>(value) {
                Ok(anchor) => {
                    self.verification.on_anchor_observed(&anchor).await;
                }
                Err(error) => {
                    warn!(
                        topic = self.topic_id,
                        sequence = record.sequence,
                        %error,
                        "malformed anchor record"
                    );
                    self.stats.record_dropped_record();
                }
            }
            return;
        }

        self.dispatch_direct(value, &record).await;
    }

    /// Direct-ledger envelope: the whole payload is the message.
    async fn dispatch_direct(&self, value: Value, record: &TopicMessage) {
        let has_subject = value
            .get("subject")
            .and_then(|s| s.as_str())
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !has_subject {
            warn!(
                topic = self.topic_id,
                sequence = record.sequence,
                "dropping record without subject"
            );
            self.stats.record_dropped_record();
            return;
        }

        let envelope: Envelope = match serde_json::from_value(value) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(
                    topic = self.topic_id,
                    sequence = record.sequence,
                    %error,
                    "dropping malformed envelope"
                );
                self.stats.record_dropped_record();
                return;
            }
        };

        let ctx = DispatchContext {
            from_account_id: envelope
                .from_account_id
                .clone()
                .or_else(|| record.payer_account_id.clone()),
            verified: false,
            sequence: Some(record.sequence),
        };
        let subject = envelope.subject.clone();
        self.registry.dispatch(&subject, &envelope, &ctx).await;
        self.stats.record_direct_dispatch();
    }
}

/// HCS-10 connection frames from earlier deployments still circulate on
/// some inbound topics; they are not fabric traffic.
fn is_legacy_protocol_frame(value: &Value) -> bool {
    if value.get("p").and_then(|p| p.as_str()) != Some("hcs-10") {
        return false;
    }
    matches!(
        value.get("op").and_then(|op| op.as_str()),
        Some("connection_request") | Some("connection_created")
    )
}
