// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The hash-anchor protocol.
//!
//! Send side: the payload rides the bus, its proof rides the ledger.
//! Confirm side: given the facts from an off-bus copy, establish that a
//! matching anchor is visible on the recipient's inbound topic. Reads are
//! eventually consistent, so confirmation retries on the fixed
//! [`crate::backoff::ANCHOR_CONFIRM_SCHEDULE`].

use aexowork_bus::BusTransport;
use aexowork_ledger::LedgerClient;
use aexowork_wire::{
    mint_message_id, sha256_hex, subjects::offchain_subject, AnchorRecord, Envelope, OffBusMessage,
    PayloadCodec,
};
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::{
    backoff::{Backoff, ANCHOR_SKEW_TOLERANCE},
    error::FabricError,
    identity::AgentIdentity,
    peers::PeerEntry,
    store::VerificationCache,
};

/// What the sender gets back from an anchored delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    pub message_id: String,
    pub anchor_tx_id: String,
    pub hash: String,
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Deliver `envelope` to one recipient over both rails: off-bus payload to
/// `offchain.<recipient>`, signed anchor to the recipient's inbound topic.
pub async fn anchor_send(
    bus: &dyn BusTransport,
    ledger: &LedgerClient,
    codec: &dyn PayloadCodec,
    identity: &AgentIdentity,
    recipient: &PeerEntry,
    envelope: &Envelope,
) -> Result<SendReceipt, FabricError> {
    let payload_json = envelope.to_canonical_json()?;
    let encrypted = codec.encode(payload_json.as_bytes());
    let hash = sha256_hex(encrypted.as_bytes());
    let timestamp = now_ms();
    let signature = identity.signer().anchor_signature(&hash, timestamp);
    let message_id = mint_message_id();

    let off_bus = OffBusMessage {
        message_id: message_id.clone(),
        encrypted_payload: encrypted,
        hash: hash.clone(),
        timestamp,
        signature: signature.clone(),
        from_account_id: identity.account_id.clone(),
    };
    bus.publish(
        &offchain_subject(&recipient.account_id),
        &serde_json::to_vec(&off_bus)?,
    )
    .await?;

    let anchor = AnchorRecord::new(
        message_id.clone(),
        hash.clone(),
        timestamp,
        signature,
        identity.account_id.clone(),
        Some(recipient.account_id.clone()),
    );
    let receipt = ledger
        .submit(&recipient.inbound_topic_id, &serde_json::to_vec(&anchor)?)
        .await?;

    trace!(
        message_id,
        recipient = recipient.account_id,
        topic = recipient.inbound_topic_id,
        "anchored send complete"
    );
    Ok(SendReceipt {
        message_id,
        anchor_tx_id: receipt.transaction_id,
        hash,
    })
}

/// Establish that an anchor with this `(message_id, hash)` is visible on
/// `inbound_topic_id`, retrying on the fixed schedule.
///
/// Candidates are matched within [`ANCHOR_SKEW_TOLERANCE`] of the current
/// wall clock. A confirmed hash is cached, so the inbound monitor — which
/// by construction just read the anchor off the ledger — confirms for
/// free, and only the bus-first path pays mirror round-trips.
pub async fn confirm_anchor(
    ledger: &LedgerClient,
    cache: &VerificationCache,
    inbound_topic_id: &str,
    message_id: &str,
    hash: &str,
) -> Result<(), FabricError> {
    if cache.contains(hash) {
        trace!(message_id, "anchor confirmation cache hit");
        return Ok(());
    }

    let mut backoff = Backoff::anchor_confirmation();
    loop {
        match ledger.fetch(inbound_topic_id, 0, 100, false).await {
            Ok(batch) => {
                if batch.iter().any(|m| anchor_matches(&m.payload, message_id, hash)) {
                    cache.record(hash);
                    return Ok(());
                }
            }
            Err(error) => {
                debug!(message_id, %error, "anchor confirmation read failed");
            }
        }
        match backoff.next() {
            Some(gap) => sleep(gap).await,
            None => {
                return Err(FabricError::AnchorNotConfirmed {
                    message_id: message_id.to_string(),
                })
            }
        }
    }
}

fn anchor_matches(payload: &[u8], message_id: &str, hash: &str) -> bool {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
        return false;
    };
    if !AnchorRecord::is_anchor(&value) {
        return false;
    }
    let Ok(anchor) = serde_json::from_value::<AnchorRecord>(value) else {
        return false;
    };
    if anchor.message_id != message_id || anchor.hash != hash {
        return false;
    }
    let skew = (now_ms() - anchor.timestamp).unsigned_abs();
    skew <= ANCHOR_SKEW_TOLERANCE.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use aexowork_bus::MemoryBus;
    use aexowork_config::AgentCredentials;
    use aexowork_ledger::MemoryLedger;
    use aexowork_wire::{Base64Codec, Signer, StrictVerifier, SignatureVerifier};
    use serde_json::json;
    use std::sync::Arc;

    fn identity(account: &str, inbound: &str) -> AgentIdentity {
        AgentIdentity::from_credentials(&AgentCredentials {
            account_id: account.into(),
            private_key: Signer::random().private_key_hex(),
            inbound_topic: inbound.into(),
            outbound_topic: "0.0.9000".into(),
            profile_topic: None,
        })
        .unwrap()
    }

    fn worker_peer() -> PeerEntry {
        PeerEntry {
            name: "worker".into(),
            account_id: "0.0.1002".into(),
            inbound_topic_id: "0.0.2002".into(),
            public_key: None,
        }
    }

    #[tokio::test]
    async fn anchor_send_publishes_matching_copies() {
        let bus = MemoryBus::new();
        let memory = Arc::new(MemoryLedger::new());
        let ledger = LedgerClient::from_memory(memory.clone());
        let sender = identity("0.0.1001", "0.0.2001");
        let envelope = Envelope::new("aexowork.offers")
            .with_type("Offer")
            .with_field("offerId", json!("offer-1"));

        let receipt = anchor_send(&bus, &ledger, &Base64Codec, &sender, &worker_peer(), &envelope)
            .await
            .unwrap();

        // Off-bus copy on the recipient's subject.
        let published = bus.published_on("offchain.0.0.1002");
        assert_eq!(published.len(), 1);
        let off_bus: OffBusMessage = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(off_bus.message_id, receipt.message_id);

        // Anchor on the recipient's inbound topic, same correlation facts.
        let on_ledger = memory.messages("0.0.2002");
        assert_eq!(on_ledger.len(), 1);
        let anchor: AnchorRecord = serde_json::from_slice(&on_ledger[0].payload).unwrap();
        assert_eq!(anchor.message_id, off_bus.message_id);
        assert_eq!(anchor.hash, off_bus.hash);
        assert_eq!(anchor.timestamp, off_bus.timestamp);
        assert_eq!(anchor.signature, off_bus.signature);
        assert_eq!(anchor.to_account_id.as_deref(), Some("0.0.1002"));

        // The hash is over the codec output of the canonical envelope.
        assert_eq!(off_bus.hash, sha256_hex(off_bus.encrypted_payload.as_bytes()));
        let expected = Base64Codec.encode(envelope.to_canonical_json().unwrap().as_bytes());
        assert_eq!(off_bus.encrypted_payload, expected);
    }

    #[tokio::test]
    async fn anchor_signature_verifies_against_sender_key() {
        let bus = MemoryBus::new();
        let memory = Arc::new(MemoryLedger::new());
        let ledger = LedgerClient::from_memory(memory.clone());
        let sender = identity("0.0.1001", "0.0.2001");
        let envelope = Envelope::new("aexowork.jobs");

        anchor_send(&bus, &ledger, &Base64Codec, &sender, &worker_peer(), &envelope)
            .await
            .unwrap();

        let anchor: AnchorRecord =
            serde_json::from_slice(&memory.messages("0.0.2002")[0].payload).unwrap();
        let signed = format!("{}{}", anchor.hash, anchor.timestamp);
        assert!(StrictVerifier.verify(signed.as_bytes(), &anchor.signature, &sender.public_key));
    }

    #[tokio::test]
    async fn confirm_finds_a_fresh_anchor_first_try() {
        let memory = Arc::new(MemoryLedger::new());
        let ledger = LedgerClient::from_memory(memory.clone());
        let cache = VerificationCache::default();

        let anchor = AnchorRecord::new("m1", "h1", now_ms(), "sig", "0.0.1001", None);
        memory.inject("0.0.2002", &serde_json::to_vec(&anchor).unwrap(), None);

        confirm_anchor(&ledger, &cache, "0.0.2002", "m1", "h1").await.unwrap();
        assert!(cache.contains("h1"));
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_gives_up_after_the_schedule() {
        let memory = Arc::new(MemoryLedger::new());
        let ledger = LedgerClient::from_memory(memory);
        let cache = VerificationCache::default();

        let started = tokio::time::Instant::now();
        let err = confirm_anchor(&ledger, &cache, "0.0.2002", "m1", "h1").await.unwrap_err();
        assert!(matches!(err, FabricError::AnchorNotConfirmed { message_id } if message_id == "m1"));
        assert_eq!(started.elapsed().as_secs(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_succeeds_when_the_anchor_appears_mid_schedule() {
        let memory = Arc::new(MemoryLedger::new());
        let ledger = LedgerClient::from_memory(memory.clone());
        let cache = VerificationCache::default();

        let injector = {
            let memory = memory.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(4)).await;
                let anchor = AnchorRecord::new("m2", "h2", now_ms(), "sig", "0.0.1001", None);
                memory.inject("0.0.2002", &serde_json::to_vec(&anchor).unwrap(), None);
            })
        };

        confirm_anchor(&ledger, &cache, "0.0.2002", "m2", "h2").await.unwrap();
        injector.await.unwrap();
    }

    #[tokio::test]
    async fn stale_anchor_is_not_a_match() {
        let memory = Arc::new(MemoryLedger::new());
        let six_minutes_ago = now_ms() - 6 * 60 * 1000;
        let anchor = AnchorRecord::new("m3", "h3", six_minutes_ago, "sig", "0.0.1001", None);
        let payload = serde_json::to_vec(&anchor).unwrap();
        memory.inject("t", &payload, None);

        assert!(!anchor_matches(&payload, "m3", "h3"));
        // Cache hit still short-circuits regardless of skew.
        let cache = VerificationCache::default();
        cache.record("h3");
        let ledger = LedgerClient::from_memory(memory);
        confirm_anchor(&ledger, &cache, "t", "m3", "h3").await.unwrap();
    }
}
