// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The verification pipeline: correlate, check, confirm, dispatch.
//!
//! Two triggers feed it — an anchor observed by the inbound monitor, and
//! an off-bus payload arriving from the bus consumer. Both converge on the
//! same law: the store entry's recomputed hash must equal the anchor hash,
//! and the anchor must be visible on-chain, before any handler runs. The
//! store entry is removed atomically right before dispatch; whichever
//! trigger loses that race abandons silently, which is the fabric's
//! at-most-once-dispatch property.

use std::sync::Arc;

use aexowork_ledger::LedgerClient;
use aexowork_wire::{sha256_hex, AnchorRecord, Envelope, OffBusMessage, PayloadCodec, SignatureVerifier};
use tracing::{error, trace, warn};

use crate::{
    anchor::confirm_anchor,
    error::FabricError,
    identity::AgentIdentity,
    peers::KnownPeerTable,
    registry::{DispatchContext, SubscriptionRegistry},
    stats::FabricStats,
    store::{MessageStore, VerificationCache},
};

pub struct VerificationPipeline {
    identity: Arc<AgentIdentity>,
    peers: Arc<KnownPeerTable>,
    store: Arc<MessageStore>,
    cache: Arc<VerificationCache>,
    ledger: Arc<LedgerClient>,
    codec: Arc<dyn PayloadCodec>,
    verifier: Arc<dyn SignatureVerifier>,
    registry: Arc<SubscriptionRegistry>,
    stats: Arc<FabricStats>,
    /// Message ids already dispatched. A bus redelivery or a duplicate
    /// anchor for one of these is dropped before it can re-enter the
    /// store — at most one dispatch per message id, ever.
    dispatched: VerificationCache,
}

impl VerificationPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<AgentIdentity>,
        peers: Arc<KnownPeerTable>,
        store: Arc<MessageStore>,
        cache: Arc<VerificationCache>,
        ledger: Arc<LedgerClient>,
        codec: Arc<dyn PayloadCodec>,
        verifier: Arc<dyn SignatureVerifier>,
        registry: Arc<SubscriptionRegistry>,
        stats: Arc<FabricStats>,
    ) -> Self {
        Self {
            identity,
            peers,
            store,
            cache,
            ledger,
            codec,
            verifier,
            registry,
            stats,
            dispatched: VerificationCache::default(),
        }
    }

    /// Run the full receive side for one anchor. Returns `true` when a
    /// dispatch happened, `false` when the anchor was not ours (or lost
    /// the dispatch race) and was abandoned silently.
    pub async fn on_anchor(&self, anchor: &AnchorRecord) -> Result<bool, FabricError> {
        if self.dispatched.contains(&anchor.message_id) {
            trace!(message_id = anchor.message_id, "duplicate of a dispatched message");
            return Ok(false);
        }

        // Correlate with the off-bus copy; it may lag the ledger.
        let Some(off_bus) = self.store.wait_for(&anchor.message_id).await else {
            trace!(
                message_id = anchor.message_id,
                "no off-bus entry; anchor is for another process"
            );
            return Ok(false);
        };

        // The verification law, first half: hash equality.
        let recomputed = sha256_hex(off_bus.encrypted_payload.as_bytes());
        if recomputed != anchor.hash {
            self.stats.record_verify_failure();
            return Err(FabricError::Integrity {
                message_id: anchor.message_id.clone(),
            });
        }

        // Sender signature over hash || timestamp, when we know the key.
        if let Some(public_key) = self
            .peers
            .lookup_account(&anchor.from_account_id)
            .and_then(|p| p.public_key.as_deref())
        {
            let signed = format!("{}{}", anchor.hash, anchor.timestamp);
            if !self.verifier.verify(signed.as_bytes(), &anchor.signature, public_key) {
                self.stats.record_verify_failure();
                return Err(FabricError::Integrity {
                    message_id: anchor.message_id.clone(),
                });
            }
        }

        // Second half: the anchor must be on-chain.
        confirm_anchor(
            &self.ledger,
            &self.cache,
            &self.identity.inbound_topic_id,
            &anchor.message_id,
            &anchor.hash,
        )
        .await
        .inspect_err(|_| self.stats.record_verify_failure())?;

        let plaintext = self.codec.decode(&off_bus.encrypted_payload)?;
        let envelope: Envelope = serde_json::from_slice(&plaintext)?;

        // Single-winner removal gates dispatch: a duplicate anchor or the
        // concurrent bus-side attempt finds nothing and abandons.
        if self.store.remove(&anchor.message_id).is_none() {
            trace!(message_id = anchor.message_id, "already dispatched elsewhere");
            return Ok(false);
        }
        self.dispatched.record(&anchor.message_id);

        let ctx = DispatchContext {
            from_account_id: Some(anchor.from_account_id.clone()),
            verified: true,
            sequence: None,
        };
        let subject = envelope.subject.clone();
        self.registry.dispatch(&subject, &envelope, &ctx).await;
        self.stats.record_verified_dispatch();
        Ok(true)
    }

    /// Bus-side trigger: buffer the payload, then attempt the same
    /// verification immediately instead of waiting for the next poll.
    pub async fn on_off_bus(&self, message: OffBusMessage) {
        if self.dispatched.contains(&message.message_id) {
            trace!(
                message_id = message.message_id,
                "bus redelivery of a dispatched message"
            );
            return;
        }
        let candidate = AnchorRecord::new(
            message.message_id.clone(),
            message.hash.clone(),
            message.timestamp,
            message.signature.clone(),
            message.from_account_id.clone(),
            Some(self.identity.account_id.clone()),
        );
        self.store.insert(message);

        match self.on_anchor(&candidate).await {
            Ok(_) => {}
            Err(FabricError::AnchorNotConfirmed { message_id }) => {
                // Kept in the store: a later anchor observation may still
                // verify it before eviction.
                warn!(message_id, "anchor not confirmed; message not dispatched");
            }
            Err(e) => {
                error!(message_id = candidate.message_id, error = %e, "verification failed");
            }
        }
    }

    /// Monitor-side trigger wrapper: errors never propagate into the poll
    /// loop.
    pub async fn on_anchor_observed(&self, anchor: &AnchorRecord) -> bool {
        // Seen on-ledger just now, so confirmation is already established.
        self.cache.record(&anchor.hash);
        match self.on_anchor(anchor).await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                match &e {
                    FabricError::Integrity { message_id } => {
                        error!(message_id, "payload hash does not match anchor")
                    }
                    FabricError::AnchorNotConfirmed { message_id } => {
                        warn!(message_id, "anchor not confirmed; message not dispatched")
                    }
                    other => warn!(error = %other, "verification failed"),
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::now_ms;
    use aexowork_config::{AgentCredentials, PeerConfig};
    use aexowork_ledger::MemoryLedger;
    use aexowork_wire::{Base64Codec, PermissiveVerifier, Signer, StrictVerifier};
    use serde_json::json;

    struct Fixture {
        pipeline: VerificationPipeline,
        memory: Arc<MemoryLedger>,
        store: Arc<MessageStore>,
        registry: Arc<SubscriptionRegistry>,
        sender: Signer,
    }

    fn fixture(verifier: Arc<dyn SignatureVerifier>, sender_key_known: bool) -> Fixture {
        let sender = Signer::random();
        let identity = Arc::new(
            AgentIdentity::from_credentials(&AgentCredentials {
                account_id: "0.0.1002".into(),
                private_key: Signer::random().private_key_hex(),
                inbound_topic: "0.0.2002".into(),
                outbound_topic: "0.0.3002".into(),
                profile_topic: None,
            })
            .unwrap(),
        );
        let peers = Arc::new(KnownPeerTable::from_config(&[PeerConfig {
            name: "client".into(),
            account_id: "0.0.1001".into(),
            inbound_topic: "0.0.2001".into(),
            public_key: sender_key_known.then(|| sender.public_key_hex()),
        }]));
        let memory = Arc::new(MemoryLedger::new());
        let store = Arc::new(MessageStore::default());
        let registry = Arc::new(SubscriptionRegistry::new());
        let pipeline = VerificationPipeline::new(
            identity,
            peers,
            store.clone(),
            Arc::new(VerificationCache::default()),
            Arc::new(LedgerClient::from_memory(memory.clone())),
            Arc::new(Base64Codec),
            verifier,
            registry.clone(),
            Arc::new(FabricStats::default()),
        );
        Fixture {
            pipeline,
            memory,
            store,
            registry,
            sender,
        }
    }

    /// Build matching (off-bus, anchor) records for an envelope from
    /// 0.0.1001, and put the anchor on the recipient's inbound topic.
    fn seed_message(f: &Fixture, subject: &str) -> (OffBusMessage, AnchorRecord) {
        let envelope = Envelope::new(subject)
            .with_type("Offer")
            .with_field("offerId", json!("offer-1"));
        let encrypted = Base64Codec.encode(envelope.to_canonical_json().unwrap().as_bytes());
        let hash = sha256_hex(encrypted.as_bytes());
        let timestamp = now_ms();
        let signature = f.sender.anchor_signature(&hash, timestamp);
        let off_bus = OffBusMessage {
            message_id: aexowork_wire::mint_message_id(),
            encrypted_payload: encrypted,
            hash: hash.clone(),
            timestamp,
            signature: signature.clone(),
            from_account_id: "0.0.1001".into(),
        };
        let anchor = AnchorRecord::new(
            off_bus.message_id.clone(),
            hash,
            timestamp,
            signature,
            "0.0.1001",
            Some("0.0.1002".into()),
        );
        f.memory
            .inject("0.0.2002", &serde_json::to_vec(&anchor).unwrap(), None);
        (off_bus, anchor)
    }

    #[tokio::test]
    async fn verified_dispatch_carries_metadata() {
        let f = fixture(Arc::new(PermissiveVerifier), false);
        let mut rx = f.registry.subscribe_channel("aexowork.offers", 8);
        let (off_bus, anchor) = seed_message(&f, "aexowork.offers");

        f.store.insert(off_bus);
        assert!(f.pipeline.on_anchor(&anchor).await.unwrap());

        let (envelope, ctx) = rx.recv().await.unwrap();
        assert_eq!(envelope.subject, "aexowork.offers");
        assert!(ctx.verified);
        assert_eq!(ctx.from_account_id.as_deref(), Some("0.0.1001"));
        assert!(f.store.is_empty(), "entry removed after dispatch");
    }

    #[tokio::test]
    async fn missing_store_entry_abandons_silently() {
        let f = fixture(Arc::new(PermissiveVerifier), false);
        let (_off_bus, anchor) = seed_message(&f, "aexowork.offers");
        // Entry never stored: anchor belongs to another process.
        tokio::time::pause();
        assert!(!f.pipeline.on_anchor(&anchor).await.unwrap());
    }

    #[tokio::test]
    async fn hash_mismatch_is_an_integrity_error() {
        let f = fixture(Arc::new(PermissiveVerifier), false);
        let (mut off_bus, anchor) = seed_message(&f, "aexowork.offers");
        off_bus.encrypted_payload = Base64Codec.encode(b"{\"tampered\":true}");
        f.store.insert(off_bus);

        let err = f.pipeline.on_anchor(&anchor).await.unwrap_err();
        assert!(matches!(err, FabricError::Integrity { .. }));
        assert_eq!(f.store.len(), 1, "entry retained until eviction");
    }

    #[tokio::test]
    async fn strict_verifier_rejects_forged_anchor_signature() {
        let f = fixture(Arc::new(StrictVerifier), true);
        let (off_bus, mut anchor) = seed_message(&f, "aexowork.offers");
        anchor.signature = Signer::random().anchor_signature(&anchor.hash, anchor.timestamp);
        f.store.insert(off_bus);

        assert!(matches!(
            f.pipeline.on_anchor(&anchor).await.unwrap_err(),
            FabricError::Integrity { .. }
        ));
    }

    #[tokio::test]
    async fn strict_verifier_accepts_genuine_anchor_signature() {
        let f = fixture(Arc::new(StrictVerifier), true);
        let (off_bus, anchor) = seed_message(&f, "aexowork.offers");
        f.store.insert(off_bus);
        assert!(f.pipeline.on_anchor(&anchor).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_anchor_does_not_dispatch_twice() {
        let f = fixture(Arc::new(PermissiveVerifier), false);
        let mut rx = f.registry.subscribe_channel("aexowork.offers", 8);
        let (off_bus, anchor) = seed_message(&f, "aexowork.offers");

        f.store.insert(off_bus);
        assert!(f.pipeline.on_anchor(&anchor).await.unwrap());
        tokio::time::pause();
        assert!(!f.pipeline.on_anchor(&anchor).await.unwrap());

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err(), "exactly one dispatch");
    }

    #[tokio::test(start_paused = true)]
    async fn off_bus_without_anchor_is_not_dispatched() {
        // Seed against a throwaway fixture so the anchor never reaches the
        // ledger this pipeline confirms against.
        let seeder = fixture(Arc::new(PermissiveVerifier), false);
        let (off_bus, _anchor) = seed_message(&seeder, "aexowork.offers");

        let f = fixture(Arc::new(PermissiveVerifier), false);
        let mut rx = f.registry.subscribe_channel("aexowork.offers", 8);
        f.pipeline.on_off_bus(off_bus).await;

        assert_eq!(f.store.len(), 1, "retained for a later anchor");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bus_redelivery_after_dispatch_is_dropped() {
        let f = fixture(Arc::new(PermissiveVerifier), false);
        let mut rx = f.registry.subscribe_channel("aexowork.offers", 8);
        let (off_bus, _anchor) = seed_message(&f, "aexowork.offers");

        f.pipeline.on_off_bus(off_bus.clone()).await;
        assert!(rx.recv().await.is_some());

        // The bus delivers the same message again.
        f.pipeline.on_off_bus(off_bus).await;
        assert!(f.store.is_empty(), "replay never re-enters the store");
        assert!(rx.try_recv().is_err(), "at most one dispatch per message id");
    }

    #[tokio::test]
    async fn off_bus_with_anchor_dispatches_via_bus_path() {
        let f = fixture(Arc::new(PermissiveVerifier), false);
        let mut rx = f.registry.subscribe_channel("aexowork.offers", 8);
        let (off_bus, _anchor) = seed_message(&f, "aexowork.offers");

        f.pipeline.on_off_bus(off_bus).await;
        let (_, ctx) = rx.recv().await.unwrap();
        assert!(ctx.verified);
    }
}
