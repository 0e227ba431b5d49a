// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The send pipeline: recipient resolution plus transport selection.
//!
//! A non-empty `to` routes to exactly that peer or fails — it never
//! widens to a broadcast. An absent `to` broadcasts to every known peer
//! except the sender, and per-recipient failures are counted without
//! aborting the rest. Each delivery goes anchored off-bus when the bus is
//! up, or as a full envelope straight to the recipient's inbound topic
//! when it is not.

use std::sync::Arc;

use aexowork_bus::BusTransport;
use aexowork_ledger::LedgerClient;
use aexowork_wire::{sign_envelope, Envelope, PayloadCodec};
use tracing::{debug, warn};

use crate::{
    anchor::{anchor_send, now_ms, SendReceipt},
    error::FabricError,
    identity::AgentIdentity,
    peers::{KnownPeerTable, PeerEntry},
};

/// How one copy of a message left the process.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryMethod {
    /// Anchored delivery: payload off-bus, proof on-ledger.
    OffChainBus(SendReceipt),
    /// Fallback: the full envelope went to the recipient's inbound topic.
    Direct { transaction_id: String },
}

impl DeliveryMethod {
    pub fn name(&self) -> &'static str {
        match self {
            DeliveryMethod::OffChainBus(_) => "offchain-bus",
            DeliveryMethod::Direct { .. } => "direct",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub recipient_account_id: String,
    pub method: DeliveryMethod,
}

/// Result of one `send` call. `failures` is only ever non-zero for
/// broadcasts; targeted failures surface as errors instead.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub receipts: Vec<DeliveryReceipt>,
    pub failures: usize,
}

pub struct SendPipeline {
    identity: Arc<AgentIdentity>,
    peers: Arc<KnownPeerTable>,
    ledger: Arc<LedgerClient>,
    bus: Option<Arc<dyn BusTransport>>,
    codec: Arc<dyn PayloadCodec>,
    /// One-way switch decided at startup; false means every delivery is
    /// direct-ledger for the process lifetime.
    use_offchain: bool,
}

impl SendPipeline {
    pub fn new(
        identity: Arc<AgentIdentity>,
        peers: Arc<KnownPeerTable>,
        ledger: Arc<LedgerClient>,
        bus: Option<Arc<dyn BusTransport>>,
        codec: Arc<dyn PayloadCodec>,
        use_offchain: bool,
    ) -> Self {
        let use_offchain = use_offchain && bus.is_some();
        Self {
            identity,
            peers,
            ledger,
            bus,
            codec,
            use_offchain,
        }
    }

    /// Send `envelope` under `subject`.
    ///
    /// `envelope.to` (trimmed; empty treated as absent) selects between a
    /// targeted send and the only broadcasting path in the fabric.
    pub async fn send(&self, subject: &str, envelope: Envelope) -> Result<SendOutcome, FabricError> {
        match envelope.recipient().map(str::to_string) {
            Some(account_id) => {
                let peer = self
                    .peers
                    .lookup_account(&account_id)
                    .ok_or(FabricError::UnknownRecipient(account_id))?;
                let receipt = self.deliver(subject, &envelope, peer).await?;
                Ok(SendOutcome {
                    receipts: vec![receipt],
                    failures: 0,
                })
            }
            None => {
                let mut receipts = Vec::new();
                let mut failures = 0;
                for peer in self
                    .peers
                    .iter()
                    .filter(|p| p.account_id != self.identity.account_id)
                {
                    match self.deliver(subject, &envelope, peer).await {
                        Ok(receipt) => receipts.push(receipt),
                        Err(error) => {
                            warn!(
                                subject,
                                recipient = peer.account_id,
                                %error,
                                "broadcast delivery failed"
                            );
                            failures += 1;
                        }
                    }
                }
                Ok(SendOutcome { receipts, failures })
            }
        }
    }

    /// Like [`send`](Self::send), but signs the envelope with the agent
    /// key first. For message types the application treats as
    /// authenticated.
    pub async fn send_signed(
        &self,
        subject: &str,
        mut envelope: Envelope,
    ) -> Result<SendOutcome, FabricError> {
        self.stamp(subject, &mut envelope);
        sign_envelope(&mut envelope, self.identity.signer())?;
        self.send(subject, envelope).await
    }

    fn stamp(&self, subject: &str, envelope: &mut Envelope) {
        envelope.subject = subject.to_string();
        envelope.from_account_id = Some(self.identity.account_id.clone());
        if envelope.timestamp.is_none() {
            envelope.timestamp = Some(now_ms());
        }
    }

    async fn deliver(
        &self,
        subject: &str,
        envelope: &Envelope,
        peer: &PeerEntry,
    ) -> Result<DeliveryReceipt, FabricError> {
        let mut copy = envelope.clone();
        self.stamp(subject, &mut copy);

        let method = match &self.bus {
            Some(bus) if self.use_offchain && bus.is_connected() => {
                let receipt = anchor_send(
                    bus.as_ref(),
                    &self.ledger,
                    self.codec.as_ref(),
                    &self.identity,
                    peer,
                    &copy,
                )
                .await?;
                DeliveryMethod::OffChainBus(receipt)
            }
            _ => {
                let payload = copy.to_canonical_json()?;
                let receipt = self
                    .ledger
                    .submit(&peer.inbound_topic_id, payload.as_bytes())
                    .await?;
                DeliveryMethod::Direct {
                    transaction_id: receipt.transaction_id,
                }
            }
        };

        debug!(
            subject,
            recipient = peer.account_id,
            method = method.name(),
            "message sent"
        );
        Ok(DeliveryReceipt {
            recipient_account_id: peer.account_id.clone(),
            method,
        })
    }
}
