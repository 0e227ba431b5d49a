// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! One [`FabricRuntime`] per agent process.
//!
//! Owns every shared structure (registry, store, tracker, peer table) and
//! the background tasks (store sweeper, bus consumer, inbound monitor).
//! Instantiated once and passed explicitly to the code that needs it —
//! there are no globals. `init` is idempotent; `shutdown` cancels the
//! tasks and drops pending verifications.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use aexowork_bus::{BusTransport, NatsBus};
use aexowork_config::{AgentCredentials, FabricConfig};
use aexowork_ledger::{GatewayClient, LedgerClient, MirrorClient, TopicReader, TopicWriter};
use aexowork_wire::{
    default_verifier, subjects::offchain_subject, Base64Codec, Envelope, OffBusMessage,
    PayloadCodec,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backoff::STORE_SWEEP_INTERVAL,
    error::FabricError,
    identity::AgentIdentity,
    monitor::{InboundMonitor, TopicKind},
    peers::KnownPeerTable,
    registry::{DispatchContext, Handler, SubscriptionRegistry},
    send::{SendOutcome, SendPipeline},
    stats::{FabricStats, StatsSnapshot},
    store::{spawn_sweeper, MessageStore, VerificationCache},
    tracker::SequenceTracker,
    verify::VerificationPipeline,
};

/// What `connection_status` reports to the operational surface.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub is_initialized: bool,
    pub agent_account_id: String,
    pub inbound_topic_id: String,
    pub outbound_topic_id: String,
    /// Background connections in service: topic monitors plus the bus
    /// consumer when one is running.
    pub active_connections: usize,
    pub subjects: Vec<String>,
}

pub struct FabricRuntime {
    config: FabricConfig,
    identity: Arc<AgentIdentity>,
    peers: Arc<KnownPeerTable>,
    registry: Arc<SubscriptionRegistry>,
    store: Arc<MessageStore>,
    tracker: Arc<SequenceTracker>,
    ledger: Arc<LedgerClient>,
    bus: Option<Arc<dyn BusTransport>>,
    send_pipeline: SendPipeline,
    verification: Arc<VerificationPipeline>,
    stats: Arc<FabricStats>,
    use_offchain: bool,
    initialized: AtomicBool,
    active_connections: AtomicUsize,
    cancel: CancellationToken,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl FabricRuntime {
    /// Assemble a runtime from explicit parts. Used directly by tests and
    /// local tooling; production code goes through [`connect`](Self::connect).
    pub fn new(
        config: FabricConfig,
        credentials: &AgentCredentials,
        ledger: Arc<LedgerClient>,
        bus: Option<Arc<dyn BusTransport>>,
    ) -> Result<Self, FabricError> {
        let identity = Arc::new(AgentIdentity::from_credentials(credentials)?);
        let peers = Arc::new(KnownPeerTable::from_config(&config.peers));
        let registry = Arc::new(SubscriptionRegistry::new());
        let store = Arc::new(MessageStore::default());
        let cache = Arc::new(VerificationCache::default());
        let tracker = Arc::new(SequenceTracker::new());
        let stats = Arc::new(FabricStats::default());
        let codec: Arc<dyn PayloadCodec> = Arc::new(Base64Codec);
        let use_offchain = config.use_offchain_messaging && bus.is_some();

        let send_pipeline = SendPipeline::new(
            identity.clone(),
            peers.clone(),
            ledger.clone(),
            bus.clone(),
            codec.clone(),
            use_offchain,
        );
        let verification = Arc::new(VerificationPipeline::new(
            identity.clone(),
            peers.clone(),
            store.clone(),
            cache,
            ledger.clone(),
            codec,
            default_verifier(),
            registry.clone(),
            stats.clone(),
        ));

        Ok(Self {
            config,
            identity,
            peers,
            registry,
            store,
            tracker,
            ledger,
            bus,
            send_pipeline,
            verification,
            stats,
            use_offchain,
            initialized: AtomicBool::new(false),
            active_connections: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Build the production wiring: mirror + gateway ledger clients and a
    /// NATS bus. A bus that is unreachable at startup is a one-way switch
    /// to direct-ledger mode, logged exactly once.
    pub async fn connect(
        config: FabricConfig,
        credentials: &AgentCredentials,
    ) -> Result<Self, FabricError> {
        let mirror: Arc<dyn TopicReader> =
            Arc::new(MirrorClient::new(config.ledger_network.mirror_base_url())?);
        let gateway = Arc::new(GatewayClient::new(&config.gateway_url)?);
        let ledger = Arc::new(
            LedgerClient::new(mirror, gateway.clone() as Arc<dyn TopicWriter>)
                .with_fallback(gateway as Arc<dyn TopicReader>),
        );

        let bus: Option<Arc<dyn BusTransport>> = if config.use_offchain_messaging {
            match NatsBus::connect(&config.bus_url).await {
                Ok(bus) => Some(Arc::new(bus)),
                Err(error) => {
                    warn!(
                        url = config.bus_url,
                        %error,
                        "bus unreachable; falling back to direct-ledger mode for this process"
                    );
                    None
                }
            }
        } else {
            None
        };

        Self::new(config, credentials, ledger, bus)
    }

    /// Start the background tasks. Idempotent: a second call on the same
    /// runtime is a no-op (the identity is fixed at construction, so
    /// re-init with a different identity cannot arise here).
    pub async fn init(&self) -> Result<(), FabricError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("fabric runtime already initialized");
            return Ok(());
        }

        let mut started = vec![spawn_sweeper(
            self.store.clone(),
            STORE_SWEEP_INTERVAL,
            self.cancel.clone(),
        )];

        if let Some(bus) = &self.bus {
            let subject = offchain_subject(&self.identity.account_id);
            let receiver = match bus.subscribe(&subject).await {
                Ok(receiver) => receiver,
                Err(error) => {
                    for task in started {
                        task.abort();
                    }
                    self.initialized.store(false, Ordering::SeqCst);
                    return Err(error.into());
                }
            };
            started.push(self.spawn_bus_consumer(receiver));
            self.active_connections.fetch_add(1, Ordering::SeqCst);
        }

        let monitor = Arc::new(InboundMonitor::new(
            self.identity.inbound_topic_id.clone(),
            TopicKind::Inbound,
            self.ledger.clone(),
            self.tracker.clone(),
            self.verification.clone(),
            self.registry.clone(),
            self.stats.clone(),
        ));
        started.push(monitor.spawn(self.cancel.clone()));
        self.active_connections.fetch_add(1, Ordering::SeqCst);

        self.tasks
            .lock()
            .expect("task list poisoned")
            .extend(started);

        info!(
            account = self.identity.account_id,
            inbound_topic = self.identity.inbound_topic_id,
            offchain = self.use_offchain,
            peers = self.peers.len(),
            "fabric runtime started"
        );
        Ok(())
    }

    /// Consume `offchain.<account>`: buffer each payload and verify it
    /// concurrently — one slow anchor confirmation must not hold up the
    /// bus channel.
    fn spawn_bus_consumer(
        &self,
        mut receiver: tokio::sync::mpsc::Receiver<Vec<u8>>,
    ) -> tokio::task::JoinHandle<()> {
        let verification = self.verification.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = receiver.recv() => {
                        let Some(bytes) = received else { break };
                        let message: OffBusMessage = match serde_json::from_slice(&bytes) {
                            Ok(message) => message,
                            Err(error) => {
                                debug!(%error, "dropping malformed off-bus payload");
                                continue;
                            }
                        };
                        let verification = verification.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                _ = verification.on_off_bus(message) => {}
                            }
                        });
                    }
                }
            }
            debug!("bus consumer stopped");
        })
    }

    /// Monitor an additional ledger topic — a legacy connection topic or
    /// another agent's outbound topic — at the cadence its kind allows.
    pub fn watch_topic(&self, topic_id: &str, kind: TopicKind) -> Result<(), FabricError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(FabricError::NotInitialized);
        }
        let monitor = Arc::new(InboundMonitor::new(
            topic_id,
            kind,
            self.ledger.clone(),
            self.tracker.clone(),
            self.verification.clone(),
            self.registry.clone(),
            self.stats.clone(),
        ));
        self.tasks
            .lock()
            .expect("task list poisoned")
            .push(monitor.spawn(self.cancel.clone()));
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    // ── Application surface ──────────────────────────────────────────────────

    pub fn subscribe(&self, subject: &str, handler: Handler) {
        self.registry.subscribe(subject, handler);
    }

    pub fn subscribe_channel(
        &self,
        subject: &str,
        capacity: usize,
    ) -> tokio::sync::mpsc::Receiver<(Envelope, DispatchContext)> {
        self.registry.subscribe_channel(subject, capacity)
    }

    pub async fn send(&self, subject: &str, envelope: Envelope) -> Result<SendOutcome, FabricError> {
        let outcome = self
            .send_pipeline
            .send(subject, envelope)
            .await
            .inspect_err(|_| self.stats.record_send_failures(1))?;
        self.stats.record_sent(outcome.receipts.len() as u64);
        self.stats.record_send_failures(outcome.failures as u64);
        Ok(outcome)
    }

    pub async fn send_signed(
        &self,
        subject: &str,
        envelope: Envelope,
    ) -> Result<SendOutcome, FabricError> {
        let outcome = self
            .send_pipeline
            .send_signed(subject, envelope)
            .await
            .inspect_err(|_| self.stats.record_send_failures(1))?;
        self.stats.record_sent(outcome.receipts.len() as u64);
        self.stats.record_send_failures(outcome.failures as u64);
        Ok(outcome)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            is_initialized: self.initialized.load(Ordering::SeqCst),
            agent_account_id: self.identity.account_id.clone(),
            inbound_topic_id: self.identity.inbound_topic_id.clone(),
            outbound_topic_id: self.identity.outbound_topic_id.clone(),
            active_connections: self.active_connections.load(Ordering::SeqCst),
            subjects: self.registry.subjects(),
        }
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Entries currently buffered awaiting verification.
    pub fn store_entries(&self) -> usize {
        self.store.len()
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    /// True when every delivery goes straight to inbound topics.
    pub fn is_direct_ledger_mode(&self) -> bool {
        !self.use_offchain
    }

    /// Cancel the background tasks, drop pending verifications, and clear
    /// the registry.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock().expect("task list poisoned"));
        for task in tasks {
            let _ = task.await;
        }
        self.registry.clear();
        self.active_connections.store(0, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        info!(account = self.identity.account_id, "fabric runtime stopped");
    }
}
