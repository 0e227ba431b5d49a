// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! NATS implementation of the bus transport.
//!
//! Connection policy: a single connect attempt at startup (the runtime
//! decides what a startup failure means — for the fabric it is a one-way
//! switch to direct-ledger mode), then client-managed reconnects capped at
//! [`MAX_RECONNECTS`] so a dead bus does not retry forever in the
//! background.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{BusError, BusTransport, SUBSCRIPTION_BUFFER};

/// Cap on client-managed reconnect attempts after a drop.
const MAX_RECONNECTS: usize = 10;

pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// One connect attempt against `url` (e.g. `nats://127.0.0.1:4222`).
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .max_reconnects(MAX_RECONNECTS)
            .connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        debug!(%url, "bus connected");
        Ok(Self { client })
    }
}

#[async_trait]
impl BusTransport for NatsBus {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), BusError> {
        self.client
            .publish(subject.to_string(), payload.to_vec().into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        // publish() only buffers; flush so fire-and-forget actually leaves
        // the process before the send pipeline reports success.
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn subscribe(&self, subject: &str) -> Result<mpsc::Receiver<Vec<u8>>, BusError> {
        let mut subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let subject = subject.to_string();
        tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                if tx.send(message.payload.to_vec()).await.is_err() {
                    // Receiver dropped: unsubscribe by letting the
                    // subscriber fall out of scope.
                    break;
                }
            }
            debug!(%subject, "bus subscription ended");
        });
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        let state = self.client.connection_state();
        if state != async_nats::connection::State::Connected {
            warn!(?state, "bus not connected");
            return false;
        }
        true
    }
}
