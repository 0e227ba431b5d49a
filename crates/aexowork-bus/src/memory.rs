// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! In-process bus for tests and single-machine runs.
//!
//! Matches the production transport's semantics: no history, no delivery
//! to subscribers that arrive after a publish, silent drop when nobody
//! listens. A publish log is kept so tests can assert on traffic.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{BusError, BusTransport, SUBSCRIPTION_BUFFER};

#[derive(Default)]
pub struct MemoryBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<Vec<u8>>>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    disconnected: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(subject, payload)` published so far, in order.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().expect("bus lock poisoned").clone()
    }

    /// Publishes to `subject` so far.
    pub fn published_on(&self, subject: &str) -> Vec<Vec<u8>> {
        self.published()
            .into_iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, p)| p)
            .collect()
    }

    /// Simulate a dropped connection: publishes fail and
    /// `is_connected` reports false.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.store(disconnected, Ordering::SeqCst);
    }
}

#[async_trait]
impl BusTransport for MemoryBus {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), BusError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }
        self.published
            .lock()
            .expect("bus lock poisoned")
            .push((subject.to_string(), payload.to_vec()));

        let mut subscribers = self.subscribers.lock().expect("bus lock poisoned");
        if let Some(senders) = subscribers.get_mut(subject) {
            senders.retain(|tx| tx.try_send(payload.to_vec()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<mpsc::Receiver<Vec<u8>>, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.subscribers
            .lock()
            .expect("bus lock poisoned")
            .entry(subject.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}
