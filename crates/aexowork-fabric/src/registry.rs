// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-process subject subscriptions.
//!
//! Handlers are plain async functions over the envelope type. Within one
//! dispatch, subject handlers run sequentially in registration order,
//! then wildcard handlers — so handler ordering is observable. A failing
//! handler is logged and never affects its siblings or the caller.

use std::{collections::HashMap, sync::RwLock};

use aexowork_wire::{subjects::WILDCARD, Envelope};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::FabricError;

/// What a handler learns about a delivery beyond the envelope itself.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub from_account_id: Option<String>,
    /// True only when both the off-bus payload and its on-chain anchor
    /// were observed and matched.
    pub verified: bool,
    /// Ledger sequence for direct-ledger deliveries.
    pub sequence: Option<u64>,
}

/// A subscription callback. Cloned per dispatch; must be cheap to clone.
pub type Handler = Arc<dyn Fn(Envelope, DispatchContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `subject`. Duplicates are allowed — dedup is
    /// caller discipline. Use [`aexowork_wire::subjects::WILDCARD`] to see
    /// every dispatch.
    pub fn subscribe(&self, subject: &str, handler: Handler) {
        self.handlers
            .write()
            .expect("registry lock poisoned")
            .entry(subject.to_string())
            .or_default()
            .push(handler);
        debug!(subject, "handler registered");
    }

    /// Channel adapter: returns a bounded receiver fed by a plain handler.
    /// When the receiver lags or is dropped, deliveries to it are dropped
    /// with a warning; other handlers are unaffected.
    pub fn subscribe_channel(
        &self,
        subject: &str,
        capacity: usize,
    ) -> mpsc::Receiver<(Envelope, DispatchContext)> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribe(
            subject,
            Arc::new(move |envelope, ctx| {
                let tx = tx.clone();
                Box::pin(async move {
                    tx.try_send((envelope, ctx))
                        .map_err(|e| anyhow::anyhow!("subscription channel: {e}"))
                })
            }),
        );
        rx
    }

    /// Dispatch one envelope: subject handlers first, then wildcard, each
    /// awaited in turn. Returns the number of handlers invoked.
    pub async fn dispatch(&self, subject: &str, envelope: &Envelope, ctx: &DispatchContext) -> usize {
        let selected: Vec<Handler> = {
            let handlers = self.handlers.read().expect("registry lock poisoned");
            let mut selected = handlers.get(subject).cloned().unwrap_or_default();
            if subject != WILDCARD {
                if let Some(wildcard) = handlers.get(WILDCARD) {
                    selected.extend(wildcard.iter().cloned());
                }
            }
            selected
        };

        for handler in &selected {
            if let Err(source) = handler(envelope.clone(), ctx.clone()).await {
                let error = FabricError::Handler {
                    subject: subject.to_string(),
                    message: source.to_string(),
                };
                warn!(%error, "handler failed");
            }
        }
        selected.len()
    }

    /// Subjects with at least one handler, wildcard included.
    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .handlers
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        subjects.sort();
        subjects
    }

    /// Teardown: drop every handler.
    pub fn clear(&self) {
        self.handlers.write().expect("registry lock poisoned").clear();
    }
}
