//! Subject fan-out for senders without a peer table.
//!
//! The relay is an ordinary fabric agent with one wildcard subscription
//! and a registration table of `(account, subjects)`. Any routable
//! message it receives is forwarded — via the normal send pipeline, so
//! forwarded copies are anchored like any other traffic — to every
//! registered peer interested in that subject, except the original
//! sender. Forwarded copies carry `relayed=true`, `originalFrom`, and
//! `relayedBy`; recipients that also got the message directly can dedup
//! on that flag. The relay is optional: agents that know peer inbound
//! topics never need it.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use aexowork_fabric::{DispatchContext, FabricRuntime};
use aexowork_wire::{subjects, Envelope};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// One row of the relay's routing table.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRegistration {
    pub account_id: String,
    pub subjects: Vec<String>,
}

/// Mutable registry of which accounts want which subjects.
///
/// Seeded from configuration and kept current by
/// `aexowork.agent.registered` envelopes.
#[derive(Debug, Default)]
pub struct RelayTable {
    inner: Mutex<HashMap<String, HashSet<String>>>,
}

impl RelayTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or extend) an account's subject list.
    pub fn register(&self, account_id: &str, subjects: impl IntoIterator<Item = String>) {
        let mut inner = self.inner.lock().expect("relay table poisoned");
        inner
            .entry(account_id.to_string())
            .or_default()
            .extend(subjects);
    }

    /// Accounts whose subject list contains `subject`.
    pub fn subscribers_of(&self, subject: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("relay table poisoned");
        let mut accounts: Vec<String> = inner
            .iter()
            .filter(|(_, subjects)| subjects.contains(subject))
            .map(|(account, _)| account.clone())
            .collect();
        accounts.sort();
        accounts
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("relay table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RelayAgent {
    runtime: Arc<FabricRuntime>,
    table: Arc<RelayTable>,
}

impl RelayAgent {
    pub fn new(runtime: Arc<FabricRuntime>) -> Self {
        Self {
            runtime,
            table: Arc::new(RelayTable::new()),
        }
    }

    pub fn seed(&self, registrations: &[RelayRegistration]) {
        for registration in registrations {
            self.table
                .register(&registration.account_id, registration.subjects.iter().cloned());
        }
    }

    pub fn table(&self) -> &RelayTable {
        &self.table
    }

    /// Install the wildcard handler. Call before `runtime.init()` so no
    /// early traffic slips past.
    pub fn start(&self) {
        let runtime = self.runtime.clone();
        let table = self.table.clone();
        self.runtime.subscribe(
            subjects::WILDCARD,
            Arc::new(move |envelope, ctx| {
                let runtime = runtime.clone();
                let table = table.clone();
                Box::pin(async move { relay_one(&runtime, &table, envelope, ctx).await })
            }),
        );
        info!(
            relay = self.runtime.identity().account_id,
            seeded = self.table.len(),
            "relay agent subscribed"
        );
    }
}

async fn relay_one(
    runtime: &FabricRuntime,
    table: &RelayTable,
    envelope: Envelope,
    ctx: DispatchContext,
) -> anyhow::Result<()> {
    let sender = ctx
        .from_account_id
        .clone()
        .or_else(|| envelope.from_account_id.clone());

    // Registration traffic updates the table instead of being forwarded.
    if envelope.subject == subjects::AGENT_REGISTERED {
        return handle_registration(table, &envelope, sender.as_deref());
    }

    // Never re-forward an already-relayed copy.
    if envelope.extra.get("relayed").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }

    let relay_account = &runtime.identity().account_id;
    let mut forwarded = 0usize;
    for account in table.subscribers_of(&envelope.subject) {
        if Some(account.as_str()) == sender.as_deref() || &account == relay_account {
            continue;
        }
        let mut copy = envelope.clone();
        copy.to = Some(account.clone());
        copy.extra.insert("relayed".into(), json!(true));
        if let Some(from) = &sender {
            copy.extra.insert("originalFrom".into(), json!(from));
        }
        copy.extra.insert("relayedBy".into(), json!(relay_account));

        match runtime.send(&envelope.subject, copy).await {
            Ok(_) => forwarded += 1,
            Err(error) => {
                warn!(
                    subject = envelope.subject,
                    recipient = account,
                    %error,
                    "relay forward failed"
                );
            }
        }
    }
    if forwarded > 0 {
        debug!(subject = envelope.subject, forwarded, "relayed message");
    }
    Ok(())
}

fn handle_registration(
    table: &RelayTable,
    envelope: &Envelope,
    sender: Option<&str>,
) -> anyhow::Result<()> {
    let account = envelope
        .extra
        .get("accountId")
        .and_then(Value::as_str)
        .or(sender);
    let Some(account) = account else {
        warn!("registration without an account id; ignored");
        return Ok(());
    };
    let registered: Vec<String> = envelope
        .extra
        .get("subjects")
        .and_then(Value::as_array)
        .map(|subjects| {
            subjects
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if registered.is_empty() {
        warn!(account, "registration without subjects; ignored");
        return Ok(());
    }
    info!(account, subjects = registered.len(), "agent registered with relay");
    table.register(account, registered);
    Ok(())
}
