// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The known-peer table: who this process can address directly.
//!
//! Built once from configuration and immutable afterwards — peers joining
//! at runtime go through the relay, not this table.

use std::collections::HashMap;

use aexowork_config::PeerConfig;

/// Routing facts for one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerEntry {
    /// Logical name from configuration, e.g. `"escrow"`.
    pub name: String,
    pub account_id: String,
    pub inbound_topic_id: String,
    /// Compressed SEC1 public key when configured; enables strict
    /// signature checks for this sender.
    pub public_key: Option<String>,
}

#[derive(Debug, Default)]
pub struct KnownPeerTable {
    entries: Vec<PeerEntry>,
    by_account: HashMap<String, usize>,
}

impl KnownPeerTable {
    pub fn from_config(peers: &[PeerConfig]) -> Self {
        let mut table = Self::default();
        for peer in peers {
            let entry = PeerEntry {
                name: peer.name.clone(),
                account_id: peer.account_id.clone(),
                inbound_topic_id: peer.inbound_topic.clone(),
                public_key: peer.public_key.clone(),
            };
            // First entry wins on duplicate account ids.
            if !table.by_account.contains_key(&entry.account_id) {
                table.by_account.insert(entry.account_id.clone(), table.entries.len());
                table.entries.push(entry);
            }
        }
        table
    }

    pub fn lookup_account(&self, account_id: &str) -> Option<&PeerEntry> {
        self.by_account.get(account_id).map(|i| &self.entries[*i])
    }

    /// All peers, in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &PeerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
