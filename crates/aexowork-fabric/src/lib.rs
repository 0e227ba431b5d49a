// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The hybrid off-chain/on-chain messaging core.
//!
//! A message travels two paths at once: its payload rides the low-latency
//! bus to `offchain.<recipient>`, while a small signed anchor (message id,
//! payload hash, timestamp) is appended to the recipient's inbound ledger
//! topic. The recipient's [`monitor::InboundMonitor`] observes the anchor,
//! the [`verify::VerificationPipeline`] correlates it with the buffered
//! bus copy, recomputes the hash, confirms the anchor on-chain, and only
//! then dispatches to handlers — tamper-evident, ordered per topic, and
//! at-most-once.
//!
//! [`runtime::FabricRuntime`] wires all of it together for one agent
//! process; there is no global state.

pub mod anchor;
pub mod backoff;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod peers;
pub mod registry;
pub mod runtime;
pub mod send;
pub mod stats;
pub mod store;
pub mod tracker;
pub mod verify;

pub use anchor::SendReceipt;
pub use error::FabricError;
pub use identity::AgentIdentity;
pub use monitor::{InboundMonitor, MonitorState, TopicKind};
pub use peers::{KnownPeerTable, PeerEntry};
pub use registry::{DispatchContext, Handler, SubscriptionRegistry};
pub use runtime::{ConnectionStatus, FabricRuntime};
pub use send::{DeliveryMethod, DeliveryReceipt, SendOutcome, SendPipeline};
pub use stats::{FabricStats, StatsSnapshot};
pub use store::{MessageStore, VerificationCache};
pub use tracker::SequenceTracker;
pub use verify::VerificationPipeline;
