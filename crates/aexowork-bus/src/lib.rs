// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The off-bus transport seam.
//!
//! [`BusTransport`] is the single boundary between the fabric and whatever
//! carries off-chain payloads — NATS in production ([`NatsBus`]), an
//! in-process fan-out for tests and single-machine runs ([`MemoryBus`]).
//! Delivery is fire-and-forget: the tamper-evidence and at-most-once
//! properties live in the anchor protocol, not here.

pub mod error;
pub mod memory;
pub mod nats;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use error::BusError;
pub use memory::MemoryBus;
pub use nats::NatsBus;

/// Buffered messages per subscription before the producer side drops.
pub const SUBSCRIPTION_BUFFER: usize = 256;

#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Fire-and-forget publish.
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Subscribe to a subject; messages arrive as raw payload bytes on the
    /// returned channel. Dropping the receiver ends the subscription.
    async fn subscribe(&self, subject: &str) -> Result<mpsc::Receiver<Vec<u8>>, BusError>;

    fn is_connected(&self) -> bool;
}
