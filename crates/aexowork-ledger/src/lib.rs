// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Thin facade over the consensus/topic service.
//!
//! Two read sources sit behind one trait seam: the public mirror node
//! (preferred — cheap, cacheable, eventually consistent) and the consensus
//! gateway (the submit path, doubling as the read fallback when the mirror
//! fails with anything other than a rate limit). [`LedgerClient`] owns the
//! fallback policy so callers just `fetch` and `submit`.
//!
//! Reads are eventually consistent: a submitted anchor may not be visible
//! for several seconds. Correlation logic upstream retries; this crate
//! never does.

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod mirror;
pub mod types;

pub use client::LedgerClient;
pub use error::LedgerError;
pub use gateway::GatewayClient;
pub use memory::MemoryLedger;
pub use mirror::MirrorClient;
pub use types::{TopicMessage, TopicReader, TopicWriter, TxReceipt};
