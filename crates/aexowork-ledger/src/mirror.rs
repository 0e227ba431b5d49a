// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Mirror-node REST reader.
//!
//! `GET {base}/api/v1/topics/{topic}/messages?sequencenumber=gt:{n}` with
//! `limit` and `order`. Message bodies arrive base64-encoded in the
//! `message` field. 429 maps to [`LedgerError::Throttled`]; every other
//! failure is [`LedgerError::Unavailable`] and lets the facade fall back to
//! the gateway.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use tracing::trace;

use crate::{
    error::LedgerError,
    types::{TopicMessage, TopicReader},
};

/// Per-request budget. The monitor's own cadence retries; no caller-side
/// retry happens on timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

pub struct MirrorClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MirrorPage {
    #[serde(default)]
    messages: Vec<MirrorMessage>,
}

#[derive(Debug, Deserialize)]
struct MirrorMessage {
    sequence_number: u64,
    consensus_timestamp: String,
    #[serde(default)]
    payer_account_id: Option<String>,
    /// Base64 message body.
    message: String,
}

impl MirrorClient {
    /// `base_url` is the network's mirror root, e.g.
    /// `https://testnet.mirrornode.hedera.com`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self, topic_id: &str, since_sequence: u64, limit: u32, ascending: bool) -> String {
        let order = if ascending { "asc" } else { "desc" };
        format!(
            "{}/api/v1/topics/{}/messages?sequencenumber=gt:{}&limit={}&order={}",
            self.base_url, topic_id, since_sequence, limit, order
        )
    }
}

#[async_trait]
impl TopicReader for MirrorClient {
    async fn fetch(
        &self,
        topic_id: &str,
        since_sequence: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<TopicMessage>, LedgerError> {
        if topic_id.trim().is_empty() {
            return Err(LedgerError::InvalidTopic(topic_id.to_string()));
        }
        let url = self.messages_url(topic_id, since_sequence, limit, ascending);
        trace!(%url, "mirror fetch");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::Throttled);
        }
        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "mirror returned {} for {}",
                response.status(),
                topic_id
            )));
        }

        let page: MirrorPage = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        page.messages
            .into_iter()
            .map(|m| {
                let payload = STANDARD
                    .decode(&m.message)
                    .map_err(|e| LedgerError::Decode(format!("message body: {e}")))?;
                Ok(TopicMessage {
                    sequence: m.sequence_number,
                    payer_account_id: m.payer_account_id,
                    consensus_timestamp: m.consensus_timestamp,
                    payload,
                })
            })
            .collect()
    }
}
