// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Consensus-gateway client.
//!
//! The gateway is the node-side companion service that accepts topic
//! submissions (mirror nodes are read-only) and serves reads straight from
//! consensus, which makes it the fetch fallback when the mirror is down.
//! Payloads travel base64-encoded in both directions.
//!
//! Swapping this for a native ledger SDK later only touches this file: the
//! rest of the fabric sees the [`TopicReader`]/[`TopicWriter`] seams.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;
use tracing::trace;

use crate::{
    error::LedgerError,
    types::{TopicMessage, TopicReader, TopicWriter, TxReceipt},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayMessage {
    sequence: u64,
    #[serde(default)]
    payer_account_id: Option<String>,
    consensus_timestamp: String,
    /// Base64 message body.
    payload: String,
}

impl GatewayClient {
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

    fn topic_url(&self, topic_id: &str) -> String {
        format!("{}/api/v1/topics/{}/messages", self.base_url, topic_id)
    }
}

#[async_trait]
impl TopicWriter for GatewayClient {
    async fn submit(&self, topic_id: &str, payload: &[u8]) -> Result<TxReceipt, LedgerError> {
        if topic_id.trim().is_empty() {
            return Err(LedgerError::InvalidTopic(topic_id.to_string()));
        }
        let url = self.topic_url(topic_id);
        trace!(%url, bytes = payload.len(), "gateway submit");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "payload": STANDARD.encode(payload) }))
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::Throttled);
        }
        if !response.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "gateway returned {} for {}",
                response.status(),
                topic_id
            )));
        }

        let body: SubmitResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;
        Ok(TxReceipt {
            transaction_id: body.transaction_id,
            topic_id: topic_id.to_string(),
        })
    }
}

#[async_trait]
impl TopicReader for GatewayClient {
    async fn fetch(
        &self,
        topic_id: &str,
        since_sequence: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<TopicMessage>, LedgerError> {
        let order = if ascending { "asc" } else { "desc" };
        let url = format!(
            "{}?since={}&limit={}&order={}",
            self.topic_url(topic_id),
            since_sequence,
            limit,
            order
        );
        trace!(%url, "gateway fetch");

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
                "gateway returned {} for {}",
                response.status(),
                topic_id
            )));
        }

        let body: Vec<GatewayMessage> = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        body.into_iter()
            .map(|m| {
                let payload = STANDARD
                    .decode(&m.payload)
                    .map_err(|e| LedgerError::Decode(format!("message body: {e}")))?;
                Ok(TopicMessage {
                    sequence: m.sequence,
                    payer_account_id: m.payer_account_id,
                    consensus_timestamp: m.consensus_timestamp,
                    payload,
                })
            })
            .collect()
    }
}
