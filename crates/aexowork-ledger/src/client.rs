// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The facade the fabric talks to.
//!
//! Fetch policy: try the mirror first; on any failure that is not a rate
//! limit, retry once against the gateway reader if one is configured. 429
//! propagates untouched — the caller's poll cadence is the backoff, and a
//! fallback read would just move the hot spot.

use std::sync::Arc;

use tracing::debug;

use crate::{
    error::LedgerError,
    types::{TopicMessage, TopicReader, TopicWriter, TxReceipt},
};

pub struct LedgerClient {
    reader: Arc<dyn TopicReader>,
    fallback: Option<Arc<dyn TopicReader>>,
    writer: Arc<dyn TopicWriter>,
}

impl LedgerClient {
    pub fn new(reader: Arc<dyn TopicReader>, writer: Arc<dyn TopicWriter>) -> Self {
        Self {
            reader,
            fallback: None,
            writer,
        }
    }

    /// Configure the read source used when the primary fails with a
    /// non-429 error.
    pub fn with_fallback(mut self, fallback: Arc<dyn TopicReader>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Wire every seam to one in-memory double (tests, local runs).
    pub fn from_memory(ledger: Arc<crate::memory::MemoryLedger>) -> Self {
        Self::new(ledger.clone(), ledger)
    }

    pub async fn submit(&self, topic_id: &str, payload: &[u8]) -> Result<TxReceipt, LedgerError> {
        self.writer.submit(topic_id, payload).await
    }

    pub async fn fetch(
        &self,
        topic_id: &str,
        since_sequence: u64,
        limit: u32,
        ascending: bool,
    ) -> Result<Vec<TopicMessage>, LedgerError> {
        match self
            .reader
            .fetch(topic_id, since_sequence, limit, ascending)
            .await
        {
            Ok(batch) => Ok(batch),
            Err(LedgerError::Throttled) => Err(LedgerError::Throttled),
            Err(primary) => match &self.fallback {
                Some(fallback) => {
                    debug!(topic = topic_id, error = %primary, "mirror read failed, using gateway fallback");
                    fallback
                        .fetch(topic_id, since_sequence, limit, ascending)
                        .await
                }
                None => Err(primary),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingReader {
        error: LedgerError,
        calls: AtomicU32,
    }

    impl FailingReader {
        fn new(error: LedgerError) -> Self {
            Self {
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TopicReader for FailingReader {
        async fn fetch(
            &self,
            _topic_id: &str,
            _since_sequence: u64,
            _limit: u32,
            _ascending: bool,
        ) -> Result<Vec<TopicMessage>, LedgerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    #[tokio::test]
    async fn non_throttle_failure_falls_back_to_gateway() {
        let memory = Arc::new(MemoryLedger::new());
        memory.inject("t", b"payload", None);

        let primary = Arc::new(FailingReader::new(LedgerError::Unavailable("down".into())));
        let client = LedgerClient::new(primary.clone(), memory.clone())
            .with_fallback(memory.clone());

        let batch = client.fetch("t", 0, 10, true).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn throttle_never_falls_back() {
        let memory = Arc::new(MemoryLedger::new());
        memory.inject("t", b"payload", None);

        let primary = Arc::new(FailingReader::new(LedgerError::Throttled));
        let client = LedgerClient::new(primary, memory.clone()).with_fallback(memory);

        assert!(matches!(
            client.fetch("t", 0, 10, true).await,
            Err(LedgerError::Throttled)
        ));
    }

    #[tokio::test]
    async fn failure_without_fallback_propagates() {
        let memory = Arc::new(MemoryLedger::new());
        let primary = Arc::new(FailingReader::new(LedgerError::Unavailable("down".into())));
        let client = LedgerClient::new(primary, memory);

        assert!(matches!(
            client.fetch("t", 0, 10, true).await,
            Err(LedgerError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn submit_goes_through_the_writer() {
        let memory = Arc::new(MemoryLedger::new());
        let client = LedgerClient::from_memory(memory.clone());
        let receipt = client.submit("0.0.2002", b"anchor").await.unwrap();
        assert_eq!(receipt.transaction_id, "0.0.2002@1");
        assert_eq!(memory.messages("0.0.2002").len(), 1);
    }
}
