//! Degraded-transport behavior: mirror outages, rate limits, and the
//! read-fallback policy, exercised through a full runtime.

use std::sync::Arc;
use std::time::Duration;

use aexowork_config::{AgentCredentials, FabricConfig, PeerConfig};
use aexowork_fabric::FabricRuntime;
use aexowork_ledger::{LedgerClient, MemoryLedger};
use aexowork_wire::{subjects, Signer};
use serde_json::json;

fn credentials(account: &str, inbound: &str) -> AgentCredentials {
    AgentCredentials {
        account_id: account.into(),
        private_key: Signer::random().private_key_hex(),
        inbound_topic: inbound.into(),
        outbound_topic: format!("{inbound}.out"),
        profile_topic: None,
    }
}

fn worker_config() -> FabricConfig {
    let mut config = FabricConfig::default();
    config.peers = vec![PeerConfig {
        name: "worker".into(),
        account_id: "0.0.1002".into(),
        inbound_topic: "0.0.2002".into(),
        public_key: None,
    }];
    config
}

fn direct_envelope(subject: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "subject": subject,
        "fromAccountId": "0.0.1001",
        "type": "JobPost",
    }))
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn monitor_reads_through_the_gateway_when_the_mirror_is_down() {
    // Primary reader permanently fails with a non-429 error; the fallback
    // reader holds the actual topic data.
    let broken_mirror = Arc::new(MemoryLedger::new());
    broken_mirror.set_fail_reads(true);
    let gateway = Arc::new(MemoryLedger::new());
    let ledger = Arc::new(
        LedgerClient::new(broken_mirror, gateway.clone()).with_fallback(gateway.clone()),
    );

    let rt = FabricRuntime::new(
        worker_config(),
        &credentials("0.0.1002", "0.0.2002"),
        ledger,
        None,
    )
    .unwrap();
    let mut rx = rt.subscribe_channel(subjects::JOBS, 8);

    gateway.inject("0.0.2002", &direct_envelope(subjects::JOBS), None);
    rt.init().await.unwrap();

    let (envelope, ctx) = tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("dispatch within budget")
        .expect("channel open");
    assert_eq!(envelope.subject, subjects::JOBS);
    assert!(!ctx.verified);
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn polling_resumes_after_a_rate_limit_window() {
    let memory = Arc::new(MemoryLedger::new());
    let rt = FabricRuntime::new(
        worker_config(),
        &credentials("0.0.1002", "0.0.2002"),
        Arc::new(LedgerClient::from_memory(memory.clone())),
        None,
    )
    .unwrap();
    let mut rx = rt.subscribe_channel(subjects::JOBS, 8);

    memory.set_throttled(true);
    memory.inject("0.0.2002", &direct_envelope(subjects::JOBS), None);
    rt.init().await.unwrap();

    // Several ticks go by rate limited; nothing dispatches, nothing dies.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert!(rx.try_recv().is_err());
    let throttled = rt.stats_snapshot().throttled_polls;
    assert!(throttled >= 3, "ticks kept coming while throttled: {throttled}");

    // The next unthrottled tick catches up from sequence 0.
    memory.set_throttled(false);
    let (envelope, _) = tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("dispatch after recovery")
        .expect("channel open");
    assert_eq!(envelope.message_type.as_deref(), Some("JobPost"));
    rt.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn send_surfaces_ledger_errors_to_the_caller() {
    // Submits fail while the bus is absent: the direct path has nowhere
    // to go and the caller must see it.
    let reader = Arc::new(MemoryLedger::new());
    let ledger = Arc::new(LedgerClient::new(reader, BrokenWriter::shared()));

    let rt = FabricRuntime::new(
        worker_config(),
        &credentials("0.0.1001", "0.0.2001"),
        ledger,
        None,
    )
    .unwrap();

    let err = rt
        .send(
            subjects::OFFERS,
            aexowork_wire::Envelope::new("").with_to("0.0.1002"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        aexowork_fabric::FabricError::LedgerUnavailable(_)
    ));
    assert_eq!(rt.stats_snapshot().send_failures, 1);
}

/// Writer that always fails, standing in for an unreachable gateway.
struct BrokenWriter;

impl BrokenWriter {
    fn shared() -> Arc<dyn aexowork_ledger::TopicWriter> {
        Arc::new(BrokenWriter)
    }
}

#[async_trait::async_trait]
impl aexowork_ledger::TopicWriter for BrokenWriter {
    async fn submit(
        &self,
        _topic_id: &str,
        _payload: &[u8],
    ) -> Result<aexowork_ledger::TxReceipt, aexowork_ledger::LedgerError> {
        Err(aexowork_ledger::LedgerError::Unavailable(
            "gateway unreachable".into(),
        ))
    }
}
