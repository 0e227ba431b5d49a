//! Relay fan-out through the real fabric path.
//!
//! A client that only knows the relay sends a targeted message to it; the
//! relay's wildcard handler forwards the verified copy to every registered
//! peer through the normal send pipeline, so the worker receives an
//! anchored, verified envelope tagged as relayed.

use std::sync::Arc;
use std::time::Duration;

use aexowork_bus::{BusTransport, MemoryBus};
use aexowork_config::{AgentCredentials, FabricConfig, PeerConfig};
use aexowork_fabric::FabricRuntime;
use aexowork_ledger::{LedgerClient, MemoryLedger};
use aexowork_relay::{RelayAgent, RelayRegistration};
use aexowork_wire::{subjects, Envelope, Signer};
use serde_json::json;

fn runtime(
    account: &str,
    inbound: &str,
    ledger: &Arc<MemoryLedger>,
    bus: &Arc<MemoryBus>,
) -> Arc<FabricRuntime> {
    let mut config = FabricConfig::default();
    config.peers = vec![
        PeerConfig {
            name: "relay".into(),
            account_id: "0.0.1000".into(),
            inbound_topic: "0.0.2000".into(),
            public_key: None,
        },
        PeerConfig {
            name: "client".into(),
            account_id: "0.0.1001".into(),
            inbound_topic: "0.0.2001".into(),
            public_key: None,
        },
        PeerConfig {
            name: "worker".into(),
            account_id: "0.0.1002".into(),
            inbound_topic: "0.0.2002".into(),
            public_key: None,
        },
    ];
    Arc::new(
        FabricRuntime::new(
            config,
            &AgentCredentials {
                account_id: account.into(),
                private_key: Signer::random().private_key_hex(),
                inbound_topic: inbound.into(),
                outbound_topic: format!("{inbound}.out"),
                profile_topic: None,
            },
            Arc::new(LedgerClient::from_memory(ledger.clone())),
            Some(bus.clone() as Arc<dyn BusTransport>),
        )
        .unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn relay_fans_out_to_registered_workers() {
    let ledger = Arc::new(MemoryLedger::new());
    let bus = Arc::new(MemoryBus::new());

    let relay_rt = runtime("0.0.1000", "0.0.2000", &ledger, &bus);
    let client = runtime("0.0.1001", "0.0.2001", &ledger, &bus);
    let worker = runtime("0.0.1002", "0.0.2002", &ledger, &bus);

    let relay = RelayAgent::new(relay_rt.clone());
    relay.seed(&[RelayRegistration {
        account_id: "0.0.1002".into(),
        subjects: vec![subjects::JOBS.into()],
    }]);
    relay.start();

    let mut worker_rx = worker.subscribe_channel(subjects::JOBS, 8);
    let mut client_rx = client.subscribe_channel(subjects::JOBS, 8);
    for rt in [&relay_rt, &client, &worker] {
        rt.init().await.unwrap();
    }

    // The client only talks to the relay.
    client
        .send(
            subjects::JOBS,
            Envelope::new("")
                .with_to("0.0.1000")
                .with_type("JobPost")
                .with_field("jobId", json!("job-42")),
        )
        .await
        .unwrap();

    let (forwarded, ctx) = tokio::time::timeout(Duration::from_secs(60), worker_rx.recv())
        .await
        .expect("worker receives the relayed copy")
        .expect("channel open");

    assert!(ctx.verified, "forwarded copies are anchored like any traffic");
    assert_eq!(ctx.from_account_id.as_deref(), Some("0.0.1000"), "relay is the sender");
    assert_eq!(forwarded.extra["jobId"], json!("job-42"));
    assert_eq!(forwarded.extra["relayed"], json!(true));
    assert_eq!(forwarded.extra["originalFrom"], json!("0.0.1001"));
    assert_eq!(forwarded.extra["relayedBy"], json!("0.0.1000"));

    // The original sender does not get its own message back.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(client_rx.try_recv().is_err());

    for rt in [relay_rt, client, worker] {
        rt.shutdown().await;
    }
}
