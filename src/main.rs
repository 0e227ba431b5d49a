// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Agent host: runs one marketplace agent on the fabric.
//!
//! Picks up the role's credentials from the environment, starts the
//! fabric runtime (bus consumer + inbound monitor + sweeper), and serves
//! the read-only status endpoint agents expose operationally. Business
//! handlers are registered by the agent implementations built on top of
//! this binary; out of the box it logs every dispatch through a wildcard
//! subscription.

mod cli;

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, routing::get, Json, Router};
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aexowork_config::{credentials_from_env, AgentRole, FabricConfig};
use aexowork_fabric::FabricRuntime;
use aexowork_wire::subjects;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::ShowConfig) => {
            let config = aexowork_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            return Ok(());
        }
        Some(Commands::Roles) => {
            print_roles();
            return Ok(());
        }
        None => {}
    }

    let role: AgentRole = cli
        .role
        .as_deref()
        .context("--role is required (see `aexowork roles`)")?
        .parse()?;
    let config = aexowork_config::load(cli.config.as_deref())?;
    // Missing credentials are fatal here, with every absent key named.
    let credentials = credentials_from_env(role)?;

    let runtime = Arc::new(FabricRuntime::connect(config.clone(), &credentials).await?);
    install_trace_handler(&runtime);
    runtime.init().await?;

    let cancel = CancellationToken::new();
    let status_server = spawn_status_server(&config, runtime.clone(), role, cancel.clone()).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!(role = %role, "agent host shutting down");
    cancel.cancel();
    let _ = status_server.await;
    runtime.shutdown().await;
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("AEXOWORK_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_roles() {
    for role in AgentRole::ALL {
        let prefix = role.env_prefix();
        println!(
            "{:<13} {prefix}_ACCOUNT_ID {prefix}_PRIVATE_KEY {prefix}_INBOUND_TOPIC {prefix}_OUTBOUND_TOPIC",
            role.as_str()
        );
    }
}

/// Log every dispatched envelope so an idle host shows traffic.
fn install_trace_handler(runtime: &FabricRuntime) {
    runtime.subscribe(
        subjects::WILDCARD,
        Arc::new(|envelope, ctx| {
            Box::pin(async move {
                tracing::info!(
                    subject = envelope.subject,
                    from = ctx.from_account_id.as_deref().unwrap_or("-"),
                    verified = ctx.verified,
                    message_type = envelope.message_type.as_deref().unwrap_or("-"),
                    "message dispatched"
                );
                Ok(())
            })
        }),
    );
}

// ── Status endpoint ───────────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    runtime: Arc<FabricRuntime>,
    role: AgentRole,
    config: FabricConfig,
}

async fn spawn_status_server(
    config: &FabricConfig,
    runtime: Arc<FabricRuntime>,
    role: AgentRole,
    cancel: CancellationToken,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let state = AppState {
        runtime,
        role,
        config: config.clone(),
    };
    let app = Router::new()
        .route("/status", get(status))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.status_bind)
        .await
        .with_context(|| format!("binding status endpoint on {}", config.status_bind))?;
    tracing::info!(bind = config.status_bind, "status endpoint up");

    Ok(tokio::spawn(async move {
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await });
        if let Err(error) = server.await {
            tracing::warn!(%error, "status server exited with error");
        }
    }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let connection = state.runtime.connection_status();
    let stats = state.runtime.stats_snapshot();
    Json(json!({
        "status": if connection.is_initialized { "ok" } else { "starting" },
        "protocol": "aexowork-fabric/1.0",
        "agentCard": {
            "role": state.role.as_str(),
            "name": state.config.agent.name,
            "description": state.config.agent.description,
            "capabilities": state.config.agent.capabilities,
            "accountId": connection.agent_account_id,
            "publicKey": state.runtime.identity().public_key,
        },
        "connection": connection,
        "stats": {
            "counters": stats,
            "storeEntries": state.runtime.store_entries(),
            "directLedgerMode": state.runtime.is_direct_ledger_mode(),
        },
    }))
}
