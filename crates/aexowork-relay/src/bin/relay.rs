//! `aexowork-relay` — standalone subject fan-out relay.
//!
//! Usage:
//!   aexowork-relay --role marketplace --config .aexowork/fabric.yaml
//!
//! The relay runs under one of the provisioned agent roles (marketplace
//! by default) and needs that role's credential environment variables.
//! Seed registrations come from the config's peer table: every known peer
//! starts registered for the subjects passed via `--seed-subject`.

use std::sync::Arc;

use clap::Parser;

use aexowork_config::{credentials_from_env, AgentRole};
use aexowork_fabric::FabricRuntime;
use aexowork_relay::{RelayAgent, RelayRegistration};

#[derive(Parser, Debug)]
#[command(
    name = "aexowork-relay",
    about = "Subject fan-out relay for AeXoWorK agents"
)]
struct Args {
    /// Agent role whose credentials this relay runs under.
    #[arg(long, default_value = "marketplace")]
    role: String,

    /// Explicit fabric config file (merged over the default layers).
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Subject every configured peer starts registered for. Repeatable.
    /// Later registrations via `aexowork.agent.registered` extend these.
    #[arg(long = "seed-subject")]
    seed_subjects: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().expect("static filter")),
        )
        .init();

    let args = Args::parse();
    let role: AgentRole = args.role.parse()?;
    let config = aexowork_config::load(args.config.as_deref())?;
    let credentials = credentials_from_env(role)?;

    let runtime = Arc::new(FabricRuntime::connect(config, &credentials).await?);
    let relay = RelayAgent::new(runtime.clone());

    if !args.seed_subjects.is_empty() {
        let seed: Vec<RelayRegistration> = runtime
            .config()
            .peers
            .iter()
            .filter(|peer| peer.account_id != runtime.identity().account_id)
            .map(|peer| RelayRegistration {
                account_id: peer.account_id.clone(),
                subjects: args.seed_subjects.clone(),
            })
            .collect();
        relay.seed(&seed);
    }

    relay.start();
    runtime.init().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("relay shutting down");
    runtime.shutdown().await;
    Ok(())
}
