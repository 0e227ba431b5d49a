// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "aexowork",
    about = "AeXoWorK marketplace agent host",
    version
)]
pub struct Cli {
    /// Agent role to run: client, worker, verification, repute, dispute,
    /// data, escrow, or marketplace. Selects which credential environment
    /// variables are read.
    #[arg(long)]
    pub role: Option<String>,

    /// Explicit fabric config file (merged over the default layers).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log at debug level (default: info; override with AEXOWORK_LOG).
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the merged fabric configuration and exit.
    ShowConfig,
    /// List the agent roles and their credential environment variables.
    Roles,
}
