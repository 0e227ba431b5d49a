// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variables for {role} agent: {}", keys.join(", "))]
    MissingCredentials { role: String, keys: Vec<String> },

    #[error("reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("parsing {path}: {message}")]
    Parse { path: String, message: String },

    #[error("unknown agent role: {0}")]
    UnknownRole(String),
}
