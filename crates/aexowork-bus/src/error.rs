// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BusError {
    #[error("bus connect failed: {0}")]
    Connect(String),

    #[error("bus publish failed: {0}")]
    Publish(String),

    #[error("bus subscribe failed: {0}")]
    Subscribe(String),

    #[error("bus disconnected")]
    Disconnected,
}
