// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the packet pipeline.

use crate::config::ConfigError;
use thiserror::Error;

/// Errors surfaced by [`crate::Pipeline`] operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatcher worker error: {0}")]
    Worker(#[from] std::io::Error),

    #[error("Pipeline is shut down")]
    ShutDown,

    #[error("No packet sink attached")]
    NoTransport,

    #[error("Empty packet")]
    EmptyPacket,
}

/// Errors raised while decoding or encoding packet bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("Unexpected end of packet: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("Packet length {0} does not fit the length field")]
    LengthOverflow(usize),
}
