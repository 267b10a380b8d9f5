// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet envelope and traffic direction.
//!
//! An [`Envelope`] is created once at the transport boundary and then shared
//! (cheap `Arc` clone) by the filter, dispatch and wait stages. It is never
//! mutated after construction; rewriting a packet means building a new one.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Direction of a packet relative to the local client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Server -> client.
    Incoming,
    /// Client -> server.
    Outgoing,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Incoming, Direction::Outgoing];

    /// Stable slot index used by per-direction tables.
    #[inline]
    pub(crate) const fn index(self) -> usize {
        match self {
            Direction::Incoming => 0,
            Direction::Outgoing => 1,
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable packet bytes plus the type id used for table lookups.
///
/// The backing buffer may be larger than the packet (`len <= bytes.len()`);
/// only the first `len` bytes are visible through [`Envelope::as_bytes`].
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    bytes: Arc<[u8]>,
    len: usize,
    type_id: u8,
}

impl Envelope {
    /// Copy `length` bytes out of a transport buffer.
    ///
    /// A length larger than the buffer is clamped to the buffer size. The type
    /// id defaults to the first byte.
    pub fn copy_from(buf: &[u8], length: usize) -> Result<Self, PipelineError> {
        let len = length.min(buf.len());
        if len == 0 {
            return Err(PipelineError::EmptyPacket);
        }
        Ok(Self {
            bytes: Arc::from(&buf[..len]),
            len,
            type_id: buf[0],
        })
    }

    /// Take ownership of a complete packet.
    pub fn from_vec(bytes: Vec<u8>) -> Result<Self, PipelineError> {
        let Some(&type_id) = bytes.first() else {
            return Err(PipelineError::EmptyPacket);
        };
        let len = bytes.len();
        Ok(Self {
            bytes: Arc::from(bytes),
            len,
            type_id,
        })
    }

    /// Wrap an already shared, possibly over-allocated buffer.
    pub fn from_shared(bytes: Arc<[u8]>, len: usize) -> Result<Self, PipelineError> {
        let len = len.min(bytes.len());
        if len == 0 {
            return Err(PipelineError::EmptyPacket);
        }
        let type_id = bytes[0];
        Ok(Self {
            bytes,
            len,
            type_id,
        })
    }

    /// Override the type id derived from the first byte.
    #[must_use]
    pub fn with_type_id(mut self, type_id: u8) -> Self {
        self.type_id = type_id;
        self
    }

    #[inline]
    pub fn type_id(&self) -> u8 {
        self.type_id
    }

    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Owned copy of the visible packet bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl AsRef<[u8]> for Envelope {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = &self.as_bytes()[..self.len.min(16)];
        f.debug_struct("Envelope")
            .field("type_id", &format_args!("{:#04x}", self.type_id))
            .field("len", &self.len)
            .field("head", &format_args!("{:02x?}", head))
            .finish()
    }
}
