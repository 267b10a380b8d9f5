// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte-range predicates over packet contents.
//!
//! A [`ByteCondition`] compares `length` bytes at `position` against an
//! expected sequence. Ranges are checked against the live packet length on
//! every evaluation: a range that runs past the end is a plain non-match,
//! which keeps truncated or hostile traffic from ever faulting the pipeline.

use std::fmt;
use std::sync::Arc;

/// Equality test on one byte range of a packet.
#[derive(Clone, PartialEq, Eq)]
pub struct ByteCondition {
    position: usize,
    length: usize,
    expected: Arc<[u8]>,
}

impl ByteCondition {
    /// Match `expected` at `position`; the range length is `expected.len()`.
    pub fn new(position: usize, expected: impl Into<Vec<u8>>) -> Self {
        let expected: Vec<u8> = expected.into();
        Self {
            position,
            length: expected.len(),
            expected: Arc::from(expected),
        }
    }

    /// Match with an explicit range length.
    ///
    /// When `length` differs from `expected.len()` the condition can never
    /// match, mirroring a sequence comparison of unequal lengths.
    pub fn with_length(position: usize, length: usize, expected: impl Into<Vec<u8>>) -> Self {
        let expected: Vec<u8> = expected.into();
        Self {
            position,
            length,
            expected: Arc::from(expected),
        }
    }

    /// Big-endian `u32` at `position` (serials, timestamps).
    pub fn u32_at(position: usize, value: u32) -> Self {
        Self::new(position, value.to_be_bytes())
    }

    /// Big-endian `u16` at `position`.
    pub fn u16_at(position: usize, value: u16) -> Self {
        Self::new(position, value.to_be_bytes())
    }

    /// Single byte at `position`.
    pub fn u8_at(position: usize, value: u8) -> Self {
        Self::new(position, [value])
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn expected(&self) -> &[u8] {
        &self.expected
    }

    /// Evaluate against packet bytes.
    #[inline]
    pub fn matches(&self, packet: &[u8]) -> bool {
        let Some(end) = self.position.checked_add(self.length) else {
            return false;
        };
        match packet.get(self.position..end) {
            Some(range) => range == &self.expected[..],
            None => false,
        }
    }
}

impl fmt::Debug for ByteCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ByteCondition(@{}+{} == {:02x?})",
            self.position, self.length, &self.expected[..]
        )
    }
}

/// All-of evaluation; an empty list matches everything.
///
/// Stops at the first failing condition.
#[inline]
pub fn matches_all(packet: &[u8], conditions: &[ByteCondition]) -> bool {
    conditions.iter().all(|c| c.matches(packet))
}
