// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet length catalog (`type id -> fixed length`, `0` = variable).

use std::fmt;

/// Length table supplied at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct PacketCatalog {
    lengths: [Option<u16>; 256],
}

impl PacketCatalog {
    /// Catalog with no known packets.
    pub fn empty() -> Self {
        Self {
            lengths: [None; 256],
        }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (u8, u16)>) -> Self {
        let mut catalog = Self::empty();
        for (id, length) in entries {
            catalog.insert(id, length);
        }
        catalog
    }

    /// Set the length of `type_id`, returning the previous value.
    pub fn insert(&mut self, type_id: u8, length: u16) -> Option<u16> {
        self.lengths[usize::from(type_id)].replace(length)
    }

    /// Catalog length, `Some(0)` for variable-length packets.
    #[inline]
    pub fn length(&self, type_id: u8) -> Option<usize> {
        self.lengths[usize::from(type_id)].map(usize::from)
    }

    /// Fixed length, `0` when variable or unknown.
    #[inline]
    pub fn fixed_length(&self, type_id: u8) -> usize {
        self.length(type_id).unwrap_or(0)
    }

    #[inline]
    pub fn is_variable(&self, type_id: u8) -> bool {
        self.lengths[usize::from(type_id)] == Some(0)
    }

    #[inline]
    pub fn contains(&self, type_id: u8) -> bool {
        self.lengths[usize::from(type_id)].is_some()
    }

    /// Number of known packet types.
    pub fn len(&self) -> usize {
        self.lengths.iter().filter(|l| l.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, u16)> + '_ {
        (0..=u8::MAX).filter_map(move |id| self.lengths[usize::from(id)].map(|len| (id, len)))
    }

    /// Check a packet's length against its catalog entry.
    ///
    /// Unknown ids and variable-length packets whose header length field
    /// agrees with the buffer are accepted.
    pub fn is_well_formed(&self, packet: &[u8]) -> bool {
        let Some(&type_id) = packet.first() else {
            return false;
        };
        match self.length(type_id) {
            None => true,
            Some(0) => packet
                .get(1..3)
                .map(|f| usize::from(u16::from_be_bytes([f[0], f[1]])))
                .is_some_and(|declared| declared == packet.len()),
            Some(fixed) => packet.len() == fixed,
        }
    }
}

impl Default for PacketCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PacketCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCatalog")
            .field("known", &self.len())
            .finish()
    }
}
