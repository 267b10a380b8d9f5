// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-aware packet reader handed to handlers.

use crate::envelope::Envelope;
use crate::error::PacketError;

/// Header size of a fixed-length packet: the type id.
pub const FIXED_HEADER_LEN: usize = 1;
/// Header size of a variable-length packet: type id + big-endian u16 length.
pub const VARIABLE_HEADER_LEN: usize = 3;

macro_rules! impl_read_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> Result<$type, PacketError> {
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read_bytes($size)?);
            Ok(<$type>::from_be_bytes(bytes))
        }
    };
}

/// Bounds-checked big-endian cursor over one packet body.
///
/// Starts past the header: one byte for fixed-length packets, three for
/// variable-length ones.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    packet: &'a [u8],
    offset: usize,
    fixed: bool,
}

impl<'a> PacketReader<'a> {
    pub fn new(envelope: &'a Envelope, fixed: bool) -> Self {
        Self::from_bytes(envelope.as_bytes(), fixed)
    }

    pub fn from_bytes(packet: &'a [u8], fixed: bool) -> Self {
        let header = if fixed {
            FIXED_HEADER_LEN
        } else {
            VARIABLE_HEADER_LEN
        };
        Self {
            packet,
            offset: header.min(packet.len()),
            fixed,
        }
    }

    impl_read_be!(read_u16, u16, 2);
    impl_read_be!(read_i16, i16, 2);
    impl_read_be!(read_u32, u32, 4);
    impl_read_be!(read_i32, i32, 4);

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, PacketError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, PacketError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], PacketError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(PacketError::UnexpectedEnd {
                needed: len,
                remaining,
            });
        }
        let slice = &self.packet[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), PacketError> {
        self.read_bytes(len).map(|_| ())
    }

    /// Move to an absolute offset within the packet (header included).
    pub fn seek(&mut self, offset: usize) -> Result<(), PacketError> {
        if offset > self.packet.len() {
            return Err(PacketError::UnexpectedEnd {
                needed: offset,
                remaining: self.packet.len(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.packet.len().saturating_sub(self.offset)
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// The whole packet, header included.
    #[inline]
    pub fn packet(&self) -> &'a [u8] {
        self.packet
    }

    #[inline]
    pub fn type_id(&self) -> u8 {
        self.packet.first().copied().unwrap_or_default()
    }
}
