// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Big-endian packet builder used for injected packets.

use crate::error::PacketError;

macro_rules! impl_write_be {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) -> &mut Self {
            self.buffer.extend_from_slice(&value.to_be_bytes());
            self
        }
    };
}

/// Packet builder.
///
/// Fixed-length packets are zero padded to their catalog length by
/// [`PacketWriter::finish`]. Variable-length packets reserve a u16 length
/// field after the type id which is patched on finish.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buffer: Vec<u8>,
    fixed_length: Option<usize>,
}

impl PacketWriter {
    pub fn fixed(type_id: u8, length: usize) -> Self {
        let mut buffer = Vec::with_capacity(length.max(1));
        buffer.push(type_id);
        Self {
            buffer,
            fixed_length: Some(length),
        }
    }

    pub fn variable(type_id: u8) -> Self {
        let mut buffer = Vec::with_capacity(64);
        buffer.extend_from_slice(&[type_id, 0, 0]);
        Self {
            buffer,
            fixed_length: None,
        }
    }

    impl_write_be!(write_u16, u16);
    impl_write_be!(write_i16, i16);
    impl_write_be!(write_u32, u32);
    impl_write_be!(write_i32, i32);

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(data);
        self
    }

    /// Zero pad up to the fixed length. No-op for variable packets.
    pub fn fill(&mut self) -> &mut Self {
        if let Some(length) = self.fixed_length {
            if self.buffer.len() < length {
                self.buffer.resize(length, 0);
            }
        }
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, PacketError> {
        match self.fixed_length {
            Some(length) => {
                if self.buffer.len() > length {
                    return Err(PacketError::LengthOverflow(self.buffer.len()));
                }
                self.fill();
            }
            None => {
                let len = u16::try_from(self.buffer.len())
                    .map_err(|_| PacketError::LengthOverflow(self.buffer.len()))?;
                self.buffer[1..3].copy_from_slice(&len.to_be_bytes());
            }
        }
        Ok(self.buffer)
    }
}
