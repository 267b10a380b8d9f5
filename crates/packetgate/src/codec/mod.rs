// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet body encoding helpers (big-endian, length-aware).

mod reader;
mod writer;

pub use reader::{PacketReader, FIXED_HEADER_LEN, VARIABLE_HEADER_LEN};
pub use writer::PacketWriter;
