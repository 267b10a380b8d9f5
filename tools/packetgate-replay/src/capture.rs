// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Text capture format.
//!
//! One packet per line: `<` for server-to-client, `>` for client-to-server,
//! followed by hex bytes (whitespace between bytes is ignored). `#` starts a
//! comment.
//!
//! ```text
//! # login handshake
//! > 80 00 00 00 01
//! < 73 2a
//! ```

use packetgate::Direction;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Syntax { line: usize, reason: String },
}

/// One captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    pub line: usize,
    pub direction: Direction,
    pub bytes: Vec<u8>,
}

pub fn load(path: &Path) -> Result<Vec<CapturedPacket>, CaptureError> {
    let text = std::fs::read_to_string(path)?;
    parse(&text)
}

pub fn parse(text: &str) -> Result<Vec<CapturedPacket>, CaptureError> {
    let mut packets = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let mut chars = content.chars();
        let direction = match chars.next() {
            Some('<') => Direction::Incoming,
            Some('>') => Direction::Outgoing,
            _ => {
                return Err(CaptureError::Syntax {
                    line,
                    reason: "expected '<' or '>'".into(),
                })
            }
        };

        let bytes = decode_hex(chars.as_str()).map_err(|reason| CaptureError::Syntax {
            line,
            reason,
        })?;
        if bytes.is_empty() {
            return Err(CaptureError::Syntax {
                line,
                reason: "empty packet".into(),
            });
        }
        packets.push(CapturedPacket {
            line,
            direction,
            bytes,
        });
    }
    Ok(packets)
}

fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits".into());
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16);
            let lo = pair[1].to_digit(16);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
                _ => Err(format!("invalid hex byte '{}{}'", pair[0], pair[1])),
            }
        })
        .collect()
}

/// Parse a hex type id, with or without a `0x` prefix (`3C`, `0x3C`).
pub fn parse_type_id(text: &str) -> Result<u8, String> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid type id '{}': {}", text, e))
}
