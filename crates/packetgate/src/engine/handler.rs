// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-direction packet handler slots indexed by type id.

use crate::codec::PacketReader;
use crate::envelope::{Direction, Envelope};
use crate::error::PacketError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Number of handler slots per direction (one per byte-valued type id).
pub const HANDLER_SLOTS: usize = 256;

/// Decode/react callback for one packet type.
///
/// # Thread Safety
/// Invoked from the dispatcher worker of the registered direction.
///
/// # Panics
/// A panicking handler is caught by the dispatcher, counted, and the worker
/// moves on to the next packet.
pub trait PacketHandler: Send + Sync {
    fn handle(&self, reader: &mut PacketReader<'_>) -> Result<(), PacketError>;
}

impl<F> PacketHandler for F
where
    F: Fn(&mut PacketReader<'_>) -> Result<(), PacketError> + Send + Sync,
{
    fn handle(&self, reader: &mut PacketReader<'_>) -> Result<(), PacketError> {
        self(reader)
    }
}

/// A registered handler plus its length metadata.
pub struct HandlerEntry {
    type_id: u8,
    fixed_length: usize,
    handler: Arc<dyn PacketHandler>,
}

impl HandlerEntry {
    #[inline]
    pub fn type_id(&self) -> u8 {
        self.type_id
    }

    /// Catalog length; `0` means variable length.
    #[inline]
    pub fn fixed_length(&self) -> usize {
        self.fixed_length
    }

    /// Build the reader and run the handler.
    pub fn invoke(&self, envelope: &Envelope) -> Result<(), PacketError> {
        let mut reader = PacketReader::new(envelope, self.fixed_length > 0);
        self.handler.handle(&mut reader)
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("type_id", &format_args!("{:#04x}", self.type_id))
            .field("fixed_length", &self.fixed_length)
            .finish()
    }
}

type Slots = [Option<Arc<HandlerEntry>>; HANDLER_SLOTS];

/// Two 256-entry slot arrays, one per direction.
///
/// Registration overwrites (last write wins). Lookups clone the slot `Arc`
/// and release the lock before the handler runs.
pub struct HandlerTable {
    directions: [RwLock<Slots>; 2],
}

impl HandlerTable {
    pub fn new() -> Self {
        Self {
            directions: [
                RwLock::new(std::array::from_fn(|_| None)),
                RwLock::new(std::array::from_fn(|_| None)),
            ],
        }
    }

    /// Install a handler, returning the entry it replaced.
    pub fn register<H>(
        &self,
        type_id: u8,
        direction: Direction,
        fixed_length: usize,
        handler: H,
    ) -> Option<Arc<HandlerEntry>>
    where
        H: PacketHandler + 'static,
    {
        let entry = Arc::new(HandlerEntry {
            type_id,
            fixed_length,
            handler: Arc::new(handler),
        });
        let mut slots = self.directions[direction.index()].write();
        let previous = slots.get_mut(usize::from(type_id))?.replace(entry);
        if previous.is_some() {
            log::debug!(
                "[HANDLER] {} {:#04x} replaced existing handler",
                direction,
                type_id
            );
        }
        previous
    }

    pub fn unregister(&self, type_id: u8, direction: Direction) -> bool {
        let mut slots = self.directions[direction.index()].write();
        slots
            .get_mut(usize::from(type_id))
            .and_then(Option::take)
            .is_some()
    }

    #[inline]
    pub fn get(&self, type_id: u8, direction: Direction) -> Option<Arc<HandlerEntry>> {
        let slots = self.directions[direction.index()].read();
        slots.get(usize::from(type_id)).and_then(Clone::clone)
    }

    /// Number of occupied slots for a direction.
    pub fn len(&self, direction: Direction) -> usize {
        self.directions[direction.index()]
            .read()
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }
}

impl Default for HandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerTable")
            .field("incoming", &self.len(Direction::Incoming))
            .field("outgoing", &self.len(Direction::Outgoing))
            .finish()
    }
}
