// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-fire packet slot used to park a waiting caller.
//!
//! # Architecture
//! - Mutex-guarded slot holding the captured packet (set == `Some`)
//! - Condvar to park the caller until fired, closed, or deadline
//! - Atomic flag mirror for lock-free `is_set` peeks
//!
//! Firing an already-set slot replaces the captured bytes but never wakes a
//! second caller: the slot is consumed by exactly one successful wait.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Slot {
    packet: Option<Vec<u8>>,
    closed: bool,
}

/// Result of parking on a [`WaitSignal`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Wake {
    Fired(Vec<u8>),
    Closed,
    TimedOut,
}

#[derive(Debug, Default)]
pub(crate) struct WaitSignal {
    slot: Mutex<Slot>,
    condvar: Condvar,
    ready: AtomicBool,
}

impl WaitSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `packet` and wake one parked caller.
    ///
    /// Returns `false` when the slot was already set (idempotent re-fire).
    pub(crate) fn fire(&self, packet: Vec<u8>) -> bool {
        let mut slot = self.slot.lock();
        let fresh = slot.packet.replace(packet).is_none();
        self.ready.store(true, Ordering::Release);
        if fresh {
            self.condvar.notify_one();
        }
        fresh
    }

    /// Permanently wake every parked caller with [`Wake::Closed`].
    pub(crate) fn close(&self) {
        let mut slot = self.slot.lock();
        slot.closed = true;
        self.condvar.notify_all();
    }

    #[inline]
    pub(crate) fn is_set(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Peek at the captured packet without consuming it.
    pub(crate) fn peek(&self) -> Option<Vec<u8>> {
        self.slot.lock().packet.clone()
    }

    /// Park until fired, closed, or `timeout` elapses.
    ///
    /// A pending packet wins over a close: bytes captured before a drain are
    /// still delivered.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Wake {
        let deadline = Instant::now().checked_add(timeout);
        let mut slot = self.slot.lock();
        loop {
            if let Some(packet) = slot.packet.take() {
                self.ready.store(false, Ordering::Release);
                return Wake::Fired(packet);
            }
            if slot.closed {
                return Wake::Closed;
            }
            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut slot, deadline).timed_out() {
                        // Fired exactly at the deadline still counts.
                        if let Some(packet) = slot.packet.take() {
                            self.ready.store(false, Ordering::Release);
                            return Wake::Fired(packet);
                        }
                        if slot.closed {
                            return Wake::Closed;
                        }
                        return Wake::TimedOut;
                    }
                }
                // Overflowing deadline: wait without bound.
                None => self.condvar.wait(&mut slot),
            }
        }
    }
}
