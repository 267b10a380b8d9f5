// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observer hub broadcasting pipeline notifications.
//!
//! `publish()` clones the observer list under a read lock and calls each
//! observer after releasing it, so an observer may subscribe or unsubscribe
//! from inside its own callback.

use crate::envelope::{Direction, Envelope};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Notifications raised by the pipeline.
#[derive(Debug, Clone)]
pub enum PacketEvent {
    /// Incoming packet dequeued by the incoming worker.
    Received(Envelope),
    /// Outgoing packet dequeued by the outgoing worker.
    Sent(Envelope),
    /// Incoming packet suppressed at the gatekeeper.
    FilteredIncoming(Envelope),
    /// Outgoing packet suppressed at the gatekeeper.
    FilteredOutgoing(Envelope),
    /// Packet injected toward the server.
    InjectedToServer(Envelope),
    /// Packet injected toward the client.
    InjectedToClient(Envelope),
    Connected,
    Disconnected,
}

impl PacketEvent {
    pub(crate) fn observed(direction: Direction, envelope: Envelope) -> Self {
        match direction {
            Direction::Incoming => PacketEvent::Received(envelope),
            Direction::Outgoing => PacketEvent::Sent(envelope),
        }
    }

    pub(crate) fn filtered(direction: Direction, envelope: Envelope) -> Self {
        match direction {
            Direction::Incoming => PacketEvent::FilteredIncoming(envelope),
            Direction::Outgoing => PacketEvent::FilteredOutgoing(envelope),
        }
    }

    /// Packet carried by the event, if any.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            PacketEvent::Received(e)
            | PacketEvent::Sent(e)
            | PacketEvent::FilteredIncoming(e)
            | PacketEvent::FilteredOutgoing(e)
            | PacketEvent::InjectedToServer(e)
            | PacketEvent::InjectedToClient(e) => Some(e),
            PacketEvent::Connected | PacketEvent::Disconnected => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PacketEvent::Received(_) => "received",
            PacketEvent::Sent(_) => "sent",
            PacketEvent::FilteredIncoming(_) => "filtered-incoming",
            PacketEvent::FilteredOutgoing(_) => "filtered-outgoing",
            PacketEvent::InjectedToServer(_) => "injected-to-server",
            PacketEvent::InjectedToClient(_) => "injected-to-client",
            PacketEvent::Connected => "connected",
            PacketEvent::Disconnected => "disconnected",
        }
    }
}

/// Receives pipeline notifications.
///
/// # Thread Safety
/// `Received`/`Sent` are raised on the dispatcher workers, filtered events on
/// the transport thread, lifecycle and injection events on the caller's
/// thread. Implementations must be `Send + Sync`.
pub trait PacketObserver: Send + Sync {
    fn on_event(&self, event: &PacketEvent);
}

impl<F> PacketObserver for F
where
    F: Fn(&PacketEvent) + Send + Sync,
{
    fn on_event(&self, event: &PacketEvent) {
        self(event)
    }
}

/// Subscription handle returned by [`ObserverHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct ObserverHub {
    observers: RwLock<Vec<(ObserverId, Arc<dyn PacketObserver>)>>,
    next_id: AtomicU64,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<O>(&self, observer: O) -> ObserverId
    where
        O: PacketObserver + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver `event` to every observer; returns the number that panicked.
    pub fn publish(&self, event: &PacketEvent) -> usize {
        let observers: Vec<_> = {
            let guard = self.observers.read();
            if guard.is_empty() {
                return 0;
            }
            guard.iter().map(|(_, o)| Arc::clone(o)).collect()
        };

        let mut panics = 0;
        for observer in observers {
            let result = catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
            if result.is_err() {
                panics += 1;
                log::warn!("[HUB] observer panicked on '{}' event", event.name());
            }
        }
        panics
    }
}
