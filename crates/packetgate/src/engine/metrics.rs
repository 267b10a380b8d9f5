// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pipeline counters.

use crate::envelope::Direction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters updated by the gatekeeper and the dispatcher workers.
///
/// All fields use relaxed atomics: readers only need monotonic snapshots.
#[derive(Debug)]
pub struct PipelineMetrics {
    pub received: AtomicU64,
    pub sent: AtomicU64,
    pub filtered_incoming: AtomicU64,
    pub filtered_outgoing: AtomicU64,
    /// Outgoing packets taken over by an interceptor (dispatched, not forwarded).
    pub consumed: AtomicU64,
    pub dispatched_incoming: AtomicU64,
    pub dispatched_outgoing: AtomicU64,
    /// Handlers that returned `Err`.
    pub handler_errors: AtomicU64,
    /// Panics caught in handlers, actions and observers.
    pub callback_panics: AtomicU64,
    pub waiters_signaled: AtomicU64,
    pub injected: AtomicU64,
    /// Zero-length packets passed through untouched.
    pub malformed: AtomicU64,
    created: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            filtered_incoming: AtomicU64::new(0),
            filtered_outgoing: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            dispatched_incoming: AtomicU64::new(0),
            dispatched_outgoing: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            callback_panics: AtomicU64::new(0),
            waiters_signaled: AtomicU64::new(0),
            injected: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    #[inline]
    pub(crate) fn record_seen(&self, direction: Direction) {
        match direction {
            Direction::Incoming => self.received.fetch_add(1, Ordering::Relaxed),
            Direction::Outgoing => self.sent.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub(crate) fn record_filtered(&self, direction: Direction) {
        match direction {
            Direction::Incoming => self.filtered_incoming.fetch_add(1, Ordering::Relaxed),
            Direction::Outgoing => self.filtered_outgoing.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub(crate) fn record_dispatched(&self, direction: Direction) {
        match direction {
            Direction::Incoming => self.dispatched_incoming.fetch_add(1, Ordering::Relaxed),
            Direction::Outgoing => self.dispatched_outgoing.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            filtered_incoming: self.filtered_incoming.load(Ordering::Relaxed),
            filtered_outgoing: self.filtered_outgoing.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            dispatched_incoming: self.dispatched_incoming.load(Ordering::Relaxed),
            dispatched_outgoing: self.dispatched_outgoing.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
            waiters_signaled: self.waiters_signaled.load(Ordering::Relaxed),
            injected: self.injected.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub filtered_incoming: u64,
    pub filtered_outgoing: u64,
    pub consumed: u64,
    pub dispatched_incoming: u64,
    pub dispatched_outgoing: u64,
    pub handler_errors: u64,
    pub callback_panics: u64,
    pub waiters_signaled: u64,
    pub injected: u64,
    pub malformed: u64,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Packets accepted at the boundary but not yet dispatched.
    pub fn in_flight(&self) -> u64 {
        let accepted = self.received.saturating_sub(self.filtered_incoming)
            + self.sent.saturating_sub(self.filtered_outgoing);
        accepted.saturating_sub(self.dispatched_incoming + self.dispatched_outgoing)
    }

    pub fn packets_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            (self.received + self.sent) as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let m = PipelineMetrics::new();
        m.record_seen(Direction::Incoming);
        m.record_seen(Direction::Outgoing);
        m.record_seen(Direction::Outgoing);
        m.record_filtered(Direction::Outgoing);
        m.record_dispatched(Direction::Incoming);
        PipelineMetrics::add(&m.waiters_signaled, 3);
        PipelineMetrics::add(&m.callback_panics, 0);

        let snap = m.snapshot();
        assert_eq!(snap.received, 1);
        assert_eq!(snap.sent, 2);
        assert_eq!(snap.filtered_outgoing, 1);
        assert_eq!(snap.waiters_signaled, 3);
        assert_eq!(snap.callback_panics, 0);
        assert_eq!(snap.in_flight(), 1);
    }
}
