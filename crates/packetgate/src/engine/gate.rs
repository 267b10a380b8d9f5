// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport-facing admission of packets.
//!
//! Runs inline on the transport thread and never blocks: filter lookup is a
//! lock-free snapshot load and enqueue is an unbounded channel send.

use super::dispatcher::Dispatcher;
use super::filter::FilterTable;
use super::hub::{ObserverHub, PacketEvent};
use super::metrics::PipelineMetrics;
use crate::envelope::{Direction, Envelope};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Decision returned to the transport for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the original packet to the peer.
    Pass,
    /// Dropped: not dispatched, not forwarded.
    Suppress,
    /// Dispatched locally but not forwarded.
    Consume,
}

impl Verdict {
    /// Whether the transport should keep forwarding the packet.
    #[inline]
    pub fn forward(self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Answer of a [`PacketInterceptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interception {
    Continue,
    Consume,
    Suppress,
}

/// Programmatic hook consulted before the filter table, e.g. to capture chat
/// commands before they reach the server. Interceptors see every packet,
/// including ones a filter rule then suppresses.
pub trait PacketInterceptor: Send + Sync {
    fn intercept(&self, envelope: &Envelope) -> Interception;
}

impl<F> PacketInterceptor for F
where
    F: Fn(&Envelope) -> Interception + Send + Sync,
{
    fn intercept(&self, envelope: &Envelope) -> Interception {
        self(envelope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(u64);

type InterceptorList = Vec<(InterceptorId, Arc<dyn PacketInterceptor>)>;

pub(crate) struct Gatekeeper {
    filters: [FilterTable; 2],
    interceptors: [RwLock<InterceptorList>; 2],
    next_interceptor: AtomicU64,
    dispatcher: Dispatcher,
    hub: Arc<ObserverHub>,
    metrics: Arc<PipelineMetrics>,
}

impl Gatekeeper {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        hub: Arc<ObserverHub>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            filters: [FilterTable::new(), FilterTable::new()],
            interceptors: [RwLock::new(Vec::new()), RwLock::new(Vec::new())],
            next_interceptor: AtomicU64::new(1),
            dispatcher,
            hub,
            metrics,
        }
    }

    #[inline]
    pub(crate) fn filters(&self, direction: Direction) -> &FilterTable {
        &self.filters[direction.index()]
    }

    #[inline]
    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn add_interceptor<I>(&self, direction: Direction, interceptor: I) -> InterceptorId
    where
        I: PacketInterceptor + 'static,
    {
        let id = InterceptorId(self.next_interceptor.fetch_add(1, Ordering::Relaxed));
        self.interceptors[direction.index()]
            .write()
            .push((id, Arc::new(interceptor)));
        id
    }

    pub(crate) fn remove_interceptor(&self, direction: Direction, id: InterceptorId) -> bool {
        let mut list = self.interceptors[direction.index()].write();
        let before = list.len();
        list.retain(|(iid, _)| *iid != id);
        list.len() != before
    }

    /// Intercept, filter, then enqueue one packet.
    ///
    /// Once the dispatcher has stopped every packet passes untouched: no
    /// filter actions, no events, no counters.
    pub(crate) fn admit(&self, direction: Direction, buf: &[u8], length: usize) -> Verdict {
        if !self.dispatcher.is_running() {
            return Verdict::Pass;
        }
        let envelope = match Envelope::copy_from(buf, length) {
            Ok(envelope) => envelope,
            Err(_) => {
                self.metrics.malformed.fetch_add(1, Ordering::Relaxed);
                log::debug!("[GATE] {} empty packet passed through", direction);
                return Verdict::Pass;
            }
        };
        self.metrics.record_seen(direction);

        let interception = self.run_interceptors(direction, &envelope);
        let filtered = self.run_filters(direction, &envelope);
        let suppress = filtered || interception == Interception::Suppress;
        let consume = interception == Interception::Consume;

        if suppress {
            self.metrics.record_filtered(direction);
            log::debug!(
                "[GATE] {} suppress type={:#04x} len={}",
                direction,
                envelope.type_id(),
                envelope.len()
            );
            let panics = self
                .hub
                .publish(&PacketEvent::filtered(direction, envelope));
            PipelineMetrics::add(&self.metrics.callback_panics, panics);
            return Verdict::Suppress;
        }

        if let Err(e) = self.dispatcher.enqueue(direction, envelope) {
            log::debug!("[GATE] {} packet not dispatched: {}", direction, e);
            return Verdict::Pass;
        }

        if consume {
            self.metrics.consumed.fetch_add(1, Ordering::Relaxed);
            Verdict::Consume
        } else {
            Verdict::Pass
        }
    }

    /// Run every matching rule's action; `true` if any rule matched.
    fn run_filters(&self, direction: Direction, envelope: &Envelope) -> bool {
        let matched = self.filters(direction).match_all(envelope);
        for rule in &matched {
            if catch_unwind(AssertUnwindSafe(|| rule.invoke(envelope))).is_err() {
                self.metrics.callback_panics.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "[GATE] filter action panicked (rule={} type={:#04x})",
                    rule.id().as_u64(),
                    envelope.type_id()
                );
            }
        }
        !matched.is_empty()
    }

    /// First `Suppress` wins; otherwise any `Consume` consumes.
    fn run_interceptors(&self, direction: Direction, envelope: &Envelope) -> Interception {
        let interceptors: Vec<_> = {
            let list = self.interceptors[direction.index()].read();
            if list.is_empty() {
                return Interception::Continue;
            }
            list.iter().map(|(_, i)| Arc::clone(i)).collect()
        };

        let mut decision = Interception::Continue;
        for interceptor in interceptors {
            match catch_unwind(AssertUnwindSafe(|| interceptor.intercept(envelope))) {
                Ok(Interception::Suppress) => return Interception::Suppress,
                Ok(Interception::Consume) => decision = Interception::Consume,
                Ok(Interception::Continue) => {}
                Err(_) => {
                    self.metrics.callback_panics.fetch_add(1, Ordering::Relaxed);
                    log::warn!("[GATE] {} interceptor panicked", direction);
                }
            }
        }
        decision
    }
}
