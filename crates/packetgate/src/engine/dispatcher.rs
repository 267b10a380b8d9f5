// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-direction dispatch workers.
//!
//! Each direction owns one unbounded FIFO channel drained by exactly one
//! worker thread, so packets of a direction are processed in arrival order.
//! Per packet the worker runs, in order:
//!
//! 1. observed notification (`Received` / `Sent`)
//! 2. handler table lookup and invoke
//! 3. wait registry matching pass
//!
//! A slow handler delays later packets of its direction only; the queue
//! simply grows. Shutdown closes the channels and joins the workers after
//! they drained everything already enqueued.

use super::handler::HandlerTable;
use super::hub::{ObserverHub, PacketEvent};
use super::metrics::PipelineMetrics;
use super::wait::WaitRegistry;
use crate::envelope::{Direction, Envelope};
use crate::error::PipelineError;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Shared state the workers dispatch into.
pub(crate) struct DispatchContext {
    pub(crate) handlers: Arc<HandlerTable>,
    pub(crate) waiters: Arc<WaitRegistry>,
    pub(crate) hub: Arc<ObserverHub>,
    pub(crate) metrics: Arc<PipelineMetrics>,
}

/// Outcome of dispatching one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchStatus {
    Handled,
    Unhandled,
    HandlerFailed,
}

pub(crate) struct Dispatcher {
    queues: [RwLock<Option<Sender<Envelope>>>; 2],
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn both workers.
    pub(crate) fn start(ctx: Arc<DispatchContext>) -> io::Result<Self> {
        let (in_tx, in_rx) = channel::unbounded();
        let (out_tx, out_rx) = channel::unbounded();

        let dispatcher = Self {
            queues: [RwLock::new(Some(in_tx)), RwLock::new(Some(out_tx))],
            workers: Mutex::new(Vec::with_capacity(2)),
        };

        for (direction, rx) in [(Direction::Incoming, in_rx), (Direction::Outgoing, out_rx)] {
            let ctx = Arc::clone(&ctx);
            let handle = thread::Builder::new()
                .name(format!("packetgate-{}", direction))
                .spawn(move || worker_loop(direction, rx, ctx))?;
            dispatcher.workers.lock().push(handle);
        }

        Ok(dispatcher)
    }

    /// Queue a packet for its direction's worker.
    #[inline]
    pub(crate) fn enqueue(
        &self,
        direction: Direction,
        envelope: Envelope,
    ) -> Result<(), PipelineError> {
        let queue = self.queues[direction.index()].read();
        match queue.as_ref() {
            Some(tx) => tx.send(envelope).map_err(|_| PipelineError::ShutDown),
            None => Err(PipelineError::ShutDown),
        }
    }

    /// Packets waiting in a direction's queue.
    pub(crate) fn pending(&self, direction: Direction) -> usize {
        self.queues[direction.index()]
            .read()
            .as_ref()
            .map_or(0, Sender::len)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.queues.iter().any(|q| q.read().is_some())
    }

    /// Close both queues and join the workers once they drained.
    ///
    /// Safe to call repeatedly. Called from a worker thread, that worker is
    /// detached instead of joined.
    pub(crate) fn stop(&self) -> io::Result<()> {
        for queue in &self.queues {
            queue.write().take();
        }

        let handles = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        let mut result = Ok(());
        for handle in handles {
            if handle.thread().id() == current {
                log::warn!("[DISPATCH] stop() called from a dispatch worker; not joining it");
                continue;
            }
            if handle.join().is_err() {
                result = Err(io::Error::other("dispatch worker panicked"));
            }
        }
        result
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn worker_loop(direction: Direction, rx: Receiver<Envelope>, ctx: Arc<DispatchContext>) {
    log::debug!("[DISPATCH] {} worker started", direction);
    // Ends once every sender is dropped and the queue is empty.
    for envelope in rx.iter() {
        dispatch_one(direction, &envelope, &ctx);
    }
    log::debug!("[DISPATCH] {} worker stopped", direction);
}

/// Notify, handle, then wake waiters for one packet.
pub(crate) fn dispatch_one(
    direction: Direction,
    envelope: &Envelope,
    ctx: &DispatchContext,
) -> DispatchStatus {
    let metrics = &ctx.metrics;

    let panics = ctx
        .hub
        .publish(&PacketEvent::observed(direction, envelope.clone()));
    PipelineMetrics::add(&metrics.callback_panics, panics);

    let status = match ctx.handlers.get(envelope.type_id(), direction) {
        Some(entry) => match catch_unwind(AssertUnwindSafe(|| entry.invoke(envelope))) {
            Ok(Ok(())) => DispatchStatus::Handled,
            Ok(Err(e)) => {
                metrics.handler_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "[DISPATCH] {} handler {:#04x} failed: {}",
                    direction,
                    envelope.type_id(),
                    e
                );
                DispatchStatus::HandlerFailed
            }
            Err(_) => {
                metrics.callback_panics.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "[DISPATCH] {} handler {:#04x} panicked",
                    direction,
                    envelope.type_id()
                );
                DispatchStatus::HandlerFailed
            }
        },
        None => DispatchStatus::Unhandled,
    };

    let outcome = ctx.waiters.on_packet(envelope, direction);
    PipelineMetrics::add(&metrics.waiters_signaled, outcome.matched);
    PipelineMetrics::add(&metrics.callback_panics, outcome.action_panics);

    metrics.record_dispatched(direction);
    log::trace!(
        "[DISPATCH] {} type={:#04x} len={} status={:?} waiters={}",
        direction,
        envelope.type_id(),
        envelope.len(),
        status,
        outcome.matched
    );
    status
}
