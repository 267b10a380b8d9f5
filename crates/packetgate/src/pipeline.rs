// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The explicitly constructed packet pipeline.
//!
//! A [`Pipeline`] owns the gatekeeper, both dispatcher workers and the
//! handler/wait/observer tables. The transport bridge calls
//! [`Pipeline::on_receive`] and [`Pipeline::on_send`]; scripting and UI code
//! use the consumer API (filters, handlers, waiters, observers, injection).
//!
//! Lifecycle is explicit: [`Pipeline::builder`] ... [`PipelineBuilder::build`]
//! starts the workers, [`Pipeline::shutdown`] (or drop) drains and joins them.

use crate::catalog::PacketCatalog;
use crate::config::PipelineConfig;
use crate::engine::dispatcher::{DispatchContext, Dispatcher};
use crate::engine::gate::Gatekeeper;
use crate::engine::{
    FilterRule, FilterTable, HandlerEntry, HandlerTable, InterceptorId, MetricsSnapshot,
    ObserverHub, ObserverId, PacketEvent, PacketHandler, PacketInterceptor, PacketObserver,
    PipelineMetrics, RuleId, Verdict, WaitOutcome, WaitPredicate, WaitRegistry, Waiter,
};
use crate::envelope::{Direction, Envelope};
use crate::error::PipelineError;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Outlet toward the real peers, supplied by the transport bridge.
///
/// Used for packets the pipeline itself originates (injection). Injected
/// packets bypass filters and dispatch.
pub trait PacketSink: Send + Sync {
    fn send_to_server(&self, packet: &[u8]);
    fn send_to_client(&self, packet: &[u8]);
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    name: Option<String>,
    catalog: PacketCatalog,
    filters: Vec<(Direction, FilterRule)>,
    sink: Option<Arc<dyn PacketSink>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used in log lines.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Packet length catalog.
    pub fn catalog(mut self, catalog: PacketCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Apply a loaded configuration: name, catalog and static filters.
    pub fn config(mut self, config: &PipelineConfig) -> Self {
        self.name = Some(config.pipeline.name.clone());
        self.catalog = config.catalog();
        self.filters
            .extend(config.filters.iter().map(|f| (f.direction, f.to_rule())));
        self
    }

    /// Pre-install a suppression rule.
    pub fn filter(mut self, direction: Direction, rule: FilterRule) -> Self {
        self.filters.push((direction, rule));
        self
    }

    pub fn sink<S>(mut self, sink: S) -> Self
    where
        S: PacketSink + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn shared_sink(mut self, sink: Arc<dyn PacketSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start the dispatcher workers.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let ctx = Arc::new(DispatchContext {
            handlers: Arc::new(HandlerTable::new()),
            waiters: Arc::new(WaitRegistry::new()),
            hub: Arc::new(ObserverHub::new()),
            metrics: Arc::new(PipelineMetrics::new()),
        });
        let dispatcher = Dispatcher::start(Arc::clone(&ctx))?;
        let gate = Gatekeeper::new(dispatcher, Arc::clone(&ctx.hub), Arc::clone(&ctx.metrics));

        for (direction, rule) in self.filters {
            gate.filters(direction).add(rule);
        }

        let name = self.name.unwrap_or_else(|| "packetgate".to_string());
        log::debug!(
            "[PIPELINE] '{}' started (catalog={} packets, filters in={} out={})",
            name,
            self.catalog.len(),
            gate.filters(Direction::Incoming).len(),
            gate.filters(Direction::Outgoing).len()
        );

        Ok(Pipeline {
            name,
            catalog: self.catalog,
            gate,
            ctx,
            sink: RwLock::new(self.sink),
            connected: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// Packet pipeline handle. Share it behind an `Arc`.
pub struct Pipeline {
    name: String,
    catalog: PacketCatalog,
    gate: Gatekeeper,
    ctx: Arc<DispatchContext>,
    sink: RwLock<Option<Arc<dyn PacketSink>>>,
    connected: AtomicBool,
    shut_down: AtomicBool,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Pipeline with an empty catalog and no sink.
    pub fn start() -> Result<Self, PipelineError> {
        PipelineBuilder::new().build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &PacketCatalog {
        &self.catalog
    }

    // ------------------------------------------------------------------
    // Transport boundary
    // ------------------------------------------------------------------

    /// Packet arriving from the server. Never blocks.
    #[inline]
    pub fn on_receive(&self, bytes: &[u8], length: usize) -> Verdict {
        self.gate.admit(Direction::Incoming, bytes, length)
    }

    /// Packet leaving toward the server. Never blocks.
    #[inline]
    pub fn on_send(&self, bytes: &[u8], length: usize) -> Verdict {
        self.gate.admit(Direction::Outgoing, bytes, length)
    }

    pub fn on_connected(&self) {
        self.connected.store(true, Ordering::Release);
        log::debug!("[PIPELINE] '{}' connected", self.name);
        self.publish(&PacketEvent::Connected);
    }

    /// Mark disconnected and release every blocked waiter with
    /// [`WaitOutcome::Closed`]. Returns the number of waiters drained.
    pub fn on_disconnected(&self) -> usize {
        self.connected.store(false, Ordering::Release);
        let drained = self.ctx.waiters.drain();
        log::debug!(
            "[PIPELINE] '{}' disconnected ({} waiters drained)",
            self.name,
            drained
        );
        self.publish(&PacketEvent::Disconnected);
        drained
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Filters and interceptors
    // ------------------------------------------------------------------

    pub fn add_filter(&self, direction: Direction, rule: FilterRule) -> RuleId {
        self.gate.filters(direction).add(rule)
    }

    pub fn remove_filter(&self, direction: Direction, id: RuleId) -> bool {
        self.gate.filters(direction).remove(id)
    }

    pub fn clear_filters(&self, direction: Direction) -> usize {
        self.gate.filters(direction).clear()
    }

    pub fn filters(&self, direction: Direction) -> &FilterTable {
        self.gate.filters(direction)
    }

    pub fn add_interceptor<I>(&self, direction: Direction, interceptor: I) -> InterceptorId
    where
        I: PacketInterceptor + 'static,
    {
        self.gate.add_interceptor(direction, interceptor)
    }

    pub fn remove_interceptor(&self, direction: Direction, id: InterceptorId) -> bool {
        self.gate.remove_interceptor(direction, id)
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// Register a handler; the reader layout comes from the catalog.
    pub fn register_handler<H>(
        &self,
        type_id: u8,
        direction: Direction,
        handler: H,
    ) -> Option<Arc<HandlerEntry>>
    where
        H: PacketHandler + 'static,
    {
        let fixed_length = self.catalog.fixed_length(type_id);
        self.ctx
            .handlers
            .register(type_id, direction, fixed_length, handler)
    }

    /// Register a handler with an explicit fixed length (`0` = variable).
    pub fn register_handler_with_length<H>(
        &self,
        type_id: u8,
        direction: Direction,
        fixed_length: usize,
        handler: H,
    ) -> Option<Arc<HandlerEntry>>
    where
        H: PacketHandler + 'static,
    {
        self.ctx
            .handlers
            .register(type_id, direction, fixed_length, handler)
    }

    pub fn unregister_handler(&self, type_id: u8, direction: Direction) -> bool {
        self.ctx.handlers.unregister(type_id, direction)
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.ctx.handlers
    }

    // ------------------------------------------------------------------
    // Waiters
    // ------------------------------------------------------------------

    pub fn register_waiter(
        &self,
        direction: Direction,
        predicate: WaitPredicate,
        auto_remove: bool,
    ) -> Result<Waiter, PipelineError> {
        self.ensure_running()?;
        Ok(self.ctx.waiters.register(direction, predicate, auto_remove))
    }

    pub fn register_waiter_with_action<F>(
        &self,
        direction: Direction,
        predicate: WaitPredicate,
        auto_remove: bool,
        action: F,
    ) -> Result<Waiter, PipelineError>
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.ensure_running()?;
        Ok(self
            .ctx
            .waiters
            .register_with_action(direction, predicate, auto_remove, action))
    }

    /// Block until `waiter` matches, the connection drops, or `timeout`.
    ///
    /// The waiter stays registered on timeout; pair with [`Pipeline::cancel`].
    pub fn wait(&self, waiter: &Waiter, timeout: Duration) -> WaitOutcome {
        waiter.wait(timeout)
    }

    /// Unregister a waiter. A no-op returning `false` if already removed.
    pub fn cancel(&self, waiter: &Waiter) -> bool {
        self.ctx.waiters.cancel(waiter)
    }

    /// Register an auto-remove waiter, block, and always unregister.
    pub fn wait_for(
        &self,
        direction: Direction,
        predicate: WaitPredicate,
        timeout: Duration,
    ) -> Result<WaitOutcome, PipelineError> {
        let waiter = self.register_waiter(direction, predicate, true)?;
        let outcome = waiter.wait(timeout);
        self.cancel(&waiter);
        Ok(outcome)
    }

    /// Send `request` to the server and wait for the incoming reply matching
    /// `reply`.
    ///
    /// The waiter is registered before the request leaves so a fast reply
    /// cannot be missed.
    pub fn exchange(
        &self,
        request: &[u8],
        reply: WaitPredicate,
        timeout: Duration,
    ) -> Result<WaitOutcome, PipelineError> {
        let waiter = self.register_waiter(Direction::Incoming, reply, true)?;
        let result = self
            .send_to_server(request)
            .map(|()| waiter.wait(timeout));
        self.cancel(&waiter);
        result
    }

    pub fn waiters(&self) -> &WaitRegistry {
        &self.ctx.waiters
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn subscribe<O>(&self, observer: O) -> ObserverId
    where
        O: PacketObserver + 'static,
    {
        self.ctx.hub.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.ctx.hub.unsubscribe(id)
    }

    fn publish(&self, event: &PacketEvent) {
        let panics = self.ctx.hub.publish(event);
        PipelineMetrics::add(&self.ctx.metrics.callback_panics, panics);
    }

    // ------------------------------------------------------------------
    // Injection
    // ------------------------------------------------------------------

    pub fn attach_sink<S>(&self, sink: S)
    where
        S: PacketSink + 'static,
    {
        *self.sink.write() = Some(Arc::new(sink));
    }

    pub fn detach_sink(&self) -> bool {
        self.sink.write().take().is_some()
    }

    /// Inject a packet toward the server.
    pub fn send_to_server(&self, packet: &[u8]) -> Result<(), PipelineError> {
        self.inject(packet, Direction::Outgoing)
    }

    /// Inject a packet toward the client.
    pub fn send_to_client(&self, packet: &[u8]) -> Result<(), PipelineError> {
        self.inject(packet, Direction::Incoming)
    }

    fn inject(&self, packet: &[u8], toward: Direction) -> Result<(), PipelineError> {
        let sink = self.sink.read().clone().ok_or(PipelineError::NoTransport)?;
        let envelope = Envelope::copy_from(packet, packet.len())?;

        self.ctx.metrics.injected.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "[PIPELINE] inject {} type={:#04x} len={}",
            toward,
            envelope.type_id(),
            envelope.len()
        );
        match toward {
            Direction::Outgoing => {
                self.publish(&PacketEvent::InjectedToServer(envelope));
                sink.send_to_server(packet);
            }
            Direction::Incoming => {
                self.publish(&PacketEvent::InjectedToClient(envelope));
                sink.send_to_client(packet);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection and lifecycle
    // ------------------------------------------------------------------

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// Packets queued for a direction's worker.
    pub fn pending(&self, direction: Direction) -> usize {
        self.gate.dispatcher().pending(direction)
    }

    pub fn is_running(&self) -> bool {
        !self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<(), PipelineError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(PipelineError::ShutDown)
        }
    }

    /// Stop accepting packets, dispatch what is queued, join the workers
    /// and release every waiter with [`WaitOutcome::Closed`].
    ///
    /// Later calls are no-ops. Packets offered after shutdown pass through
    /// untouched.
    pub fn shutdown(&self) -> Result<(), PipelineError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let stopped = self.gate.dispatcher().stop();
        let drained = self.ctx.waiters.drain();
        log::debug!(
            "[PIPELINE] '{}' shut down ({} waiters drained)",
            self.name,
            drained
        );
        stopped.map_err(PipelineError::from)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("catalog", &self.catalog)
            .field("connected", &self.is_connected())
            .field("running", &self.is_running())
            .field("waiters", &self.ctx.waiters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PacketReader, PacketWriter};
    use crate::condition::ByteCondition;
    use crate::error::PacketError;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        to_server: Mutex<Vec<Vec<u8>>>,
        to_client: Mutex<Vec<Vec<u8>>>,
    }

    impl PacketSink for Arc<RecordingSink> {
        fn send_to_server(&self, packet: &[u8]) {
            self.to_server.lock().push(packet.to_vec());
        }

        fn send_to_client(&self, packet: &[u8]) {
            self.to_client.lock().push(packet.to_vec());
        }
    }

    #[test]
    fn test_handler_uses_catalog_length() {
        let pipeline = Pipeline::builder()
            .catalog(PacketCatalog::from_entries([(0x6C, 19), (0xB1, 0)]))
            .build()
            .expect("build");

        pipeline.register_handler(
            0x6C,
            Direction::Outgoing,
            |_: &mut PacketReader<'_>| -> Result<(), PacketError> { Ok(()) },
        );
        pipeline.register_handler(
            0xB1,
            Direction::Outgoing,
            |_: &mut PacketReader<'_>| -> Result<(), PacketError> { Ok(()) },
        );

        let fixed = pipeline.handlers().get(0x6C, Direction::Outgoing).expect("0x6C");
        let variable = pipeline.handlers().get(0xB1, Direction::Outgoing).expect("0xB1");
        assert_eq!(fixed.fixed_length(), 19);
        assert_eq!(variable.fixed_length(), 0);
    }

    #[test]
    fn test_injection_requires_sink() {
        let pipeline = Pipeline::start().expect("build");
        assert!(matches!(
            pipeline.send_to_server(&[0x73, 0]),
            Err(PipelineError::NoTransport)
        ));

        let sink = Arc::new(RecordingSink::default());
        pipeline.attach_sink(Arc::clone(&sink));
        assert!(matches!(
            pipeline.send_to_client(&[]),
            Err(PipelineError::EmptyPacket)
        ));

        let mut cancel = PacketWriter::fixed(0x6C, 19);
        cancel.write_u8(0).write_u32(0x42).write_u8(3);
        let packet = cancel.finish().expect("packet");
        pipeline.send_to_server(&packet).expect("inject");

        assert_eq!(*sink.to_server.lock(), vec![packet]);
        assert!(sink.to_client.lock().is_empty());
        assert_eq!(pipeline.metrics().injected, 1);
        // injected packets are not dispatched
        assert_eq!(pipeline.metrics().sent, 0);
    }

    #[test]
    fn test_exchange_waits_for_reply() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = Arc::new(
            Pipeline::builder()
                .sink(Arc::clone(&sink))
                .build()
                .expect("build"),
        );

        let responder = {
            let pipeline = Arc::clone(&pipeline);
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    if let Some(request) = sink.to_server.lock().first().cloned() {
                        pipeline.on_receive(&request, request.len());
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let outcome = pipeline
            .exchange(
                &[0x73, 0x2A],
                WaitPredicate::new(0x73).condition(ByteCondition::u8_at(1, 0x2A)),
                Duration::from_secs(2),
            )
            .expect("exchange");
        responder.join().expect("responder");

        assert_eq!(outcome, WaitOutcome::Matched(vec![0x73, 0x2A]));
        assert!(pipeline.waiters().is_empty());
    }

    #[test]
    fn test_exchange_without_sink_leaves_no_waiter() {
        let pipeline = Pipeline::start().expect("build");
        let result = pipeline.exchange(&[0x73, 1], WaitPredicate::new(0x73), Duration::ZERO);
        assert!(matches!(result, Err(PipelineError::NoTransport)));
        assert!(pipeline.waiters().is_empty());
    }

    #[test]
    fn test_disconnect_drains_waiters() {
        let pipeline = Pipeline::start().expect("build");
        pipeline.on_connected();
        assert!(pipeline.is_connected());

        let waiter = pipeline
            .register_waiter(Direction::Incoming, WaitPredicate::new(0x3C), false)
            .expect("register");
        assert_eq!(pipeline.on_disconnected(), 1);
        assert!(!pipeline.is_connected());
        assert_eq!(pipeline.wait(&waiter, Duration::from_secs(1)), WaitOutcome::Closed);
        assert!(!pipeline.cancel(&waiter));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pipeline = Pipeline::start().expect("build");
        pipeline.shutdown().expect("shutdown");
        pipeline.shutdown().expect("second shutdown");
        assert!(!pipeline.is_running());
        assert!(matches!(
            pipeline.register_waiter(Direction::Incoming, WaitPredicate::new(1), true),
            Err(PipelineError::ShutDown)
        ));
        assert_eq!(pipeline.on_receive(&[0x73, 0], 2), Verdict::Pass);
    }

    #[test]
    fn test_config_installs_static_filters() {
        let config = PipelineConfig::example();
        let pipeline = Pipeline::builder().config(&config).build().expect("build");
        assert_eq!(pipeline.name(), "example-pipeline");
        assert_eq!(pipeline.filters(Direction::Outgoing).len(), 1);

        let mut cancel = PacketWriter::fixed(0x6C, 19);
        cancel.write_u8(0).write_u32(0).write_u8(3);
        let packet = cancel.finish().expect("packet");
        assert_eq!(pipeline.on_send(&packet, packet.len()), Verdict::Suppress);
        assert_eq!(pipeline.on_receive(&packet, packet.len()), Verdict::Pass);
    }
}
