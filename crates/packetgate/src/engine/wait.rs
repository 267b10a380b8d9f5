// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking waits over the asynchronous packet stream.
//!
//! A caller registers a [`Waiter`] (direction + type id + byte conditions),
//! triggers whatever request it expects an answer to, then parks on
//! [`Waiter::wait`] with its own timeout. The dispatcher worker calls
//! [`WaitRegistry::on_packet`] for every packet after handlers ran.
//!
//! # Locking
//! One mutex guards the live set. Inside it, `on_packet` selects matches,
//! stores the captured bytes, fires each signal and removes auto-remove
//! waiters, so a removed waiter can never match again. Side-effect actions
//! run after the lock is released and may re-enter the registry.
//!
//! A `cancel` issued by such an action against another waiter matched by the
//! same packet loses the race: that waiter has already been signaled and the
//! cancel only takes it out of the live set (or is a no-op).

use super::signal::{Wake, WaitSignal};
use crate::condition::{matches_all, ByteCondition};
use crate::envelope::{Direction, Envelope};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_WAITER_ID: AtomicU64 = AtomicU64::new(1);

/// Side effect run once per match, outside the registry lock.
pub type WaitAction = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// What a waiter is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPredicate {
    type_id: u8,
    conditions: Vec<ByteCondition>,
}

impl WaitPredicate {
    pub fn new(type_id: u8) -> Self {
        Self {
            type_id,
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn condition(mut self, condition: ByteCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn conditions(mut self, conditions: impl IntoIterator<Item = ByteCondition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    #[inline]
    pub fn type_id(&self) -> u8 {
        self.type_id
    }

    pub fn condition_list(&self) -> &[ByteCondition] {
        &self.conditions
    }

    #[inline]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        envelope.type_id() == self.type_id && matches_all(envelope.as_bytes(), &self.conditions)
    }
}

/// Result of [`Waiter::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Full bytes of the matching packet.
    Matched(Vec<u8>),
    /// Deadline elapsed with no match.
    TimedOut,
    /// Registry drained (connection closed) before a match.
    Closed,
}

impl WaitOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, WaitOutcome::Matched(_))
    }

    pub fn into_packet(self) -> Option<Vec<u8>> {
        match self {
            WaitOutcome::Matched(packet) => Some(packet),
            WaitOutcome::TimedOut | WaitOutcome::Closed => None,
        }
    }
}

/// Process-unique waiter handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(u64);

impl WaiterId {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

struct WaiterInner {
    id: WaiterId,
    direction: Direction,
    predicate: WaitPredicate,
    auto_remove: bool,
    action: Option<WaitAction>,
    signal: WaitSignal,
    live: AtomicBool,
}

/// Shared handle to a registered wait.
///
/// Cloning is cheap; all clones refer to the same registration.
#[derive(Clone)]
pub struct Waiter {
    inner: Arc<WaiterInner>,
}

impl Waiter {
    fn new(
        direction: Direction,
        predicate: WaitPredicate,
        auto_remove: bool,
        action: Option<WaitAction>,
    ) -> Self {
        Self {
            inner: Arc::new(WaiterInner {
                id: WaiterId(NEXT_WAITER_ID.fetch_add(1, Ordering::Relaxed)),
                direction,
                predicate,
                auto_remove,
                action,
                signal: WaitSignal::new(),
                live: AtomicBool::new(true),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> WaiterId {
        self.inner.id
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    pub fn predicate(&self) -> &WaitPredicate {
        &self.inner.predicate
    }

    #[inline]
    pub fn auto_remove(&self) -> bool {
        self.inner.auto_remove
    }

    /// Still in the registry's live set.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// A match is pending and has not been consumed by `wait` yet.
    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.inner.signal.is_set()
    }

    /// Last captured packet, if any, without consuming the signal.
    pub fn captured(&self) -> Option<Vec<u8>> {
        self.inner.signal.peek()
    }

    /// Block the calling thread until a match, a drain, or `timeout`.
    ///
    /// Timing out does not unregister the waiter; call
    /// [`WaitRegistry::cancel`] afterwards.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        match self.inner.signal.wait_timeout(timeout) {
            Wake::Fired(packet) => WaitOutcome::Matched(packet),
            Wake::Closed => WaitOutcome::Closed,
            Wake::TimedOut => WaitOutcome::TimedOut,
        }
    }

    #[inline]
    fn matches(&self, envelope: &Envelope, direction: Direction) -> bool {
        self.inner.direction == direction && self.inner.predicate.matches(envelope)
    }

    fn retire(&self) {
        self.inner.live.store(false, Ordering::Release);
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Waiter {}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("id", &self.inner.id.0)
            .field("direction", &self.inner.direction)
            .field("predicate", &self.inner.predicate)
            .field("auto_remove", &self.inner.auto_remove)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Result of one [`WaitRegistry::on_packet`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Waiters signaled by this packet.
    pub matched: usize,
    /// Waiters removed because they were auto-remove.
    pub removed: usize,
    /// Side-effect actions that panicked (caught).
    pub action_panics: usize,
}

impl MatchOutcome {
    #[inline]
    pub fn any_matched(&self) -> bool {
        self.matched > 0
    }
}

/// Live set of pending waiters.
#[derive(Default)]
pub struct WaitRegistry {
    live: Mutex<Vec<Waiter>>,
}

impl WaitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a waiter to the live set. Never blocks on packet traffic.
    pub fn register(
        &self,
        direction: Direction,
        predicate: WaitPredicate,
        auto_remove: bool,
    ) -> Waiter {
        self.insert(Waiter::new(direction, predicate, auto_remove, None))
    }

    /// Like [`register`](Self::register) with a side effect run on each match.
    pub fn register_with_action<F>(
        &self,
        direction: Direction,
        predicate: WaitPredicate,
        auto_remove: bool,
        action: F,
    ) -> Waiter
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.insert(Waiter::new(
            direction,
            predicate,
            auto_remove,
            Some(Arc::new(action)),
        ))
    }

    fn insert(&self, waiter: Waiter) -> Waiter {
        log::trace!(
            "[WAIT] register id={} {} type={:#04x} auto_remove={}",
            waiter.id().0,
            waiter.direction(),
            waiter.predicate().type_id(),
            waiter.auto_remove()
        );
        self.live.lock().push(waiter.clone());
        waiter
    }

    /// Signal every live waiter matching `envelope` in `direction`.
    pub fn on_packet(&self, envelope: &Envelope, direction: Direction) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        let mut with_actions = Vec::new();

        {
            let mut live = self.live.lock();
            live.retain(|waiter| {
                if !waiter.matches(envelope, direction) {
                    return true;
                }
                waiter.inner.signal.fire(envelope.to_vec());
                outcome.matched += 1;
                if waiter.inner.action.is_some() {
                    with_actions.push(waiter.clone());
                }
                if waiter.auto_remove() {
                    waiter.retire();
                    outcome.removed += 1;
                    return false;
                }
                true
            });
        }

        for waiter in &with_actions {
            if let Some(action) = &waiter.inner.action {
                let result = catch_unwind(AssertUnwindSafe(|| action(envelope)));
                if result.is_err() {
                    outcome.action_panics += 1;
                    log::warn!(
                        "[WAIT] action for waiter {} panicked (type={:#04x})",
                        waiter.id().0,
                        envelope.type_id()
                    );
                }
            }
        }

        if outcome.matched > 0 {
            log::trace!(
                "[WAIT] {} type={:#04x} matched={} removed={}",
                direction,
                envelope.type_id(),
                outcome.matched,
                outcome.removed
            );
        }
        outcome
    }

    /// Remove a waiter. Returns `false` if it was already gone.
    pub fn cancel(&self, waiter: &Waiter) -> bool {
        let mut live = self.live.lock();
        match live.iter().position(|w| w.id() == waiter.id()) {
            Some(index) => {
                let removed = live.remove(index);
                removed.retire();
                true
            }
            None => false,
        }
    }

    /// Wake every pending waiter with [`WaitOutcome::Closed`] and empty the set.
    ///
    /// Returns the number of waiters drained.
    pub fn drain(&self) -> usize {
        let drained = std::mem::take(&mut *self.live.lock());
        for waiter in &drained {
            waiter.retire();
            waiter.inner.signal.close();
        }
        if !drained.is_empty() {
            log::debug!("[WAIT] drained {} pending waiters", drained.len());
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }

    /// Snapshot of the live set, in registration order.
    pub fn entries(&self) -> Vec<Waiter> {
        self.live.lock().clone()
    }
}

impl fmt::Debug for WaitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitRegistry")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Instant;

    fn container(serial: u32) -> Envelope {
        let mut pkt = vec![0u8; 24];
        pkt[0] = 0x3C;
        pkt[19..23].copy_from_slice(&serial.to_be_bytes());
        Envelope::from_vec(pkt).expect("envelope")
    }

    fn serial_predicate(serial: u32) -> WaitPredicate {
        WaitPredicate::new(0x3C).condition(ByteCondition::u32_at(19, serial))
    }

    #[test]
    fn test_match_returns_full_bytes() {
        let reg = WaitRegistry::new();
        let waiter = reg.register(Direction::Incoming, serial_predicate(42), true);

        let outcome = reg.on_packet(&container(42), Direction::Incoming);
        assert!(outcome.any_matched());
        assert_eq!(
            waiter.wait(Duration::from_millis(10)),
            WaitOutcome::Matched(container(42).to_vec())
        );
    }

    #[test]
    fn test_direction_scoped() {
        let reg = WaitRegistry::new();
        let waiter = reg.register(Direction::Incoming, serial_predicate(1), false);
        assert!(!reg.on_packet(&container(1), Direction::Outgoing).any_matched());
        assert!(!waiter.is_signaled());
    }

    #[test]
    fn test_auto_remove_matches_once() {
        let reg = WaitRegistry::new();
        let waiter = reg.register(Direction::Incoming, WaitPredicate::new(0x3C), true);

        assert_eq!(reg.on_packet(&container(1), Direction::Incoming).matched, 1);
        assert_eq!(reg.on_packet(&container(2), Direction::Incoming).matched, 0);
        assert!(!waiter.is_live());
        assert!(reg.is_empty());

        let packet = waiter
            .wait(Duration::from_millis(10))
            .into_packet()
            .expect("first packet");
        assert_eq!(&packet[19..23], &1u32.to_be_bytes());
        assert_eq!(waiter.wait(Duration::from_millis(10)), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_persistent_waiter_matches_repeatedly() {
        let reg = WaitRegistry::new();
        let waiter = reg.register(Direction::Incoming, WaitPredicate::new(0x3C), false);

        reg.on_packet(&container(1), Direction::Incoming);
        reg.on_packet(&container(2), Direction::Incoming);
        // signal set once, latest bytes captured
        let packet = waiter.wait(Duration::ZERO).into_packet().expect("packet");
        assert_eq!(&packet[19..23], &2u32.to_be_bytes());
        assert_eq!(waiter.wait(Duration::ZERO), WaitOutcome::TimedOut);

        reg.on_packet(&container(3), Direction::Incoming);
        assert!(waiter.wait(Duration::ZERO).is_matched());
        assert!(waiter.is_live());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let reg = WaitRegistry::new();
        let waiter = reg.register(Direction::Outgoing, WaitPredicate::new(0x6C), true);
        assert!(reg.cancel(&waiter));
        assert!(!reg.cancel(&waiter));
        assert!(!reg.on_packet(&container(0), Direction::Outgoing).any_matched());
    }

    #[test]
    fn test_cancel_keeps_registration_order() {
        let reg = WaitRegistry::new();
        let first = reg.register(Direction::Incoming, WaitPredicate::new(0x3C), false);
        let middle = reg.register(Direction::Incoming, WaitPredicate::new(0x1C), false);
        let last = reg.register(Direction::Incoming, WaitPredicate::new(0x73), false);
        let tail = reg.register(Direction::Incoming, WaitPredicate::new(0xAE), false);

        assert!(reg.cancel(&middle));
        let ids: Vec<_> = reg.entries().iter().map(Waiter::id).collect();
        assert_eq!(ids, vec![first.id(), last.id(), tail.id()]);
    }

    #[test]
    fn test_cancel_after_auto_remove_is_noop() {
        let reg = WaitRegistry::new();
        let waiter = reg.register(Direction::Incoming, WaitPredicate::new(0x3C), true);
        reg.on_packet(&container(5), Direction::Incoming);
        assert!(!reg.cancel(&waiter));
        assert!(waiter.wait(Duration::ZERO).is_matched());
    }

    #[test]
    fn test_timeout_then_cancel() {
        let reg = WaitRegistry::new();
        let waiter = reg.register(Direction::Incoming, serial_predicate(9), true);

        let start = Instant::now();
        assert_eq!(waiter.wait(Duration::from_millis(100)), WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(90));
        assert!(reg.cancel(&waiter));
        assert!(!reg.cancel(&waiter));
    }

    #[test]
    fn test_drain_unblocks_with_closed() {
        let reg = Arc::new(WaitRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let waiter = reg.register(Direction::Incoming, serial_predicate(i), false);
                thread::spawn(move || waiter.wait(Duration::from_secs(10)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        assert_eq!(reg.drain(), 8);
        for h in handles {
            assert_eq!(h.join().expect("waiter thread"), WaitOutcome::Closed);
        }
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_action_runs_outside_lock_and_may_reenter() {
        let reg = Arc::new(WaitRegistry::new());
        let other = reg.register(Direction::Incoming, WaitPredicate::new(0x3C), false);

        let r = Arc::clone(&reg);
        let victim = other.clone();
        let canceled = Arc::new(AtomicBool::new(false));
        let c = Arc::clone(&canceled);
        reg.register_with_action(Direction::Incoming, WaitPredicate::new(0x3C), true, move |_| {
            c.store(r.cancel(&victim), Ordering::SeqCst);
            // registering from inside an action must not deadlock
            r.register(Direction::Outgoing, WaitPredicate::new(0x6C), true);
        });

        let outcome = reg.on_packet(&container(7), Direction::Incoming);
        assert_eq!(outcome.matched, 2);
        // the canceled waiter was already signaled by this pass
        assert!(other.wait(Duration::ZERO).is_matched());
        assert!(canceled.load(Ordering::SeqCst));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_action_panic_is_contained() {
        let reg = WaitRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        reg.register_with_action(Direction::Incoming, WaitPredicate::new(0x3C), false, |_| {
            panic!("boom");
        });
        let h = Arc::clone(&hits);
        reg.register_with_action(Direction::Incoming, WaitPredicate::new(0x3C), false, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = reg.on_packet(&container(1), Direction::Incoming);
        assert_eq!(outcome.action_panics, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_packets_fire_each_waiter_once() {
        let reg = Arc::new(WaitRegistry::new());
        let waiters: Vec<_> = (0..32)
            .map(|i| reg.register(Direction::Incoming, serial_predicate(i % 4), true))
            .collect();

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                thread::spawn(move || {
                    let mut matched = 0;
                    for serial in 0..4 {
                        matched += reg.on_packet(&container(serial), Direction::Incoming).matched;
                    }
                    matched
                })
            })
            .collect();

        let total: usize = senders
            .into_iter()
            .map(|h| h.join().expect("sender"))
            .sum();
        assert_eq!(total, 32);
        assert!(reg.is_empty());
        for w in &waiters {
            assert!(w.wait(Duration::ZERO).is_matched());
        }
    }
}
