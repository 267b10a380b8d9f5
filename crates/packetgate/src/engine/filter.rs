// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Suppression rules evaluated at the transport boundary.
//!
//! # Concurrency
//! - Readers (`match_all`, transport thread): lock-free `ArcSwap` snapshot load
//! - Writers (`add`/`remove`/`clear`): serialized by one mutex, copy-on-write
//!
//! A `match_all` running concurrently with a mutation sees either the old or
//! the new rule list, never a partially updated one.

use crate::condition::{matches_all, ByteCondition};
use crate::envelope::Envelope;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_RULE_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying a registered rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u64);

impl RuleId {
    fn next() -> Self {
        Self(NEXT_RULE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Side effect run when a rule suppresses a packet.
pub type FilterAction = Arc<dyn Fn(&Envelope, &FilterRule) + Send + Sync>;

/// Type id plus all-of byte conditions, with an optional action.
#[derive(Clone)]
pub struct FilterRule {
    id: RuleId,
    type_id: u8,
    conditions: Vec<ByteCondition>,
    action: Option<FilterAction>,
}

impl FilterRule {
    /// Rule matching every packet of `type_id`.
    pub fn new(type_id: u8) -> Self {
        Self {
            id: RuleId::next(),
            type_id,
            conditions: Vec::new(),
            action: None,
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

    #[must_use]
    pub fn on_match<F>(mut self, action: F) -> Self
    where
        F: Fn(&Envelope, &FilterRule) + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    #[inline]
    pub fn id(&self) -> RuleId {
        self.id
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

    /// Run the attached action, if any. Panics propagate to the caller.
    pub fn invoke(&self, envelope: &Envelope) {
        if let Some(action) = &self.action {
            action(envelope, self);
        }
    }
}

impl fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRule")
            .field("id", &self.id.0)
            .field("type_id", &format_args!("{:#04x}", self.type_id))
            .field("conditions", &self.conditions)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

/// Ordered rule set for one direction.
pub struct FilterTable {
    rules: ArcSwap<Vec<Arc<FilterRule>>>,
    writer: Mutex<()>,
}

impl FilterTable {
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Append a rule; returns its handle for later removal.
    pub fn add(&self, rule: FilterRule) -> RuleId {
        let id = rule.id();
        let _guard = self.writer.lock();
        let mut next = Vec::clone(&self.rules.load());
        next.push(Arc::new(rule));
        self.rules.store(Arc::new(next));
        log::debug!("[FILTER] add rule={}", id.0);
        id
    }

    /// Remove a rule by handle. Returns `false` if it was not registered.
    pub fn remove(&self, id: RuleId) -> bool {
        let _guard = self.writer.lock();
        let current = self.rules.load();
        if !current.iter().any(|r| r.id() == id) {
            return false;
        }
        let next: Vec<_> = current.iter().filter(|r| r.id() != id).cloned().collect();
        self.rules.store(Arc::new(next));
        log::debug!("[FILTER] remove rule={}", id.0);
        true
    }

    /// Drop every rule; returns how many were removed.
    pub fn clear(&self) -> usize {
        let _guard = self.writer.lock();
        let previous = self.rules.swap(Arc::new(Vec::new()));
        previous.len()
    }

    /// Every rule matching the envelope, in registration order.
    ///
    /// No side effects: the caller decides whether to run actions.
    pub fn match_all(&self, envelope: &Envelope) -> Vec<Arc<FilterRule>> {
        let rules = self.rules.load();
        rules
            .iter()
            .filter(|rule| rule.matches(envelope))
            .cloned()
            .collect()
    }

    /// Current rule list snapshot.
    pub fn rules(&self) -> Arc<Vec<Arc<FilterRule>>> {
        self.rules.load_full()
    }

    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.load().is_empty()
    }
}

impl Default for FilterTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterTable")
            .field("rules", &self.len())
            .finish()
    }
}
