// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet engine: admission, dispatch and wait/notify.
//!
//! # Data flow
//!
//! ```text
//!  transport thread          dispatcher workers (1 per direction)
//!  ----------------          ------------------------------------
//!  on_receive / on_send
//!        |
//!        v
//!   Gatekeeper ---(filter / interceptor hit)---> Suppress, filtered event
//!        |
//!        | enqueue (unbounded FIFO)
//!        v
//!   [incoming queue] -> worker: observed event -> handler -> wait registry
//!   [outgoing queue] -> worker: observed event -> handler -> wait registry
//!                                                              |
//!                               caller threads parked in Waiter::wait
//! ```
//!
//! Nothing in here lets a callback fault reach the transport thread or kill a
//! worker: handler, action, interceptor and observer panics are caught,
//! logged and counted.

/// Per-direction queue workers
pub(crate) mod dispatcher;
/// Suppression rule table
pub mod filter;
/// Transport-facing admission
pub mod gate;
/// 256-slot handler table
pub mod handler;
/// Observer notifications
pub mod hub;
/// Pipeline counters
pub mod metrics;
mod signal;
/// Blocking wait registry
pub mod wait;

pub use filter::{FilterAction, FilterRule, FilterTable, RuleId};
pub use gate::{Interception, InterceptorId, PacketInterceptor, Verdict};
pub use handler::{HandlerEntry, HandlerTable, PacketHandler, HANDLER_SLOTS};
pub use hub::{ObserverHub, ObserverId, PacketEvent, PacketObserver};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use wait::{
    MatchOutcome, WaitAction, WaitOutcome, WaitPredicate, WaitRegistry, Waiter, WaiterId,
};
