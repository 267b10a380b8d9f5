// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packetgate: packet interception and dispatch pipeline for game clients
//!
//! Sits between a game client and its server. Every packet crossing the
//! connection is offered to the pipeline, which decides whether it is
//! forwarded or suppressed, and fans it out to handlers, blocking waiters and
//! observers on two per-direction worker threads.
//!
//! # Features
//!
//! - **Filtering**: suppress packets by type id and byte conditions
//! - **Handlers**: one handler per (type id, direction), run off the transport thread
//! - **Waiters**: block a script thread until a matching packet arrives
//! - **Injection**: originate packets toward either peer
//! - **Observers**: per-packet and lifecycle notifications
//!
//! # Quick Start
//!
//! ```no_run
//! use packetgate::{ByteCondition, Direction, FilterRule, Pipeline, WaitPredicate};
//! use std::time::Duration;
//!
//! let pipeline = Pipeline::start()?;
//!
//! // hide target cursor cancellations
//! pipeline.add_filter(
//!     Direction::Outgoing,
//!     FilterRule::new(0x6C).condition(ByteCondition::u8_at(6, 0x03)),
//! );
//!
//! // wait for a gump from serial 0x0040_1234
//! let gump = WaitPredicate::new(0xB0).condition(ByteCondition::u32_at(3, 0x0040_1234));
//! let outcome = pipeline.wait_for(Direction::Incoming, gump, Duration::from_secs(5))?;
//! println!("matched: {}", outcome.is_matched());
//! # Ok::<(), packetgate::PipelineError>(())
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [pipeline]
//! name = "bridge"
//!
//! [[packets]]
//! id = 0x6C
//! length = 19
//!
//! [[filters]]
//! direction = "outgoing"
//! type_id = 0x6C
//! conditions = [{ position = 6, expected = [0x03] }]
//! ```

pub mod catalog;
pub mod codec;
pub mod condition;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod pipeline;

pub use catalog::PacketCatalog;
pub use codec::{PacketReader, PacketWriter};
pub use condition::{matches_all, ByteCondition};
pub use config::{ConditionConfig, ConfigError, FilterConfig, PacketLengthConfig, PipelineConfig};
pub use engine::{
    FilterRule, Interception, InterceptorId, MetricsSnapshot, ObserverId, PacketEvent,
    PacketHandler, PacketInterceptor, PacketObserver, RuleId, Verdict, WaitOutcome,
    WaitPredicate, Waiter, WaiterId,
};
pub use envelope::{Direction, Envelope};
pub use error::{PacketError, PipelineError};
pub use pipeline::{PacketSink, Pipeline, PipelineBuilder};
