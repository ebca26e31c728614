//! # Events & Sessions
//!
//! The publish/subscribe layer between the engines and connected
//! WebSocket clients.
//!
//! ```text
//! bus.rs      — Event enum, subscription categories, EventSink trait
//! sessions.rs — session registry: tokens, subscriptions, fan-out
//! router.rs   — message-typed handlers executed in session context
//! ```
//!
//! Engines only ever see the [`EventSink`] trait; the session registry
//! implements it. That one seam keeps the dependency graph acyclic:
//! sessions call into engines to serve client messages, engines call
//! `emit` without knowing who listens.

pub mod bus;
pub mod router;
pub mod sessions;

pub use bus::{Event, EventCategory, EventSink, NullSink};
pub use router::MessageRouter;
pub use sessions::{Session, SessionRegistry};
