//! Event log and live push infrastructure.
//!
//! Two building blocks:
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, carrying persisted events to live feeds.
//! - [`EventLog`] -- the durable, strictly-ordered per-job append log with
//!   cursor replay. Every append goes to the database first and the bus
//!   second, so the log -- not the bus -- is the source of truth a
//!   reconnecting observer replays from.

pub mod bus;
pub mod log;

pub use bus::EventBus;
pub use log::{EventError, EventLog};
