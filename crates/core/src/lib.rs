//! Shared types and concurrency primitives for the autopub platform.
//!
//! This crate has no internal dependencies and holds everything the other
//! crates agree on: id/timestamp aliases, the domain error type, event-type
//! constants, the [`Action`](action::Action) data model, the capability
//! traits through which the orchestration core talks to its collaborators
//! (planner service, action executor, remote session), and two reusable
//! concurrency primitives:
//!
//! - [`gate::AdaptiveGate`] -- congestion-reactive admission control for a
//!   rate-limited downstream dependency.
//! - [`locks::SessionLocks`] -- per-resource exclusive locks with
//!   timeout-bounded acquisition.

pub mod action;
pub mod error;
pub mod exec;
pub mod gate;
pub mod job_events;
pub mod locks;
pub mod plan;
pub mod session;
pub mod types;
