//! HTTP client for the external planner service.
//!
//! The planner decides what a job does next; this crate only moves bytes
//! and never trusts them. Request payloads are versioned and chosen at
//! configuration time ([`client::PlannerApiVersion`]) with exactly one
//! documented fallback path; response parsing ([`parse`]) degrades
//! anything malformed to "no steps" / `in_progress` instead of erroring.

pub mod client;
pub mod parse;

pub use client::{HttpPlanner, PlannerApiVersion, PlannerConfig};
