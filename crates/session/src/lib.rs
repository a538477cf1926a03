//! Session-side building blocks.
//!
//! - [`preview`] -- the capacity-1, latest-wins frame channel and its
//!   fixed-rate producer task.
//! - [`executor`] -- the standard [`Executor`](autopub_core::exec::Executor)
//!   implementation forwarding action batches to a session handle.
//! - [`inproc`] -- an in-process scripted session adapter used by the test
//!   suites and local development. The remote-browser adapter implements
//!   the same `SessionHandle`/`SessionProvider` traits out of tree.

pub mod executor;
pub mod inproc;
pub mod preview;

pub use executor::SessionExecutor;
pub use preview::{spawn_producer, stop_producer, PreviewChannel, PreviewReceiver};
