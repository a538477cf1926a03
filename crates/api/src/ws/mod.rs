//! WebSocket push feeds -- the observer protocol.
//!
//! Two independent connections per job: [`feed`] delivers ordered
//! `(seq, type, payload, ts)` events with a client-supplied replay cursor;
//! [`preview`] delivers latest-wins binary frames with no ordering
//! guarantee beyond "most recent wins".

mod feed;
mod preview;

pub use feed::feed_handler;
pub use preview::preview_handler;
