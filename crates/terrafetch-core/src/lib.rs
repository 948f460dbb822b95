//! Core data model for terrafetch.
//!
//! Everything that flows between the discovery layer, the transfer client,
//! the hook pipeline and the engine lives here:
//! - [`WorkItem`] - one fetchable unit and its evolving metadata
//! - [`ProducerInfo`] - run-scoped identity of the module that owns an item
//! - [`WorkStream`] - single-pass deferred work a hook may attach
//! - [`CancelToken`] - explicit cancellation shared by a run

mod cancel;
mod item;
mod producer;
mod stream;

pub use cancel::CancelToken;
pub use item::{STATUS_CANCELLED, STATUS_FAILED, STATUS_OK, WorkItem};
pub use producer::ProducerInfo;
pub use stream::WorkStream;

/// User agent sent with outgoing requests.
pub const USER_AGENT: &str = concat!("terrafetch/", env!("CARGO_PKG_VERSION"));
