//! Orchestration of a full fetch run.
//!
//! A run takes a set of [`Producer`]s (modules with discovered items and
//! scoped hooks) plus a list of global hooks, and drives them through the
//! staged pipeline in [`run_pipeline`]. The engine owns concurrency,
//! cancellation and hook sequencing; what a hook does is entirely the hook
//! crate's business, and how a byte moves is the transfer crate's.

mod producer;
mod run;

pub use producer::Producer;
pub use run::{EngineError, EngineOptions, ProgressFn, run_pipeline};
