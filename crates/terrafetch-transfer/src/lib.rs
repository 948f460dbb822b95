//! Reliable materialization of one URL to one local path.
//!
//! The public surface is a status code, not a `Result`: every failure mode
//! collapses to a negative status plus a log line, so one item's failure can
//! never abort a batch. Internals propagate [`TransferError`] with `?` and
//! map at the boundary.
//!
//! HTTP(S) downloads are resumable through a `<dest>.part` staging file:
//! present after a failed or interrupted download, absent after success,
//! and resumed from exactly its current size on retry. That convention is
//! the one on-disk contract this crate must keep.

mod client;
mod error;
mod ftp;
mod local;
mod options;

pub use client::TransferClient;
pub use error::TransferError;
pub use options::TransferOptions;

pub use terrafetch_core::{STATUS_CANCELLED, STATUS_FAILED, STATUS_OK};

use std::path::{Path, PathBuf};

/// Staging path for a resumable download (`<dest>.part`).
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
