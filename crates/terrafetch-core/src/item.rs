use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::stream::WorkStream;

/// Transfer completed successfully.
pub const STATUS_OK: i32 = 0;
/// Transfer failed (exhausted retries, fatal error, or protocol failure).
pub const STATUS_FAILED: i32 = -1;
/// Transfer aborted because the run's [`CancelToken`](crate::CancelToken) was set.
pub const STATUS_CANCELLED: i32 = -2;

/// One discovered, fetchable unit.
///
/// Created by a producer during discovery, mutated in place by the transfer
/// client (`status`) and by hooks (any field, including `dest` replacement).
/// Hooks that want to drop an item simply omit it from their returned list;
/// items are never destroyed mid-run.
#[derive(Debug, Default)]
pub struct WorkItem {
    /// Source location; `http(s)://`, `ftp://` and `file://` are supported.
    pub url: String,
    /// Target local path. `None` means the item is never downloaded and
    /// skips the file stage, but it still flows through pre/post stages.
    pub dest: Option<PathBuf>,
    /// Free-form payload tag set by the producer (format/category).
    pub data_type: String,
    /// Transfer result: `Some(0)` success, `Some(negative)` failure,
    /// `None` until a transfer attempt completes.
    pub status: Option<i32>,
    /// Open-ended bag for producer- and hook-attached fields. Any component
    /// may add keys; no component may assume a key exists without checking.
    pub metadata: BTreeMap<String, Value>,
    /// Deferred single-pass work attached by a hook; the engine drains it
    /// exactly once after the file-stage chain.
    pub stream: Option<WorkStream>,
}

impl WorkItem {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>, data_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest: Some(dest.into()),
            data_type: data_type.into(),
            ..Self::default()
        }
    }

    /// An item with no destination; visible to pre/post hooks only.
    pub fn undownloadable(url: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest: None,
            data_type: data_type.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(STATUS_OK)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn meta_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }

    /// Copy of this item with fresh `dest`, carrying metadata along.
    /// Used by expansion-style hooks (archive extraction); the attached
    /// stream, if any, stays with the original.
    pub fn derive(&self, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: self.url.clone(),
            dest: Some(dest.into()),
            data_type: self.data_type.clone(),
            status: self.status,
            metadata: self.metadata.clone(),
            stream: None,
        }
    }
}
