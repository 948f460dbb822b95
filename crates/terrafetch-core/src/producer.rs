use std::path::PathBuf;
use std::sync::Arc;

/// Run-scoped identity of the module that discovered an item.
///
/// A work item is logically owned by exactly one producer for the lifetime
/// of a run; owners are compared by handle identity (the shared `Arc`),
/// which routes module-scoped hooks and reassembles per-producer result
/// partitions after the concurrent phase.
#[derive(Debug)]
pub struct ProducerInfo {
    /// Unique module name, e.g. `"bluetopo"`.
    pub name: String,
    /// Directory the producer writes its files under.
    pub out_dir: PathBuf,
}

impl ProducerInfo {
    pub fn new(name: impl Into<String>, out_dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            out_dir: out_dir.into(),
        })
    }

    /// Identity key for partitioning maps.
    pub fn key(self: &Arc<Self>) -> usize {
        Arc::as_ptr(self) as usize
    }
}
