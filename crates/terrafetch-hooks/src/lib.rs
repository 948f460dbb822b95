//! Pluggable, named, stage-scoped transforms over batches of
//! (producer, item) pairs.
//!
//! A hook consumes an ordered list of [`Entry`] values and returns a new
//! list: it may filter, rewrite items in place, expand one entry into many
//! (archive extraction), or perform a side effect and pass everything
//! through. A hook must never assume how many entries it receives.
//!
//! Hook failure is encoded in the return type: [`HookFailure`] carries the
//! input entries back to the caller, so a failing hook behaves as a no-op
//! transform and can never abort the pipeline.

mod args;
mod error;
mod registry;

pub mod builtins;

use std::sync::Arc;

use serde_json::{Value, json};

use terrafetch_core::{ProducerInfo, WorkItem};

pub use args::HookArgs;
pub use error::HookError;
pub use registry::{HookFactory, HookRegistry};

/// One unit of pipeline flow: the owning producer and its item.
pub type Entry = (Arc<ProducerInfo>, WorkItem);

/// When a hook runs relative to the download phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Once, before any downloads start.
    Pre,
    /// Immediately after each file download, per item.
    File,
    /// Once, after all downloads in scope finish.
    Post,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Pre => "pre",
            Stage::File => "file",
            Stage::Post => "post",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pre" => Some(Stage::Pre),
            "file" => Some(Stage::File),
            "post" => Some(Stage::Post),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed hook invocation, returning the untouched input entries so the
/// pipeline continues with the pre-error list.
#[derive(Debug)]
pub struct HookFailure {
    pub entries: Vec<Entry>,
    pub error: HookError,
}

pub type HookResult = Result<Vec<Entry>, HookFailure>;

/// A named, stage-scoped transform or side effect.
pub trait Hook: Send + Sync {
    /// Unique registry key, e.g. `"unzip"`.
    fn name(&self) -> &str;

    fn stage(&self) -> Stage;

    /// Presentation grouping only.
    fn category(&self) -> &str {
        "uncategorized"
    }

    /// Structural fingerprint of the configured options. Two hooks with the
    /// same name, stage and options are the same logical hook; the engine
    /// de-duplicates on this when merging global and module-scoped chains.
    fn options(&self) -> Value {
        Value::Null
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult;

    /// Called exactly once per run for every participating hook, regardless
    /// of success or failure elsewhere.
    fn teardown(&self) -> Result<(), HookError> {
        Ok(())
    }
}

/// Structural equality used for chain de-duplication.
pub fn hooks_equal(a: &dyn Hook, b: &dyn Hook) -> bool {
    a.name() == b.name() && a.stage() == b.stage() && a.options() == b.options()
}

/// Merge global and module-scoped hooks, removing structural duplicates.
/// Globals first, relative order preserved.
pub fn merge_hooks(
    global: &[Arc<dyn Hook>],
    scoped: &[Arc<dyn Hook>],
) -> Vec<Arc<dyn Hook>> {
    let mut merged: Vec<Arc<dyn Hook>> = Vec::with_capacity(global.len() + scoped.len());
    for hook in global.iter().chain(scoped) {
        if !merged.iter().any(|h| hooks_equal(h.as_ref(), hook.as_ref())) {
            merged.push(Arc::clone(hook));
        }
    }
    merged
}

/// Metadata key holding the per-item record of hooks that ran over it.
pub const HISTORY_KEY: &str = "history";

/// Append `{hook, stage, timestamp}` to every entry's history record.
pub fn log_hook_history(entries: &mut [Entry], hook: &dyn Hook) {
    if entries.is_empty() {
        return;
    }
    let record = json!({
        "hook": hook.name(),
        "stage": hook.stage().as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    for (_, item) in entries.iter_mut() {
        match item.metadata.get_mut(HISTORY_KEY) {
            Some(Value::Array(records)) => records.push(record.clone()),
            _ => {
                item.metadata
                    .insert(HISTORY_KEY.to_string(), Value::Array(vec![record.clone()]));
            }
        }
    }
}

/// Convenience for tests and producers building entries.
pub fn entry(owner: &Arc<ProducerInfo>, item: WorkItem) -> Entry {
    (Arc::clone(owner), item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::filter::FilenameFilter;
    use crate::builtins::pipeline::DryRun;

    #[test]
    fn merge_deduplicates_structurally_globals_first() {
        let global: Vec<Arc<dyn Hook>> = vec![
            Arc::new(DryRun),
            Arc::new(FilenameFilter::substring(Some(".tif"), None)),
        ];
        let scoped: Vec<Arc<dyn Hook>> = vec![
            Arc::new(FilenameFilter::substring(Some(".tif"), None)),
            Arc::new(FilenameFilter::substring(Some(".laz"), None)),
        ];

        let merged = merge_hooks(&global, &scoped);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].name(), "dryrun");
        assert_eq!(merged[1].options()["match"], ".tif");
        assert_eq!(merged[2].options()["match"], ".laz");
    }

    #[test]
    fn failure_renders_its_error_and_keeps_entries() {
        let owner = ProducerInfo::new("dem", "/tmp/dem");
        let failure = HookFailure {
            entries: vec![entry(&owner, WorkItem::new("u", "/tmp/dem/a.tif", "raster"))],
            error: HookError::Other("disk full".to_string()),
        };

        let rendered = format!("{failure:?}");
        assert!(rendered.contains("disk full"));
        assert_eq!(failure.entries.len(), 1);
    }

    #[test]
    fn history_records_accumulate() {
        let owner = ProducerInfo::new("dem", "/tmp/dem");
        let mut entries = vec![entry(&owner, WorkItem::new("u", "/tmp/dem/a.tif", "raster"))];

        let hook = DryRun;
        log_hook_history(&mut entries, &hook);
        log_hook_history(&mut entries, &hook);

        let records = entries[0].1.metadata[HISTORY_KEY].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["hook"], "dryrun");
        assert_eq!(records[0]["stage"], "pre");
    }
}
