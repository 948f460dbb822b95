//! Pipeline-control and sink hooks: dryrun, list, inventory, pipe.

use std::io::Write;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::error;

use crate::args::HookArgs;
use crate::error::HookError;
use crate::{Entry, Hook, HookFailure, HookResult, Stage};

/// Pre-stage hook that empties the queue: "list what would be fetched,
/// don't fetch it". Returning an empty list ends the run before any
/// download task is submitted.
pub struct DryRun;

impl DryRun {
    pub fn from_args(_: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        Ok(Arc::new(DryRun))
    }
}

impl Hook for DryRun {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn stage(&self) -> Stage {
        Stage::Pre
    }

    fn category(&self) -> &str {
        "pipeline"
    }

    fn run(&self, _entries: Vec<Entry>) -> HookResult {
        Ok(Vec::new())
    }
}

/// Print discovered URLs, pass everything through.
pub struct ListEntries;

impl ListEntries {
    pub fn from_args(_: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        Ok(Arc::new(ListEntries))
    }
}

impl Hook for ListEntries {
    fn name(&self) -> &str {
        "list"
    }

    fn stage(&self) -> Stage {
        Stage::Pre
    }

    fn category(&self) -> &str {
        "metadata"
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult {
        let mut out = std::io::stdout().lock();
        for (_, item) in &entries {
            let _ = writeln!(out, "{}", item.url);
        }
        Ok(entries)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InventoryFormat {
    Json,
    Csv,
}

/// Pre-stage metadata inventory printed to stdout.
pub struct Inventory {
    format: InventoryFormat,
}

impl Inventory {
    pub fn from_args(args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        let format = match args.get("format").unwrap_or("json") {
            "json" => InventoryFormat::Json,
            "csv" => InventoryFormat::Csv,
            other => {
                return Err(HookError::InvalidOption {
                    hook: "inventory".to_string(),
                    key: "format".to_string(),
                    reason: format!("expected json or csv, got `{other}`"),
                });
            }
        };
        Ok(Arc::new(Inventory { format }))
    }

    fn render(&self, entries: &[Entry]) -> Result<String, HookError> {
        let records: Vec<Value> = entries
            .iter()
            .map(|(owner, item)| {
                json!({
                    "module": owner.name,
                    "filename": item.dest.as_ref().map(|p| p.display().to_string()),
                    "url": item.url,
                    "data_type": item.data_type,
                })
            })
            .collect();

        match self.format {
            InventoryFormat::Json => Ok(serde_json::to_string_pretty(&records)?),
            InventoryFormat::Csv => {
                let mut writer = csv::Writer::from_writer(Vec::new());
                writer.write_record(["module", "filename", "url", "data_type"])?;
                for record in &records {
                    writer.write_record([
                        record["module"].as_str().unwrap_or(""),
                        record["filename"].as_str().unwrap_or(""),
                        record["url"].as_str().unwrap_or(""),
                        record["data_type"].as_str().unwrap_or(""),
                    ])?;
                }
                let bytes = writer
                    .into_inner()
                    .map_err(|e| HookError::Other(e.to_string()))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }
}

impl Hook for Inventory {
    fn name(&self) -> &str {
        "inventory"
    }

    fn stage(&self) -> Stage {
        Stage::Pre
    }

    fn category(&self) -> &str {
        "metadata"
    }

    fn options(&self) -> Value {
        json!({ "format": match self.format {
            InventoryFormat::Json => "json",
            InventoryFormat::Csv => "csv",
        }})
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult {
        match self.render(&entries) {
            Ok(rendered) => {
                println!("{rendered}");
                Ok(entries)
            }
            Err(error) => Err(HookFailure { entries, error }),
        }
    }
}

/// Post-stage sink printing absolute paths of successful fetches, one per
/// line, for piping into downstream tools. The stdout lock makes each batch
/// of writes atomic with respect to other writers.
pub struct PipeOutput;

impl PipeOutput {
    pub fn from_args(_: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        Ok(Arc::new(PipeOutput))
    }
}

impl Hook for PipeOutput {
    fn name(&self) -> &str {
        "pipe"
    }

    fn stage(&self) -> Stage {
        Stage::Post
    }

    fn category(&self) -> &str {
        "pipeline"
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult {
        let mut out = std::io::stdout().lock();
        for (_, item) in &entries {
            if !item.is_success() {
                continue;
            }
            let Some(dest) = &item.dest else { continue };
            match std::path::absolute(dest) {
                Ok(abs) => {
                    let _ = writeln!(out, "{}", abs.display());
                }
                Err(e) => error!("pipe: cannot resolve {}: {e}", dest.display()),
            }
        }
        let _ = out.flush();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrafetch_core::{ProducerInfo, STATUS_OK, WorkItem};

    fn entries() -> Vec<Entry> {
        let owner = ProducerInfo::new("dem", "/tmp/dem");
        vec![
            crate::entry(&owner, WorkItem::new("https://x/a.tif", "/tmp/dem/a.tif", "raster")),
            crate::entry(&owner, WorkItem::new("https://x/b.tif", "/tmp/dem/b.tif", "raster")),
        ]
    }

    #[test]
    fn dryrun_returns_empty_unconditionally() {
        assert!(DryRun.run(entries()).unwrap().is_empty());
        assert!(DryRun.run(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn list_passes_through_in_order() {
        let out = ListEntries.run(entries()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].1.url, "https://x/a.tif");
    }

    #[test]
    fn inventory_renders_both_formats() {
        let json_hook = Inventory { format: InventoryFormat::Json };
        let rendered = json_hook.render(&entries()).unwrap();
        assert!(rendered.contains("\"module\": \"dem\""));

        let csv_hook = Inventory { format: InventoryFormat::Csv };
        let rendered = csv_hook.render(&entries()).unwrap();
        assert!(rendered.starts_with("module,filename,url,data_type"));
        assert_eq!(rendered.lines().count(), 3);
    }

    #[test]
    fn pipe_passes_through_unchanged() {
        let mut input = entries();
        input[0].1.status = Some(STATUS_OK);
        let out = PipeOutput.run(input).unwrap();
        assert_eq!(out.len(), 2);
    }
}
