//! Hooks that read fetched files and annotate entries with metadata.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use sha2::{Digest, Sha256, Sha512};
use tracing::{debug, warn};

use crate::args::HookArgs;
use crate::error::HookError;
use crate::{Entry, Hook, HookResult, Stage};

const CHUNK: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChecksumAlgo {
    Sha256,
    Sha512,
}

impl ChecksumAlgo {
    fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgo::Sha256 => "sha256",
            ChecksumAlgo::Sha512 => "sha512",
        }
    }

    fn digest_file(self, path: &Path) -> std::io::Result<String> {
        let mut file = File::open(path)?;
        let mut buf = vec![0u8; CHUNK];
        match self {
            ChecksumAlgo::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
            ChecksumAlgo::Sha512 => {
                let mut hasher = Sha512::new();
                loop {
                    let n = file.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
        }
    }
}

/// Hash each successfully fetched file and record the digest, local size and
/// a verification verdict against the advertised remote size.
///
/// An unreadable file gets a null hash rather than failing the entry; the
/// download itself already succeeded.
pub struct Checksum {
    algo: ChecksumAlgo,
}

impl Checksum {
    pub fn from_args(args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        let algo = match args.get("algo") {
            None | Some("sha256") => ChecksumAlgo::Sha256,
            Some("sha512") => ChecksumAlgo::Sha512,
            Some(other) => {
                return Err(HookError::InvalidOption {
                    hook: "checksum".to_string(),
                    key: "algo".to_string(),
                    reason: format!("expected sha256 or sha512, got `{other}`"),
                });
            }
        };
        Ok(Arc::new(Checksum { algo }))
    }

    fn annotate(&self, item: &mut terrafetch_core::WorkItem) {
        let Some(dest) = item.dest.clone() else {
            return;
        };
        let key = format!("{}_hash", self.algo.as_str());
        match self.algo.digest_file(&dest) {
            Ok(digest) => item.set_meta(key, digest),
            Err(e) => {
                warn!("checksum failed for {}: {e}", dest.display());
                item.set_meta(key, Value::Null);
            }
        }

        let local_size = std::fs::metadata(&dest).map(|m| m.len()).ok();
        if let Some(size) = local_size {
            item.set_meta("local_size", size);
        }
        let verdict = match (local_size, item.meta_u64("remote_size")) {
            (Some(l), Some(r)) if l == r => "ok",
            (Some(_), Some(_)) => "size-mismatch",
            _ => "unverified",
        };
        item.set_meta("verification", verdict);
    }
}

impl Hook for Checksum {
    fn name(&self) -> &str {
        "checksum"
    }

    fn stage(&self) -> Stage {
        Stage::File
    }

    fn category(&self) -> &str {
        "metadata"
    }

    fn options(&self) -> Value {
        json!({ "algo": self.algo.as_str() })
    }

    fn run(&self, mut entries: Vec<Entry>) -> HookResult {
        for (_, item) in entries.iter_mut().filter(|(_, i)| i.is_success()) {
            self.annotate(item);
        }
        Ok(entries)
    }
}

/// Stamp entries with fetch timestamps and a content type guessed from the
/// destination extension.
pub struct Enrich;

impl Enrich {
    pub fn from_args(_args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        Ok(Arc::new(Enrich))
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("tif") | Some("tiff") => "image/tiff",
        Some("json") | Some("geojson") => "application/json",
        Some("xml") | Some("gml") => "application/xml",
        Some("zip") => "application/zip",
        Some("gz") | Some("tgz") => "application/gzip",
        Some("las") | Some("laz") => "application/vnd.laszip",
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

impl Hook for Enrich {
    fn name(&self) -> &str {
        "enrich"
    }

    fn stage(&self) -> Stage {
        Stage::File
    }

    fn category(&self) -> &str {
        "metadata"
    }

    fn run(&self, mut entries: Vec<Entry>) -> HookResult {
        let now = Utc::now().to_rfc3339();
        for (owner, item) in entries.iter_mut() {
            item.set_meta("fetched_at", now.clone());
            item.set_meta("module", owner.name.clone());
            if let Some(dest) = &item.dest {
                item.set_meta("content_type", content_type_for(dest));
            }
        }
        Ok(entries)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AuditFormat {
    Json,
    Csv,
    Text,
}

impl AuditFormat {
    fn as_str(self) -> &'static str {
        match self {
            AuditFormat::Json => "json",
            AuditFormat::Csv => "csv",
            AuditFormat::Text => "text",
        }
    }
}

/// Write a per-run summary of final statuses to a report file.
///
/// Runs at the post stage; a report that cannot be written is logged and the
/// entries still pass through untouched.
pub struct Audit {
    path: std::path::PathBuf,
    format: AuditFormat,
}

impl Audit {
    pub fn from_args(args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        let format = match args.get("format") {
            None | Some("json") => AuditFormat::Json,
            Some("csv") => AuditFormat::Csv,
            Some("text") => AuditFormat::Text,
            Some(other) => {
                return Err(HookError::InvalidOption {
                    hook: "audit".to_string(),
                    key: "format".to_string(),
                    reason: format!("expected json, csv or text, got `{other}`"),
                });
            }
        };
        let path = args
            .get("path")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| {
                std::path::PathBuf::from(format!("fetch-audit.{}", format.as_str()))
            });
        Ok(Arc::new(Audit { path, format }))
    }

    fn render(&self, entries: &[Entry]) -> Result<(), HookError> {
        let file = File::create(&self.path)?;
        let mut out = BufWriter::new(file);
        match self.format {
            AuditFormat::Json => {
                let records: Vec<Value> = entries
                    .iter()
                    .map(|(owner, item)| {
                        json!({
                            "module": owner.name,
                            "url": item.url,
                            "dest": item.dest.as_ref().map(|p| p.display().to_string()),
                            "status": item.status,
                            "metadata": item.metadata,
                        })
                    })
                    .collect();
                serde_json::to_writer_pretty(&mut out, &records)?;
                out.write_all(b"\n")?;
            }
            AuditFormat::Csv => {
                let mut writer = csv::Writer::from_writer(out);
                writer.write_record(["module", "url", "dest", "status"])?;
                for (owner, item) in entries {
                    writer.write_record([
                        owner.name.as_str(),
                        item.url.as_str(),
                        &item
                            .dest
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default(),
                        &item.status.map(|s| s.to_string()).unwrap_or_default(),
                    ])?;
                }
                writer.flush()?;
            }
            AuditFormat::Text => {
                let ok = entries.iter().filter(|(_, i)| i.is_success()).count();
                writeln!(out, "fetched {ok}/{} files at {}", entries.len(), Utc::now().to_rfc3339())?;
                for (owner, item) in entries {
                    writeln!(
                        out,
                        "{:>4}  {}  {}",
                        item.status.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
                        owner.name,
                        item.url
                    )?;
                }
            }
        }
        Ok(())
    }
}

impl Hook for Audit {
    fn name(&self) -> &str {
        "audit"
    }

    fn stage(&self) -> Stage {
        Stage::Post
    }

    fn category(&self) -> &str {
        "reporting"
    }

    fn options(&self) -> Value {
        json!({ "path": self.path.display().to_string(), "format": self.format.as_str() })
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult {
        match self.render(&entries) {
            Ok(()) => debug!("audit report written to {}", self.path.display()),
            Err(e) => warn!("audit report not written: {e}"),
        }
        Ok(entries)
    }
}
