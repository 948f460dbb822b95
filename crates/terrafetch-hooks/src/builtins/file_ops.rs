//! Hooks that move, expand or hand fetched files to external tools.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::args::HookArgs;
use crate::error::HookError;
use crate::{Entry, Hook, HookResult, Stage};

/// Expand zip archives in place, replacing each archive entry with one entry
/// per extracted member.
///
/// Non-archive and failed entries pass through untouched, as does an archive
/// that fails to open or extract; expansion is best-effort per entry.
pub struct Unzip {
    overwrite: bool,
    remove: bool,
}

impl Unzip {
    pub fn from_args(args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        Ok(Arc::new(Unzip {
            overwrite: args.get_bool("unzip", "overwrite", false)?,
            remove: args.get_bool("unzip", "remove", false)?,
        }))
    }

    fn is_archive(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"))
    }

    /// Member paths the archive would extract to, rooted at `dir`. Entries
    /// outside the root (zip-slip) are dropped.
    fn member_paths(archive: &mut ZipArchive<File>, dir: &Path) -> Result<Vec<PathBuf>, HookError> {
        let mut paths = Vec::new();
        for i in 0..archive.len() {
            let member = archive.by_index(i)?;
            if member.is_dir() {
                continue;
            }
            match member.enclosed_name() {
                Some(rel) => paths.push(dir.join(rel)),
                None => warn!("skipping unsafe archive member `{}`", member.name()),
            }
        }
        Ok(paths)
    }

    fn expand(&self, archive_path: &Path) -> Result<Vec<PathBuf>, HookError> {
        let dir = archive_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let mut archive = ZipArchive::new(File::open(archive_path)?)?;
        let targets = Self::member_paths(&mut archive, &dir)?;

        let all_present = !targets.is_empty() && targets.iter().all(|p| p.exists());
        if all_present && !self.overwrite {
            debug!("{} already extracted, skipping", archive_path.display());
            return Ok(targets);
        }

        for i in 0..archive.len() {
            let mut member = archive.by_index(i)?;
            let Some(rel) = member.enclosed_name() else {
                continue;
            };
            let target = dir.join(rel);
            if member.is_dir() {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            std::io::copy(&mut member, &mut out)?;
        }
        Ok(targets)
    }
}

impl Hook for Unzip {
    fn name(&self) -> &str {
        "unzip"
    }

    fn stage(&self) -> Stage {
        Stage::File
    }

    fn category(&self) -> &str {
        "file-op"
    }

    fn options(&self) -> Value {
        json!({ "overwrite": self.overwrite, "remove": self.remove })
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult {
        let mut out = Vec::with_capacity(entries.len());
        for (owner, item) in entries {
            let expandable = item.is_success()
                && item.dest.as_deref().is_some_and(Self::is_archive);
            if !expandable {
                out.push((owner, item));
                continue;
            }
            let archive_path = item.dest.clone().unwrap_or_default();
            match self.expand(&archive_path) {
                Ok(extracted) => {
                    debug!(
                        "expanded {} into {} files",
                        archive_path.display(),
                        extracted.len()
                    );
                    for path in extracted {
                        let mut derived = item.derive(path);
                        derived.set_meta("src_archive", archive_path.display().to_string());
                        out.push((owner.clone(), derived));
                    }
                    if self.remove
                        && let Err(e) = std::fs::remove_file(&archive_path)
                    {
                        warn!("could not remove {}: {e}", archive_path.display());
                    }
                }
                Err(e) => {
                    warn!("could not expand {}: {e}", archive_path.display());
                    out.push((owner, item));
                }
            }
        }
        Ok(out)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlattenMode {
    /// Directly under the owning module's output directory.
    Module,
    /// Directly under the parent of the module's output directory.
    Root,
    /// Bare filename, resolved against the working directory.
    Cwd,
}

/// Rewrite destinations so files land in a single directory instead of
/// whatever tree their URLs imply. Runs before any download.
pub struct Flatten {
    mode: FlattenMode,
}

impl Flatten {
    pub fn from_args(args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        let mode = match args.get("mode") {
            None | Some("module") => FlattenMode::Module,
            Some("root") => FlattenMode::Root,
            Some("cwd") => FlattenMode::Cwd,
            Some(other) => {
                return Err(HookError::InvalidOption {
                    hook: "flatten".to_string(),
                    key: "mode".to_string(),
                    reason: format!("expected module, root or cwd, got `{other}`"),
                });
            }
        };
        Ok(Arc::new(Flatten { mode }))
    }
}

impl Hook for Flatten {
    fn name(&self) -> &str {
        "flatten"
    }

    fn stage(&self) -> Stage {
        Stage::Pre
    }

    fn category(&self) -> &str {
        "file-op"
    }

    fn options(&self) -> Value {
        json!({ "mode": match self.mode {
            FlattenMode::Module => "module",
            FlattenMode::Root => "root",
            FlattenMode::Cwd => "cwd",
        }})
    }

    fn run(&self, mut entries: Vec<Entry>) -> HookResult {
        for (owner, item) in entries.iter_mut() {
            let Some(filename) = item.dest.as_deref().and_then(|p| p.file_name()) else {
                continue;
            };
            let filename = filename.to_os_string();
            item.dest = Some(match self.mode {
                FlattenMode::Module => owner.out_dir.join(filename),
                FlattenMode::Root => owner
                    .out_dir
                    .parent()
                    .unwrap_or(owner.out_dir.as_path())
                    .join(filename),
                FlattenMode::Cwd => PathBuf::from(filename),
            });
        }
        Ok(entries)
    }
}

/// Run a shell-less command per fetched file, with placeholder substitution.
///
/// `{file}` is the destination path, `{dir}` its parent, `{filename}` its
/// basename, `{name}` the owning module and `{url}` the source URL. A
/// non-zero exit is logged and the entry still passes through.
pub struct Exec {
    cmd: String,
}

impl Exec {
    pub fn from_args(args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        let cmd = args.get("cmd").ok_or_else(|| HookError::InvalidOption {
            hook: "exec".to_string(),
            key: "cmd".to_string(),
            reason: "missing required command template".to_string(),
        })?;
        Ok(Arc::new(Exec {
            cmd: cmd.to_string(),
        }))
    }

    fn expand(&self, owner_name: &str, url: &str, dest: &Path) -> String {
        self.cmd
            .replace("{file}", &dest.display().to_string())
            .replace(
                "{dir}",
                &dest.parent().unwrap_or(Path::new(".")).display().to_string(),
            )
            .replace(
                "{filename}",
                &dest
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
            .replace("{name}", owner_name)
            .replace("{url}", url)
    }
}

impl Hook for Exec {
    fn name(&self) -> &str {
        "exec"
    }

    fn stage(&self) -> Stage {
        Stage::File
    }

    fn category(&self) -> &str {
        "file-op"
    }

    fn options(&self) -> Value {
        json!({ "cmd": self.cmd })
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult {
        for (owner, item) in entries.iter().filter(|(_, i)| i.is_success()) {
            let Some(dest) = &item.dest else { continue };
            let line = self.expand(&owner.name, &item.url, dest);
            let mut words = line.split_whitespace();
            let Some(program) = words.next() else {
                continue;
            };
            match Command::new(program).args(words).status() {
                Ok(status) if status.success() => {
                    debug!("`{line}` succeeded");
                }
                Ok(status) => warn!("`{line}` exited with {status}"),
                Err(e) => warn!("`{line}` failed to start: {e}"),
            }
        }
        Ok(entries)
    }
}
