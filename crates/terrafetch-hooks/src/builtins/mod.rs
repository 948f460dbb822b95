//! Built-in hooks, grouped the way they act on the pipeline.

pub mod file_ops;
pub mod filter;
pub mod metadata;
pub mod pipeline;

use crate::registry::HookRegistry;

/// Static registration of every built-in hook.
pub fn register_all(registry: &mut HookRegistry) {
    registry.register(
        "dryrun",
        "Clear the download queue (simulate only).",
        pipeline::DryRun::from_args,
    );
    registry.register(
        "list",
        "Print discovered URLs to stdout.",
        pipeline::ListEntries::from_args,
    );
    registry.register(
        "inventory",
        "Print a metadata inventory. Usage: inventory:format=csv",
        pipeline::Inventory::from_args,
    );
    registry.register(
        "pipe",
        "Print absolute file paths to stdout for piping.",
        pipeline::PipeOutput::from_args,
    );
    registry.register(
        "filename_filter",
        "Filter results by filename. Usage: filename_filter:match=.tif",
        filter::FilenameFilter::from_args,
    );
    registry.register(
        "checksum",
        "Calculate file checksums (sha256/sha512). Usage: checksum:algo=sha256",
        metadata::Checksum::from_args,
    );
    registry.register(
        "enrich",
        "Add file timestamps and content types to metadata.",
        metadata::Enrich::from_args,
    );
    registry.register(
        "audit",
        "Save a run summary to a file. Usage: audit:path=log.json:format=csv",
        metadata::Audit::from_args,
    );
    registry.register(
        "unzip",
        "Extract .zip archives. Usage: unzip:remove=true:overwrite=false",
        file_ops::Unzip::from_args,
    );
    registry.register(
        "flatten",
        "Rewrite destination directories. Usage: flatten:mode=root",
        file_ops::Flatten::from_args,
    );
    registry.register(
        "exec",
        "Run a command per file. Usage: exec:cmd={file}",
        file_ops::Exec::from_args,
    );
}
