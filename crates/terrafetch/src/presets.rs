//! Named hook chains for common workflows, expanded before registry lookup.

/// `(name, description, hook specs in chain order)`
pub static PRESETS: &[(&str, &str, &[&str])] = &[
    (
        "inspect",
        "Report what would be fetched without fetching",
        &["dryrun", "inventory"],
    ),
    (
        "verify",
        "Hash and annotate every fetched file",
        &["checksum", "enrich"],
    ),
    (
        "lidar-clean",
        "Expand archives and keep only point-cloud tiles",
        &["unzip:remove=true", "filename_filter:match=.laz"],
    ),
    (
        "flat-audit",
        "Flatten module trees and write a run report",
        &["flatten", "audit"],
    ),
];

pub fn preset(name: &str) -> Option<&'static [&'static str]> {
    PRESETS
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, _, chain)| *chain)
}
