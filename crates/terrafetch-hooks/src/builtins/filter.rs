//! Predicate filtering over pipeline entries.

use std::sync::Arc;

use regex::Regex;
use serde_json::{Value, json};
use tracing::debug;

use crate::args::HookArgs;
use crate::error::HookError;
use crate::{Entry, Hook, HookResult, Stage};

/// Keep or drop entries by destination filename.
///
/// Returns a subset of its input in the original relative order; never adds
/// items. Stage-configurable: defaults to the file stage, but can run before
/// any download (cheap pruning) or after everything (result trimming).
pub struct FilenameFilter {
    matches: Option<Matcher>,
    excludes: Option<Matcher>,
    stage: Stage,
}

enum Matcher {
    Substring(String),
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, name: &str) -> bool {
        match self {
            Matcher::Substring(s) => name.contains(s.as_str()),
            Matcher::Pattern(re) => re.is_match(name),
        }
    }

    fn source(&self) -> &str {
        match self {
            Matcher::Substring(s) => s,
            Matcher::Pattern(re) => re.as_str(),
        }
    }
}

impl FilenameFilter {
    pub fn from_args(args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        let regex = args.get_bool("filename_filter", "regex", false)?;
        let stage = match args.get("stage") {
            None => Stage::File,
            Some(raw) => Stage::parse(raw).ok_or_else(|| HookError::InvalidOption {
                hook: "filename_filter".to_string(),
                key: "stage".to_string(),
                reason: format!("expected pre, file or post, got `{raw}`"),
            })?,
        };

        let build = |pattern: &str| -> Result<Matcher, HookError> {
            if regex {
                Regex::new(pattern)
                    .map(Matcher::Pattern)
                    .map_err(|e| HookError::InvalidOption {
                        hook: "filename_filter".to_string(),
                        key: "match".to_string(),
                        reason: e.to_string(),
                    })
            } else {
                Ok(Matcher::Substring(pattern.to_string()))
            }
        };

        Ok(Arc::new(FilenameFilter {
            matches: args.get("match").map(&build).transpose()?,
            excludes: args.get("exclude").map(&build).transpose()?,
            stage,
        }))
    }

    /// Substring filter at the default (file) stage; test convenience.
    pub fn substring(matches: Option<&str>, excludes: Option<&str>) -> Self {
        Self {
            matches: matches.map(|s| Matcher::Substring(s.to_string())),
            excludes: excludes.map(|s| Matcher::Substring(s.to_string())),
            stage: Stage::File,
        }
    }

    fn keeps(&self, entry: &Entry) -> bool {
        let filename = entry
            .1
            .dest
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(m) = &self.matches
            && !m.is_match(&filename)
        {
            return false;
        }
        if let Some(x) = &self.excludes
            && x.is_match(&filename)
        {
            return false;
        }
        true
    }
}

impl Hook for FilenameFilter {
    fn name(&self) -> &str {
        "filename_filter"
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn category(&self) -> &str {
        "file-op"
    }

    fn options(&self) -> Value {
        json!({
            "match": self.matches.as_ref().map(Matcher::source),
            "exclude": self.excludes.as_ref().map(Matcher::source),
            "regex": self.matches.as_ref().map(|m| matches!(m, Matcher::Pattern(_))).unwrap_or(false),
            "stage": self.stage.as_str(),
        })
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult {
        let before = entries.len();
        let kept: Vec<Entry> = entries.into_iter().filter(|e| self.keeps(e)).collect();
        debug!("filename_filter kept {}/{} entries", kept.len(), before);
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrafetch_core::{ProducerInfo, WorkItem};

    fn entries(names: &[&str]) -> Vec<Entry> {
        let owner = ProducerInfo::new("dem", "/tmp/dem");
        names
            .iter()
            .map(|n| {
                crate::entry(
                    &owner,
                    WorkItem::new(format!("https://x/{n}"), format!("/tmp/dem/{n}"), "raster"),
                )
            })
            .collect()
    }

    #[test]
    fn match_keeps_subset_in_original_order() {
        let filter = FilenameFilter::substring(Some(".tif"), None);
        let out = filter.run(entries(&["a.tif", "b.json", "c.tif"])).unwrap();
        let names: Vec<_> = out
            .iter()
            .map(|(_, i)| i.dest.as_ref().unwrap().file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.tif", "c.tif"]);
    }

    #[test]
    fn exclude_discards_matches() {
        let filter = FilenameFilter::substring(None, Some(".xml"));
        let out = filter.run(entries(&["a.tif", "a.xml"])).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn regex_mode_anchors_patterns() {
        let (name, args) = HookArgs::parse_spec("filename_filter:match=\\.la[sz]$:regex=true").unwrap();
        assert_eq!(name, "filename_filter");
        let filter = FilenameFilter::from_args(&args).unwrap();
        let out = filter.run(entries(&["a.las", "b.laz", "c.lasx"])).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn missing_destination_fails_a_match() {
        let owner = ProducerInfo::new("dem", "/tmp/dem");
        let filter = FilenameFilter::substring(Some(".tif"), None);
        let out = filter
            .run(vec![crate::entry(&owner, WorkItem::undownloadable("https://x", "index"))])
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn stage_override_parses() {
        let (_, args) = HookArgs::parse_spec("filename_filter:match=.tif:stage=pre").unwrap();
        let filter = FilenameFilter::from_args(&args).unwrap();
        assert_eq!(filter.stage(), Stage::Pre);
    }
}
