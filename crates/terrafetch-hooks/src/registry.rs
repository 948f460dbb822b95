use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::args::HookArgs;
use crate::builtins;
use crate::error::HookError;
use crate::Hook;

pub type HookFactory = fn(&HookArgs) -> Result<Arc<dyn Hook>, HookError>;

struct Registration {
    desc: &'static str,
    factory: HookFactory,
}

/// Name-to-factory lookup for hooks.
///
/// Built-ins register at construction; external hooks register explicitly at
/// startup. Duplicate names overwrite with a warning, last registration wins.
pub struct HookRegistry {
    entries: BTreeMap<String, Registration>,
}

impl HookRegistry {
    pub fn empty() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Registry preloaded with every built-in hook.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        builtins::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &str, desc: &'static str, factory: HookFactory) {
        if self.entries.contains_key(name) {
            warn!("hook `{name}` registered twice; last registration wins");
        }
        self.entries.insert(name.to_string(), Registration { desc, factory });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn build(&self, name: &str, args: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
        let registration = self
            .entries
            .get(name)
            .ok_or_else(|| HookError::UnknownHook(name.to_string()))?;
        (registration.factory)(args)
    }

    /// Build from a `name:key=val` spec string.
    pub fn build_spec(&self, spec: &str) -> Result<Arc<dyn Hook>, HookError> {
        let (name, args) = HookArgs::parse_spec(spec)?;
        self.build(&name, &args)
    }

    /// Registered `(name, description)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.entries.iter().map(|(name, r)| (name.as_str(), r.desc))
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stage;

    #[test]
    fn builtins_are_registered() {
        let registry = HookRegistry::with_builtins();
        for name in [
            "dryrun", "list", "inventory", "filename_filter", "checksum", "enrich", "unzip",
            "flatten", "exec", "pipe", "audit",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn builds_configured_hooks_from_specs() {
        let registry = HookRegistry::with_builtins();
        let hook = registry.build_spec("filename_filter:match=.tif:stage=pre").unwrap();
        assert_eq!(hook.name(), "filename_filter");
        assert_eq!(hook.stage(), Stage::Pre);
        assert_eq!(hook.options()["match"], ".tif");
    }

    #[test]
    fn unknown_hook_is_an_error() {
        let registry = HookRegistry::with_builtins();
        assert!(matches!(
            registry.build_spec("reproject"),
            Err(HookError::UnknownHook(_))
        ));
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = HookRegistry::empty();
        fn first(_: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
            Ok(Arc::new(crate::builtins::pipeline::DryRun))
        }
        fn second(_: &HookArgs) -> Result<Arc<dyn Hook>, HookError> {
            Ok(Arc::new(crate::builtins::pipeline::ListEntries))
        }
        registry.register("x", "first", first);
        registry.register("x", "second", second);
        let hook = registry.build("x", &HookArgs::new()).unwrap();
        assert_eq!(hook.name(), "list");
    }
}
