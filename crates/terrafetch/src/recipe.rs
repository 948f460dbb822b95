//! Declarative run descriptions, loaded from TOML or JSON.
//!
//! A recipe names a set of modules (URL lists with an output directory and
//! scoped hooks) plus run-wide hooks and settings. `assemble` turns it into
//! the producers and global hook chain the engine consumes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use terrafetch_engine::Producer;
use terrafetch_hooks::{Hook, HookArgs, HookError, HookRegistry};

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("unsupported recipe format `{0}`, expected .toml or .json")]
    UnknownFormat(String),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Either a compact `name:key=val` spec string or an explicit table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum HookSpec {
    Spec(String),
    Table {
        name: String,
        #[serde(default)]
        args: BTreeMap<String, String>,
    },
}

impl HookSpec {
    fn build(&self, registry: &HookRegistry) -> Result<Arc<dyn Hook>, HookError> {
        match self {
            HookSpec::Spec(spec) => registry.build_spec(spec),
            HookSpec::Table { name, args } => {
                registry.build(name, &HookArgs::from_map(args.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    pub urls: Vec<String>,
    /// Defaults to a directory named after the module.
    pub out_dir: Option<PathBuf>,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
}

fn default_data_type() -> String {
    "data".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recipe {
    pub project: Option<String>,
    pub threads: Option<usize>,
    #[serde(default)]
    pub global_hooks: Vec<HookSpec>,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

impl Recipe {
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let body = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "toml" => Ok(toml::from_str(&body)?),
            "json" => Ok(serde_json::from_str(&body)?),
            other => Err(RecipeError::UnknownFormat(other.to_string())),
        }
    }

    /// Resolve every hook spec against `registry` and build the engine
    /// inputs. Module output directories are resolved relative to `base`.
    pub fn assemble(
        &self,
        registry: &HookRegistry,
        base: &Path,
    ) -> Result<(Vec<Producer>, Vec<Arc<dyn Hook>>), RecipeError> {
        let globals = self
            .global_hooks
            .iter()
            .map(|spec| spec.build(registry))
            .collect::<Result<Vec<_>, _>>()?;

        let mut producers = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            let out_dir = match &module.out_dir {
                Some(dir) if dir.is_absolute() => dir.clone(),
                Some(dir) => base.join(dir),
                None => base.join(&module.name),
            };
            let hooks = module
                .hooks
                .iter()
                .map(|spec| spec.build(registry))
                .collect::<Result<Vec<_>, _>>()?;
            producers.push(
                Producer::from_urls(&module.name, out_dir, &module.urls, &module.data_type)
                    .with_hooks(hooks),
            );
        }
        Ok((producers, globals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_RECIPE: &str = r#"
project = "coastal"
threads = 8
global_hooks = ["checksum", { name = "audit", args = { path = "audit.json" } }]

[[modules]]
name = "dem"
urls = ["https://host/n40w105.tif"]
out_dir = "raster/dem"
data_type = "raster"
hooks = ["filename_filter:match=.tif"]

[[modules]]
name = "lidar"
urls = ["https://host/tile.laz"]
"#;

    #[test]
    fn toml_recipe_assembles_producers_and_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, TOML_RECIPE).unwrap();

        let recipe = Recipe::load(&path).unwrap();
        assert_eq!(recipe.project.as_deref(), Some("coastal"));
        assert_eq!(recipe.threads, Some(8));

        let registry = HookRegistry::default();
        let (producers, globals) = recipe.assemble(&registry, dir.path()).unwrap();
        assert_eq!(producers.len(), 2);
        assert_eq!(globals.len(), 2);
        assert_eq!(producers[0].info.out_dir, dir.path().join("raster/dem"));
        // out_dir defaults to the module name
        assert_eq!(producers[1].info.out_dir, dir.path().join("lidar"));
        assert_eq!(producers[0].hooks.len(), 1);
    }

    #[test]
    fn json_recipe_parses_too() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"modules": [{"name": "dem", "urls": ["https://host/a.tif"]}]}"#,
        )
        .unwrap();

        let recipe = Recipe::load(&path).unwrap();
        assert_eq!(recipe.modules.len(), 1);
        assert_eq!(recipe.modules[0].data_type, "data");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "modules: []").unwrap();
        assert!(matches!(
            Recipe::load(&path),
            Err(RecipeError::UnknownFormat(_))
        ));
    }

    #[test]
    fn unknown_hook_fails_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "global_hooks = [\"no_such_hook\"]\n").unwrap();

        let recipe = Recipe::load(&path).unwrap();
        let registry = HookRegistry::default();
        assert!(recipe.assemble(&registry, dir.path()).is_err());
    }
}
