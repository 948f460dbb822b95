use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use terrafetch::presets;
use terrafetch::recipe::Recipe;
use terrafetch_engine::{EngineOptions, Producer, run_pipeline};
use terrafetch_hooks::{Hook, HookArgs, HookRegistry};

const PB_STYLE: &str =
    "{spinner:.blue} {prefix:>10.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} ({eta})";

static PB_TEMPLATE: Lazy<Option<ProgressStyle>> =
    Lazy::new(|| ProgressStyle::with_template(PB_STYLE).ok());

#[derive(Parser)]
#[command(name = "terrafetch", version, about = "Fetch geospatial datasets through a hook pipeline")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a recipe file (.toml or .json)
    Run {
        recipe: PathBuf,

        /// Discover and report only, fetch nothing
        #[arg(long)]
        dry_run: bool,

        /// Extra global hook spec, repeatable: --hook checksum:algo=sha512
        #[arg(long = "hook")]
        hooks: Vec<String>,

        /// Override the recipe's worker count
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Fetch URLs directly into a directory
    Fetch {
        #[arg(required = true)]
        urls: Vec<String>,

        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Hook spec, repeatable: --hook unzip:remove=true
        #[arg(long = "hook")]
        hooks: Vec<String>,

        /// Named hook chain, see `terrafetch hooks`
        #[arg(long)]
        preset: Option<String>,

        #[arg(short, long)]
        threads: Option<usize>,

        /// Re-download files that already exist
        #[arg(long)]
        overwrite: bool,
    },

    /// List registered hooks and preset chains
    Hooks,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let registry = HookRegistry::default();
    match cli.command {
        Command::Run {
            recipe,
            dry_run,
            hooks,
            threads,
        } => run_recipe(&registry, &recipe, dry_run, hooks, threads).await,
        Command::Fetch {
            urls,
            out_dir,
            hooks,
            preset,
            threads,
            overwrite,
        } => fetch_urls(&registry, urls, out_dir, hooks, preset, threads, overwrite).await,
        Command::Hooks => {
            list_hooks(&registry);
            Ok(())
        }
    }
}

async fn run_recipe(
    registry: &HookRegistry,
    path: &Path,
    dry_run: bool,
    hooks: Vec<String>,
    threads: Option<usize>,
) -> Result<()> {
    let recipe = Recipe::load(path).with_context(|| format!("loading {}", path.display()))?;
    let base = path.parent().unwrap_or(Path::new("."));
    let (producers, mut globals) = recipe.assemble(registry, base)?;

    for spec in &hooks {
        globals.push(registry.build_spec(spec)?);
    }
    if dry_run {
        globals.insert(0, registry.build_spec("inventory")?);
        globals.insert(0, registry.build("dryrun", &HookArgs::new())?);
    }

    let opts = EngineOptions {
        threads: threads.or(recipe.threads).unwrap_or(4),
        ..EngineOptions::default()
    };
    execute(producers, globals, opts).await
}

async fn fetch_urls(
    registry: &HookRegistry,
    urls: Vec<String>,
    out_dir: PathBuf,
    hooks: Vec<String>,
    preset: Option<String>,
    threads: Option<usize>,
    overwrite: bool,
) -> Result<()> {
    let mut specs: Vec<String> = Vec::new();
    if let Some(name) = preset {
        let chain =
            presets::preset(&name).ok_or_else(|| anyhow!("unknown preset `{name}`"))?;
        specs.extend(chain.iter().map(|s| s.to_string()));
    }
    specs.extend(hooks);

    let globals = specs
        .iter()
        .map(|spec| registry.build_spec(spec))
        .collect::<Result<Vec<Arc<dyn Hook>>, _>>()?;

    let producer = Producer::from_urls("adhoc", &out_dir, &urls, "data");
    let opts = EngineOptions {
        threads: threads.unwrap_or(4),
        overwrite,
        ..EngineOptions::default()
    };
    execute(vec![producer], globals, opts).await
}

/// Drive one run with an interrupt handler and a progress bar wired in.
async fn execute(
    producers: Vec<Producer>,
    globals: Vec<Arc<dyn Hook>>,
    mut opts: EngineOptions,
) -> Result<()> {
    let cancel = opts.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, winding the run down");
            cancel.cancel();
        }
    });

    let bar = match PB_TEMPLATE.as_ref() {
        Some(style) => ProgressBar::no_length().with_style(style.clone()),
        None => ProgressBar::no_length(),
    };
    bar.set_prefix("fetching");
    let pb = bar.clone();
    opts.on_progress = Some(Arc::new(move |done, total| {
        pb.set_length(total);
        pb.set_position(done);
    }));

    let result = run_pipeline(producers, globals, &opts).await;
    bar.finish_and_clear();

    let entries = result?;
    let ok = entries.iter().filter(|(_, item)| item.is_success()).count();
    println!("{ok}/{} files fetched", entries.len());
    Ok(())
}

fn list_hooks(registry: &HookRegistry) {
    println!("hooks:");
    for (name, desc) in registry.iter() {
        println!("  {name:<18} {desc}");
    }
    println!("\npresets:");
    for (name, desc, chain) in presets::PRESETS {
        println!("  {name:<18} {desc}: {}", chain.join(" -> "));
    }
}
