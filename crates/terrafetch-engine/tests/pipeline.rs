//! End-to-end runs over `file://` sources, exercising stage ordering,
//! cancellation, hook failure semantics and teardown guarantees.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use terrafetch_core::{CancelToken, ProducerInfo, STATUS_OK, WorkItem};
use terrafetch_engine::{EngineError, EngineOptions, Producer, run_pipeline};
use terrafetch_hooks::builtins::filter::FilenameFilter;
use terrafetch_hooks::builtins::pipeline::DryRun;
use terrafetch_hooks::{
    Entry, HISTORY_KEY, Hook, HookArgs, HookError, HookFailure, HookResult, Stage,
};

enum Behavior {
    Pass,
    Fail,
    Cancel(CancelToken),
}

/// Test double that logs every invocation into a shared journal.
struct Recorder {
    name: String,
    stage: Stage,
    behavior: Behavior,
    journal: Arc<Mutex<Vec<String>>>,
    teardowns: Arc<AtomicUsize>,
}

impl Recorder {
    fn new(name: &str, stage: Stage, journal: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            stage,
            behavior: Behavior::Pass,
            journal: Arc::clone(journal),
            teardowns: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn with_behavior(name: &str, stage: Stage, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            stage,
            behavior,
            journal: Arc::new(Mutex::new(Vec::new())),
            teardowns: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl Hook for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        self.stage
    }

    fn run(&self, entries: Vec<Entry>) -> HookResult {
        self.journal.lock().unwrap().push(self.name.clone());
        match &self.behavior {
            Behavior::Pass => Ok(entries),
            Behavior::Fail => Err(HookFailure {
                entries,
                error: HookError::Other("induced failure".to_string()),
            }),
            Behavior::Cancel(token) => {
                token.cancel();
                Ok(entries)
            }
        }
    }

    fn teardown(&self) -> Result<(), HookError> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn seed_sources(dir: &Path, names: &[&str]) -> Vec<String> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            format!("file://{}", path.display())
        })
        .collect()
}

fn out_names(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|(_, item)| item.dest.as_ref())
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn fetches_every_file_and_sets_status_exactly_once() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let urls = seed_sources(src.path(), &["a.tif", "b.tif"]);

    let producer = Producer::from_urls("dem", out.path(), &urls, "raster");
    let result = run_pipeline(vec![producer], Vec::new(), &EngineOptions::default())
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    for (_, item) in &result {
        assert_eq!(item.status, Some(STATUS_OK));
        assert!(item.dest.as_ref().unwrap().exists());
    }
}

#[tokio::test]
async fn empty_queue_after_pre_stage_ends_the_run_with_teardown() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let urls = seed_sources(
        src.path(),
        &["a.tif", "b.tif", "c.tif", "d.tif", "e.tif"],
    );

    let journal = Arc::new(Mutex::new(Vec::new()));
    let post = Recorder::new("post-observer", Stage::Post, &journal);
    let teardowns = Arc::clone(&post.teardowns);
    let globals: Vec<Arc<dyn Hook>> =
        vec![DryRun::from_args(&HookArgs::new()).unwrap(), post];

    let producer = Producer::from_urls("dem", out.path(), &urls, "raster");
    let result = run_pipeline(vec![producer], globals, &EngineOptions::default())
        .await
        .unwrap();

    assert!(result.is_empty());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    // the post hook never ran, but was still torn down
    assert!(journal.lock().unwrap().is_empty());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_during_pre_stage_skips_all_downloads() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let urls = seed_sources(src.path(), &["a.tif"]);

    let token = CancelToken::new();
    let canceller =
        Recorder::with_behavior("canceller", Stage::Pre, Behavior::Cancel(token.clone()));
    let teardowns = Arc::clone(&canceller.teardowns);

    let opts = EngineOptions {
        cancel: token,
        ..EngineOptions::default()
    };
    let producer = Producer::from_urls("dem", out.path(), &urls, "raster");
    let result = run_pipeline(vec![producer], vec![canceller], &opts).await;

    assert!(matches!(result, Err(EngineError::Cancelled)));
    assert!(!out.path().join("a.tif").exists());
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_hook_passes_entries_through_and_is_torn_down() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let urls = seed_sources(src.path(), &["a.tif"]);

    let failing = Recorder::with_behavior("saboteur", Stage::File, Behavior::Fail);
    let teardowns = Arc::clone(&failing.teardowns);

    let producer = Producer::from_urls("dem", out.path(), &urls, "raster");
    let result = run_pipeline(vec![producer], vec![failing], &EngineOptions::default())
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].1.status, Some(STATUS_OK));
    // a failed application leaves no history record
    assert!(!result[0].1.metadata.contains_key(HISTORY_KEY));
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn file_chain_runs_global_hooks_before_module_hooks() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let urls = seed_sources(src.path(), &["a.tif"]);

    let journal = Arc::new(Mutex::new(Vec::new()));
    let global: Arc<dyn Hook> = Recorder::new("global", Stage::File, &journal);
    let first: Arc<dyn Hook> = Recorder::new("module-first", Stage::File, &journal);
    let second: Arc<dyn Hook> = Recorder::new("module-second", Stage::File, &journal);

    let producer =
        Producer::from_urls("dem", out.path(), &urls, "raster").with_hooks(vec![first, second]);
    run_pipeline(vec![producer], vec![global], &EngineOptions::default())
        .await
        .unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec!["global", "module-first", "module-second"]
    );
}

#[tokio::test]
async fn structurally_equal_hooks_run_once_per_item() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let urls = seed_sources(src.path(), &["a.tif"]);

    let journal = Arc::new(Mutex::new(Vec::new()));
    let global: Arc<dyn Hook> = Recorder::new("twin", Stage::File, &journal);
    let scoped: Arc<dyn Hook> = Recorder::new("twin", Stage::File, &journal);

    let producer = Producer::from_urls("dem", out.path(), &urls, "raster").with_hooks(vec![scoped]);
    run_pipeline(vec![producer], vec![global], &EngineOptions::default())
        .await
        .unwrap();

    assert_eq!(journal.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn filename_filter_trims_the_final_set() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let urls = seed_sources(src.path(), &["a.tif", "b.json", "c.tif"]);

    let (_, args) = HookArgs::parse_spec("filename_filter:match=.tif").unwrap();
    let filter = FilenameFilter::from_args(&args).unwrap();

    let producer = Producer::from_urls("dem", out.path(), &urls, "raster");
    let result = run_pipeline(vec![producer], vec![filter], &EngineOptions::default())
        .await
        .unwrap();

    let mut names = out_names(&result);
    names.sort();
    assert_eq!(names, vec!["a.tif", "c.tif"]);
}

#[tokio::test]
async fn undownloadable_items_bypass_transfer_and_file_hooks() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let observer: Arc<dyn Hook> = Recorder::new("observer", Stage::File, &journal);

    let info = ProducerInfo::new("index", PathBuf::from("/tmp/index"));
    let items = vec![WorkItem::undownloadable("https://host/api/list", "index")];
    let producer = Producer::new(info, items);

    let result = run_pipeline(vec![producer], vec![observer], &EngineOptions::default())
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].1.status, None);
    assert!(journal.lock().unwrap().is_empty());
}

#[tokio::test]
async fn successful_hook_applications_are_recorded_in_history() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let urls = seed_sources(src.path(), &["a.tif"]);

    let journal = Arc::new(Mutex::new(Vec::new()));
    let hook: Arc<dyn Hook> = Recorder::new("annotator", Stage::File, &journal);

    let producer = Producer::from_urls("dem", out.path(), &urls, "raster");
    let result = run_pipeline(vec![producer], vec![hook], &EngineOptions::default())
        .await
        .unwrap();

    let history = result[0].1.metadata.get(HISTORY_KEY).unwrap();
    let records = history.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["hook"], "annotator");
    assert_eq!(records[0]["stage"], "file");
}
