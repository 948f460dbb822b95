//! The run loop: pre hooks, bounded-concurrency transfers, per-completion
//! file hooks, deferred-work draining, teardown, post hooks.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{FutureExt, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use terrafetch_core::{CancelToken, STATUS_FAILED};
use terrafetch_hooks::{Entry, Hook, Stage, log_hook_history, merge_hooks};
use terrafetch_transfer::{TransferClient, TransferError, TransferOptions};

use crate::producer::Producer;

/// Producers whose upstream TLS certificates are chronically broken;
/// verification is bypassed for them and only them.
const NO_VERIFY_TLS: &[&str] = &["mar_grav", "srtm_plus"];

pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("run cancelled")]
    Cancelled,

    #[error("transfer client: {0}")]
    Init(#[from] TransferError),
}

/// Run-wide knobs; per-transfer fields are fanned out into
/// [`TransferOptions`] for each item.
pub struct EngineOptions {
    /// Concurrent transfer ceiling.
    pub threads: usize,
    pub tries: u32,
    pub overwrite: bool,
    pub check_size: bool,
    pub timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub cancel: CancelToken,
    /// Invoked as `(completed, total)` after every finished transfer.
    pub on_progress: Option<ProgressFn>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            tries: 5,
            overwrite: false,
            check_size: true,
            timeout: Some(Duration::from_secs(30)),
            read_timeout: None,
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }
}

/// Execute a full fetch run over `producers` with `global_hooks` applied at
/// every stage.
///
/// Ordering contract: module pre hooks, then global pre hooks over the
/// flattened list; transfers with per-completion file-hook chains (global
/// hooks ahead of module hooks, structural duplicates dropped); deferred
/// work drained; every participating hook torn down exactly once; module
/// post hooks, then global post hooks. Teardown happens on every exit path
/// and always before any post hook. Cancellation skips the post stage and
/// surfaces as [`EngineError::Cancelled`].
pub async fn run_pipeline(
    mut producers: Vec<Producer>,
    global_hooks: Vec<Arc<dyn Hook>>,
    opts: &EngineOptions,
) -> Result<Vec<Entry>, EngineError> {
    let client = TransferClient::new()?;
    let roster = teardown_roster(&global_hooks, &producers);

    // Pre stage: module hooks first, each over its own module's entries,
    // then global hooks over the flattened list.
    let mut entries: Vec<Entry> = Vec::new();
    for producer in &mut producers {
        let items = std::mem::take(&mut producer.items);
        let mut mine: Vec<Entry> = items
            .into_iter()
            .map(|item| (Arc::clone(&producer.info), item))
            .collect();
        for hook in producer.hooks.iter().filter(|h| h.stage() == Stage::Pre) {
            mine = apply_hook(hook.as_ref(), mine);
        }
        entries.extend(mine);
    }
    for hook in global_hooks.iter().filter(|h| h.stage() == Stage::Pre) {
        entries = apply_hook(hook.as_ref(), entries);
    }

    if entries.is_empty() {
        info!("no files to fetch");
        run_teardown(&roster);
        return Ok(Vec::new());
    }
    if opts.cancel.is_cancelled() {
        run_teardown(&roster);
        return Err(EngineError::Cancelled);
    }

    // Per-module file-stage chains, computed once.
    let global_file: Vec<Arc<dyn Hook>> = global_hooks
        .iter()
        .filter(|h| h.stage() == Stage::File)
        .cloned()
        .collect();
    let mut file_chains: BTreeMap<usize, Vec<Arc<dyn Hook>>> = BTreeMap::new();
    for producer in &producers {
        let scoped: Vec<Arc<dyn Hook>> = producer
            .hooks
            .iter()
            .filter(|h| h.stage() == Stage::File)
            .cloned()
            .collect();
        file_chains.insert(producer.info.key(), merge_hooks(&global_file, &scoped));
    }

    // Items with no destination never touch the network or the file stage.
    let (downloadable, passthrough): (Vec<Entry>, Vec<Entry>) =
        entries.into_iter().partition(|(_, item)| item.dest.is_some());

    let total = downloadable.len() as u64;
    let workers = opts.threads.max(1);
    info!("fetching {total} files with {workers} workers");

    let mut slots: Vec<Option<Entry>> = downloadable.into_iter().map(Some).collect();
    let mut jobs = Vec::with_capacity(slots.len());
    for (idx, slot) in slots.iter().enumerate() {
        let Some((owner, item)) = slot.as_ref() else {
            continue;
        };
        let Some(dest) = item.dest.clone() else {
            continue;
        };
        let topts = TransferOptions {
            overwrite: opts.overwrite,
            tries: opts.tries,
            timeout: opts.timeout,
            read_timeout: opts.read_timeout,
            check_size: opts.check_size,
            verify_tls: !NO_VERIFY_TLS.contains(&owner.name.as_str()),
            cancel: opts.cancel.clone(),
        };
        jobs.push((idx, item.url.clone(), dest, topts));
    }

    let client_ref = &client;
    let mut completions = futures_util::stream::iter(jobs.into_iter().map(
        |(idx, url, dest, topts)| async move {
            match AssertUnwindSafe(client_ref.transfer(&url, &dest, &topts))
                .catch_unwind()
                .await
            {
                Ok(status) => (idx, status),
                Err(_) => {
                    error!("transfer task panicked for {url}");
                    (idx, STATUS_FAILED)
                }
            }
        },
    ))
    .buffer_unordered(workers);

    // File stage runs on this task, one completed item at a time; a hook may
    // expand one entry into many (archive extraction) or drop it.
    let mut finals: Vec<Entry> = Vec::new();
    let mut done: u64 = 0;
    while let Some((idx, status)) = completions.next().await {
        done += 1;
        if let Some(progress) = &opts.on_progress {
            progress(done, total);
        }
        let Some((owner, mut item)) = slots[idx].take() else {
            continue;
        };
        if item.status.is_none() {
            item.status = Some(status);
        }
        if opts.cancel.is_cancelled() {
            finals.push((owner, item));
            continue;
        }
        let key = owner.key();
        let mut batch = vec![(owner, item)];
        if let Some(chain) = file_chains.get(&key) {
            for hook in chain {
                batch = apply_hook(hook.as_ref(), batch);
                if batch.is_empty() {
                    break;
                }
            }
        }
        finals.extend(batch);
    }
    drop(completions);
    finals.extend(passthrough);

    // Deferred work attached by hooks is drained exactly once, before
    // teardown can release whatever it depends on.
    let mut drained = 0usize;
    for (_, item) in finals.iter_mut() {
        if let Some(stream) = item.stream.take() {
            let (steps, errors) = stream.drain();
            drained += steps;
            for e in errors {
                warn!("deferred work step failed: {e}");
            }
        }
    }
    if drained > 0 {
        debug!("drained {drained} deferred steps");
    }

    run_teardown(&roster);

    if opts.cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    // Post stage: each module's hooks over its own partition, then global
    // hooks over everything.
    let mut out: Vec<Entry> = Vec::new();
    for producer in &producers {
        let key = producer.info.key();
        let (mut mine, rest): (Vec<Entry>, Vec<Entry>) =
            finals.into_iter().partition(|(owner, _)| owner.key() == key);
        finals = rest;
        if !mine.is_empty() {
            for hook in producer.hooks.iter().filter(|h| h.stage() == Stage::Post) {
                mine = apply_hook(hook.as_ref(), mine);
            }
        }
        out.extend(mine);
    }
    out.extend(finals);
    for hook in global_hooks.iter().filter(|h| h.stage() == Stage::Post) {
        out = apply_hook(hook.as_ref(), out);
    }

    let ok = out.iter().filter(|(_, item)| item.is_success()).count();
    info!("run complete: {ok}/{} files ok", out.len());
    Ok(out)
}

/// Run one hook over a batch. Failure is a no-op transform: the input
/// entries come back and only successful applications are recorded in the
/// per-item history.
fn apply_hook(hook: &dyn Hook, entries: Vec<Entry>) -> Vec<Entry> {
    match hook.run(entries) {
        Ok(mut entries) => {
            log_hook_history(&mut entries, hook);
            entries
        }
        Err(failure) => {
            warn!(
                "hook `{}` failed at {} stage: {}",
                hook.name(),
                hook.stage(),
                failure.error
            );
            failure.entries
        }
    }
}

/// Every hook participating in the run, each exactly once by identity.
fn teardown_roster(global: &[Arc<dyn Hook>], producers: &[Producer]) -> Vec<Arc<dyn Hook>> {
    let mut roster: Vec<Arc<dyn Hook>> = Vec::new();
    for hook in global
        .iter()
        .chain(producers.iter().flat_map(|p| p.hooks.iter()))
    {
        if !roster.iter().any(|h| Arc::ptr_eq(h, hook)) {
            roster.push(Arc::clone(hook));
        }
    }
    roster
}

fn run_teardown(roster: &[Arc<dyn Hook>]) {
    for hook in roster {
        if let Err(e) = hook.teardown() {
            warn!("teardown of `{}` failed: {e}", hook.name());
        }
    }
}
