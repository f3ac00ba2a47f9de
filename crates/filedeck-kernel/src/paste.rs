//! Paste jobs.
//!
//! A paste drains the session's clipboard into a background job. The job
//! handles items one at a time on the blocking pool and records an
//! [`ItemResult`] per item; a failing item never stops the rest. Callers get
//! the job id back immediately and poll for progress.
//!
//! ```text
//! paste() ──► registry[id] = job ──► spawn(run_job)
//!                                        │ for each item: spawn_blocking(paste_item)
//!                                        │ sleep until min duration
//!                                        ▼
//! poll(id, timeout) ◄─────────── watch: done = true
//! ```
//!
//! Finished jobs stay in the registry until the expiry sweep removes them,
//! which gives slow pollers time to collect the result.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use filedeck_types::{ClipboardAction, ItemResult, JobId, JobStatus, ResultCode};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clipboard::{ClipboardEntry, ClipboardStore};
use crate::error::{DeckError, DeckResult};
use crate::tree::{self, Visit};
use crate::vpath::{PathKind, RootTable, VirtualPath};

/// Label of a job that has not reached its first item yet.
const LABEL_PREPARING: &str = "preparing...";
/// Label of a finished job.
const LABEL_COMPLETE: &str = "complete";

struct Progress {
    label: String,
    results: Vec<ItemResult>,
    finished_at: Option<Instant>,
}

/// A running or finished paste.
struct PasteJob {
    id: JobId,
    action: ClipboardAction,
    destination: VirtualPath,
    overwrite: bool,
    started_at: Instant,
    progress: Mutex<Progress>,
    done: watch::Receiver<bool>,
}

impl PasteJob {
    fn set_label(&self, label: String) {
        self.progress.lock().label = label;
    }

    fn push_result(&self, result: ItemResult) {
        self.progress.lock().results.push(result);
    }

    fn finish(&self) {
        let mut progress = self.progress.lock();
        progress.label = LABEL_COMPLETE.to_string();
        progress.finished_at = Some(Instant::now());
    }

    fn is_expired(&self, expiry: Duration) -> bool {
        self.progress
            .lock()
            .finished_at
            .is_some_and(|at| at.elapsed() > expiry)
    }

    fn status(&self) -> JobStatus {
        let progress = self.progress.lock();
        let results = progress.results.clone();
        let (code, message) = if progress.finished_at.is_some() {
            let code = ResultCode::from_results(&results);
            let message = results
                .iter()
                .find(|r| !r.success)
                .map(|r| r.message.clone())
                .unwrap_or_else(|| progress.label.clone());
            (code, message)
        } else {
            (ResultCode::InProgress, progress.label.clone())
        };
        JobStatus {
            id: self.id,
            code,
            title: self.action.title().to_string(),
            message,
            results,
        }
    }
}

/// Runs paste jobs and keeps them pollable until they expire.
pub struct PasteEngine {
    roots: Arc<RootTable>,
    clipboard: Arc<ClipboardStore>,
    jobs: Mutex<HashMap<JobId, Arc<PasteJob>>>,
    min_duration: Duration,
}

impl std::fmt::Debug for PasteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasteEngine")
            .field("jobs", &self.jobs.lock().len())
            .field("min_duration", &self.min_duration)
            .finish()
    }
}

impl PasteEngine {
    pub fn new(
        roots: Arc<RootTable>,
        clipboard: Arc<ClipboardStore>,
        min_duration: Duration,
    ) -> Self {
        Self {
            roots,
            clipboard,
            jobs: Mutex::new(HashMap::new()),
            min_duration,
        }
    }

    /// Start pasting the session's clipboard into `destination`.
    ///
    /// Rejects the synthetic root and an empty clipboard without touching
    /// the clipboard or the disk. Must be called inside a tokio runtime.
    pub fn paste(&self, session: &str, destination: &str, overwrite: bool) -> DeckResult<JobStatus> {
        let destination = VirtualPath::parse(destination, PathKind::Folder, self.roots.mode());
        if destination.is_root() {
            tracing::warn!(session = %session, "paste into the root folder refused");
            return Err(DeckError::bad_request("cannot paste into root folder"));
        }

        let entry = self.clipboard.take_nonempty(session).ok_or_else(|| {
            tracing::warn!(session = %session, "paste with no files in clipboard");
            DeckError::bad_request("no files in clipboard")
        })?;

        let (done_tx, done_rx) = watch::channel(false);
        let job = Arc::new(PasteJob {
            id: JobId::new(),
            action: entry.action,
            destination,
            overwrite,
            started_at: Instant::now(),
            progress: Mutex::new(Progress {
                label: LABEL_PREPARING.to_string(),
                results: Vec::new(),
                finished_at: None,
            }),
            done: done_rx,
        });

        tracing::info!(
            job = %job.id.short(),
            session = %session,
            action = %entry.action,
            items = entry.items.len(),
            destination = %job.destination,
            overwrite,
            "paste started"
        );

        self.jobs.lock().insert(job.id, Arc::clone(&job));
        let status = job.status();
        tokio::spawn(run_job(
            Arc::clone(&self.roots),
            job,
            entry,
            done_tx,
            self.min_duration,
        ));
        Ok(status)
    }

    /// Wait up to `timeout` for a job to finish and return its status.
    pub async fn poll(&self, job_id: JobId, timeout: Duration) -> DeckResult<JobStatus> {
        self.poll_with_cancel(job_id, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`poll`](Self::poll), but `cancel` cuts the wait short.
    ///
    /// Cancelling only stops waiting; the job keeps running.
    pub async fn poll_with_cancel(
        &self,
        job_id: JobId,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> DeckResult<JobStatus> {
        let job = self
            .jobs
            .lock()
            .get(&job_id)
            .cloned()
            .ok_or_else(|| DeckError::not_found(format!("Cannot find operation {job_id}")))?;

        let mut done = job.done.clone();
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::timeout(timeout, done.wait_for(|finished| *finished)) => {}
        }
        Ok(job.status())
    }

    /// Drop jobs finished more than `expiry` ago. Returns how many went.
    pub fn sweep_expired(&self, expiry: Duration) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|id, job| {
            let expired = job.is_expired(expiry);
            if expired {
                tracing::debug!(job = %id.short(), "removed paste job");
            }
            !expired
        });
        before - jobs.len()
    }

    /// Number of jobs still held, finished or not.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }
}

async fn run_job(
    roots: Arc<RootTable>,
    job: Arc<PasteJob>,
    entry: ClipboardEntry,
    done: watch::Sender<bool>,
    min_duration: Duration,
) {
    for item in entry.items {
        let worker_roots = Arc::clone(&roots);
        let worker_job = Arc::clone(&job);
        let result = tokio::task::spawn_blocking(move || {
            paste_item(&worker_roots, &worker_job, &item)
        })
        .await
        .unwrap_or_else(|e| ItemResult::failed(format!("paste task failed: {e}")));
        job.push_result(result);
    }

    let elapsed = job.started_at.elapsed();
    if elapsed < min_duration {
        tokio::time::sleep(min_duration - elapsed).await;
    }

    job.finish();
    let status = job.status();
    tracing::info!(job = %job.id.short(), code = %status.code, "paste finished");
    done.send_replace(true);
}

fn paste_item(roots: &RootTable, job: &PasteJob, item: &str) -> ItemResult {
    let src = VirtualPath::new(item, roots.mode());
    let outcome = if src.is_root() || src.is_root_folder(roots) {
        let verb = match job.action {
            ClipboardAction::Move => "Move",
            ClipboardAction::Copy => "Copy",
        };
        Err(DeckError::invalid_path(format!("Cannot {verb} Root Folder {src}")))
    } else if src.is_folder() {
        paste_folder(roots, job, &src)
    } else {
        paste_file(roots, job, &src)
    };
    match outcome {
        Ok(message) => {
            tracing::debug!(job = %job.id.short(), item = %item, result = %message, "paste item done");
            ItemResult::ok(message)
        }
        Err(e) => {
            tracing::error!(job = %job.id.short(), item = %item, error = %e, "paste item failed");
            ItemResult::failed(e.to_string())
        }
    }
}

fn label_for(job: &PasteJob, name: &str) -> String {
    format!("{} {}", job.action.verb(), name)
}

fn destination_dir(roots: &RootTable, job: &PasteJob) -> DeckResult<std::path::PathBuf> {
    let dir = job.destination.to_physical_directory(roots)?;
    if !dir.is_dir() {
        return Err(DeckError::io(format!(
            "destination folder {} does not exist",
            job.destination
        )));
    }
    Ok(dir)
}

fn paste_file(roots: &RootTable, job: &PasteJob, src_path: &VirtualPath) -> DeckResult<String> {
    job.set_label(label_for(job, src_path.name()));

    let src = src_path.to_physical_file(roots)?;
    if !src.is_file() {
        return Err(DeckError::io(format!("unable to find {src_path}")));
    }
    let dest_dir = destination_dir(roots, job)?;
    let name = src_path.name();

    let mut dest = dest_dir.join(name);
    let onto_itself = dest == src;
    if !job.overwrite || (onto_itself && job.action == ClipboardAction::Copy) {
        dest = tree::unique_file_path(&dest_dir, name);
    }
    let dest_path = VirtualPath::from_physical_file(&dest, roots)?;

    match job.action {
        ClipboardAction::Move => {
            if dest != src {
                tree::move_file(&src, &dest)?;
            }
            Ok(format!("{src_path} moved to {dest_path}"))
        }
        ClipboardAction::Copy => {
            fs::copy(&src, &dest)?;
            Ok(format!("{src_path} copied to {dest_path}"))
        }
    }
}

fn paste_folder(roots: &RootTable, job: &PasteJob, src_path: &VirtualPath) -> DeckResult<String> {
    let name = src_path.name().to_string();
    job.set_label(label_for(job, &name));

    let src = src_path.to_physical_directory(roots)?;
    if !src.is_dir() {
        return Err(DeckError::io(format!("unable to find {src_path}")));
    }
    let dest_dir = destination_dir(roots, job)?;

    if src_path.ancestor_index(&job.destination).is_some() {
        let verb = match job.action {
            ClipboardAction::Move => "move",
            ClipboardAction::Copy => "copy",
        };
        return Err(DeckError::io(format!("cannot {verb} a folder into itself")));
    }
    if job.action == ClipboardAction::Move && src_path.parent() == job.destination {
        return Err(DeckError::io("source and destination are the same"));
    }

    let mut dest = dest_dir.join(&name);
    let overwrite = job.overwrite && dest != src;
    if !overwrite {
        dest = tree::unique_dir_path(&dest_dir, &name);
    }

    tree::copy_tree(&src, &dest, &mut |visited: &Path, _: Visit| {
        let visited_name = visited
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        job.set_label(label_for(job, &visited_name));
    })?;

    match job.action {
        ClipboardAction::Move => {
            fs::remove_dir_all(&src)?;
            Ok(format!("{src_path} moved to {}", job.destination))
        }
        ClipboardAction::Copy => Ok(format!("{src_path} copied to {}", job.destination)),
    }
}
