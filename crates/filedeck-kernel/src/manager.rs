//! The FileManager: owns every registry and the background sweeps.
//!
//! One `FileManager` is built at start-up from a [`Config`]. It holds:
//! - The root table (shared by every service)
//! - The clipboard and the paste engine
//! - The upload manager
//! - The download service and its archive cache
//! - Folder and text-content services
//!
//! Sweeps run as spawned tasks until [`FileManager::shutdown`] is called or
//! the manager is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use filedeck_types::{JobId, JobStatus, OperationResult};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clipboard::ClipboardStore;
use crate::config::Config;
use crate::content::ContentService;
use crate::download::DownloadService;
use crate::error::DeckResult;
use crate::folders::FolderService;
use crate::paste::PasteEngine;
use crate::upload::UploadManager;
use crate::vpath::RootTable;

/// Entry point for front ends.
pub struct FileManager {
    config: Arc<Config>,
    roots: Arc<RootTable>,
    clipboard: Arc<ClipboardStore>,
    paste: Arc<PasteEngine>,
    uploads: Arc<UploadManager>,
    downloads: Arc<DownloadService>,
    folders: FolderService,
    content: ContentService,
    shutdown: CancellationToken,
    sweeps: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for FileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileManager")
            .field("roots", &self.roots)
            .field("clipboard", &self.clipboard.len())
            .field("paste", &self.paste)
            .field("uploads", &self.uploads.active())
            .field("archives", &self.downloads.cache().len())
            .field("sweeps", &self.sweeps.lock().len())
            .finish()
    }
}

impl FileManager {
    /// Build every service, clear leftover uploads and start the sweeps.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn start(config: Config) -> DeckResult<Self> {
        config.validate()?;
        let roots = Arc::new(RootTable::from_config(&config)?);
        let config = Arc::new(config);
        let timings = &config.timings;

        let clipboard = Arc::new(ClipboardStore::new());
        let paste = Arc::new(PasteEngine::new(
            Arc::clone(&roots),
            Arc::clone(&clipboard),
            timings.job_min_duration(),
        ));
        let uploads = Arc::new(UploadManager::new(
            Arc::clone(&roots),
            config.upload_directory.clone(),
            config.upload_chunk_size,
        ));
        let downloads = Arc::new(DownloadService::new(Arc::clone(&roots), Arc::clone(&config)));

        let leftover = uploads.recover().await?;
        tracing::info!(
            roots = roots.len(),
            upload_dir = %uploads.upload_dir().display(),
            leftover,
            "file manager started"
        );

        let shutdown = CancellationToken::new();
        let mut sweeps = Vec::new();

        let expiry = timings.job_expiry();
        let engine = Arc::clone(&paste);
        sweeps.extend(spawn_sweep(
            "paste-jobs",
            timings.job_sweep_interval(),
            shutdown.clone(),
            move || {
                let engine = Arc::clone(&engine);
                async move { engine.sweep_expired(expiry) }
            },
        ));

        let idle = timings.upload_idle();
        let manager = Arc::clone(&uploads);
        sweeps.extend(spawn_sweep(
            "uploads",
            timings.upload_sweep_interval(),
            shutdown.clone(),
            move || {
                let manager = Arc::clone(&manager);
                async move { manager.sweep_idle(idle).await }
            },
        ));

        let archive_idle = timings.archive_idle();
        let service = Arc::clone(&downloads);
        sweeps.extend(spawn_sweep(
            "archives",
            timings.archive_sweep_interval(),
            shutdown.clone(),
            move || {
                let service = Arc::clone(&service);
                async move { service.sweep_idle(archive_idle) }
            },
        ));

        Ok(Self {
            folders: FolderService::new(Arc::clone(&roots), Arc::clone(&config)),
            content: ContentService::new(Arc::clone(&roots), Arc::clone(&config)),
            config,
            roots,
            clipboard,
            paste,
            uploads,
            downloads,
            shutdown,
            sweeps: Mutex::new(sweeps),
        })
    }

    /// Stop the sweeps and wait for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<_> = self.sweeps.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "sweep task failed");
            }
        }
        tracing::info!("file manager stopped");
    }

    // ========================================================================
    // Services
    // ========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn roots(&self) -> &RootTable {
        &self.roots
    }

    pub fn clipboard(&self) -> &ClipboardStore {
        &self.clipboard
    }

    pub fn paste_engine(&self) -> &PasteEngine {
        &self.paste
    }

    pub fn uploads(&self) -> &UploadManager {
        &self.uploads
    }

    pub fn downloads(&self) -> &DownloadService {
        &self.downloads
    }

    pub fn folders(&self) -> &FolderService {
        &self.folders
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    // ========================================================================
    // Clipboard
    // ========================================================================

    /// Put `items` on the session's clipboard for moving.
    pub fn cut(&self, session: &str, items: Vec<String>) -> OperationResult {
        self.clipboard.cut(session, items)
    }

    /// Put `items` on the session's clipboard for copying.
    pub fn copy(&self, session: &str, items: Vec<String>) -> OperationResult {
        self.clipboard.copy(session, items)
    }

    /// Start pasting the session's clipboard into `destination`.
    pub fn paste(&self, session: &str, destination: &str, overwrite: bool) -> DeckResult<JobStatus> {
        self.paste.paste(session, destination, overwrite)
    }

    /// Wait up to `timeout` for a paste job, cut short by shutdown.
    pub async fn poll_paste(&self, job_id: JobId, timeout: Duration) -> DeckResult<JobStatus> {
        self.paste
            .poll_with_cancel(job_id, timeout, &self.shutdown)
            .await
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Run `sweep` every `every` until `shutdown` fires.
///
/// A zero interval disables the sweep.
fn spawn_sweep<F, Fut>(
    name: &'static str,
    every: Duration,
    shutdown: CancellationToken,
    mut sweep: F,
) -> Option<JoinHandle<()>>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = usize> + Send + 'static,
{
    if every.is_zero() {
        tracing::warn!(sweep = name, "sweep interval is zero, sweep disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = sweep().await;
                    if removed > 0 {
                        tracing::info!(sweep = name, removed, "sweep removed entries");
                    }
                }
            }
        }
        tracing::debug!(sweep = name, "sweep stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedeck_types::ResultCode;
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> Config {
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(docs.join("in")).unwrap();
        std::fs::create_dir_all(docs.join("out")).unwrap();
        std::fs::write(docs.join("in/a.txt"), "a").unwrap();
        let mut config = Config {
            upload_directory: tmp.path().join("uploads"),
            ..Config::default()
        }
        .with_root("/docs/", &docs);
        config.timings.job_min_duration = 0.0;
        config
    }

    #[tokio::test]
    async fn test_start_clears_leftover_uploads() {
        let tmp = TempDir::new().unwrap();
        let uploads = tmp.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("stale.upload-temp"), "x").unwrap();
        std::fs::write(uploads.join("keep.txt"), "x").unwrap();

        let manager = FileManager::start(config(&tmp)).await.unwrap();
        assert!(!uploads.join("stale.upload-temp").exists());
        assert!(uploads.join("keep.txt").exists());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejects_bad_roots() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp).with_root("/", tmp.path());
        assert!(FileManager::start(config).await.is_err());
    }

    #[tokio::test]
    async fn test_cut_paste_through_manager() {
        let tmp = TempDir::new().unwrap();
        let manager = FileManager::start(config(&tmp)).await.unwrap();

        let cut = manager.cut("s1", vec!["/docs/in/a.txt".into()]);
        assert!(cut.is_success());
        let job = manager.paste("s1", "/docs/out/", false).unwrap();
        let status = manager
            .poll_paste(job.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(status.code, ResultCode::Success);
        assert!(manager.roots().iter().next().unwrap().dir().join("out/a.txt").exists());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_job_sweep_runs() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp);
        config.timings.job_expiry = 0.05;
        config.timings.job_sweep_interval = 0.1;
        let manager = FileManager::start(config).await.unwrap();

        manager.copy("s1", vec!["/docs/in/a.txt".into()]);
        let job = manager.paste("s1", "/docs/out/", false).unwrap();
        let status = manager.poll_paste(job.id, Duration::from_secs(5)).await.unwrap();
        assert!(status.is_finished());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(manager.paste_engine().job_count(), 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_interval_disables_sweep() {
        let tmp = TempDir::new().unwrap();
        let mut config = config(&tmp);
        config.timings.archive_sweep_interval = 0.0;
        let manager = FileManager::start(config).await.unwrap();
        assert_eq!(manager.sweeps.lock().len(), 2);
        manager.shutdown().await;
        assert!(manager.sweeps.lock().is_empty());
    }
}
