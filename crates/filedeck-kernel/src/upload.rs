//! Chunked uploads.
//!
//! A client announces an upload, sends chunks in any order (retries simply
//! overwrite), then completes it. Chunks land in a temp file inside the
//! upload directory; completion checks the byte count and moves the temp
//! file into the destination folder under a unique name.
//!
//! Temp files are named `<upload-id>.upload-temp`. Leftovers from a previous
//! run are deleted by [`UploadManager::recover`] before any session starts.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use filedeck_types::{UploadReceipt, UploadStatus};
use parking_lot::Mutex;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{DeckError, DeckResult};
use crate::tree;
use crate::vpath::{PathKind, RootTable, VirtualPath};

/// Extension of in-flight upload files.
pub const TEMP_EXTENSION: &str = "upload-temp";

/// Parameters of a new upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub upload_id: String,
    /// Virtual folder receiving the file.
    pub destination: String,
    pub file_name: String,
    /// Total bytes the client will send.
    pub declared_size: u64,
    pub chunk_count: usize,
    pub chunk_size: u64,
}

struct SessionState {
    file: Option<fs::File>,
    chunk_lengths: Vec<u64>,
}

struct UploadSession {
    id: String,
    destination: VirtualPath,
    file_name: String,
    declared_size: u64,
    chunk_count: usize,
    chunk_size: u64,
    temp_path: PathBuf,
    state: tokio::sync::Mutex<SessionState>,
    last_activity: Mutex<Instant>,
}

impl UploadSession {
    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("file_name", &self.file_name)
            .field("declared_size", &self.declared_size)
            .field("chunk_count", &self.chunk_count)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// Tracks active uploads.
pub struct UploadManager {
    roots: Arc<RootTable>,
    upload_dir: PathBuf,
    chunk_size: u64,
    sessions: Mutex<HashMap<String, Arc<UploadSession>>>,
}

impl std::fmt::Debug for UploadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("upload_dir", &self.upload_dir)
            .field("sessions", &self.sessions.lock().len())
            .finish()
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.contains(['/', '\\']) && name != "." && name != ".."
}

impl UploadManager {
    pub fn new(roots: Arc<RootTable>, upload_dir: impl Into<PathBuf>, chunk_size: u64) -> Self {
        Self {
            roots,
            upload_dir: upload_dir.into(),
            chunk_size,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Recommended chunk size for clients.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Number of active uploads.
    pub fn active(&self) -> usize {
        self.sessions.lock().len()
    }

    fn temp_path(&self, upload_id: &str) -> PathBuf {
        self.upload_dir.join(format!("{upload_id}.{TEMP_EXTENSION}"))
    }

    fn session(&self, upload_id: &str) -> DeckResult<Arc<UploadSession>> {
        self.sessions
            .lock()
            .get(upload_id)
            .cloned()
            .ok_or_else(|| DeckError::io(format!("Cannot find upload {upload_id}")))
    }

    fn remove_session(&self, upload_id: &str) -> DeckResult<Arc<UploadSession>> {
        self.sessions
            .lock()
            .remove(upload_id)
            .ok_or_else(|| DeckError::io(format!("Cannot find upload {upload_id}")))
    }

    /// Delete temp files left over from a previous run.
    ///
    /// Creates the upload directory when it does not exist yet.
    pub async fn recover(&self) -> DeckResult<usize> {
        fs::create_dir_all(&self.upload_dir).await?;
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.upload_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_temp = path
                .extension()
                .is_some_and(|ext| ext == TEMP_EXTENSION);
            if !is_temp {
                continue;
            }
            tracing::warn!(path = %path.display(), "deleting leftover upload");
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "failed to delete leftover upload")
                }
            }
        }
        Ok(removed)
    }

    /// Register a new upload and create its temp file.
    pub async fn start(&self, request: UploadRequest) -> DeckResult<UploadReceipt> {
        tracing::info!(
            upload = %request.upload_id,
            folder = %request.destination,
            file = %request.file_name,
            size = request.declared_size,
            chunks = request.chunk_count,
            "upload start"
        );

        if request.upload_id.trim().is_empty()
            || request.destination.trim().is_empty()
            || request.file_name.trim().is_empty()
        {
            return Err(DeckError::bad_request(
                "upload id, folder and file name are required",
            ));
        }
        if !is_plain_name(&request.upload_id) {
            return Err(DeckError::bad_request(format!(
                "invalid upload id {}",
                request.upload_id
            )));
        }
        if !is_plain_name(&request.file_name) {
            return Err(DeckError::bad_request(format!(
                "invalid file name {}",
                request.file_name
            )));
        }

        if request.chunk_size == 0 {
            return Err(DeckError::bad_request("chunk size must be positive"));
        }
        let max_chunks = request.declared_size.div_ceil(request.chunk_size).max(1);
        if request.chunk_count as u64 > max_chunks {
            return Err(DeckError::bad_request(format!(
                "{} chunks of {} bytes exceed {} bytes",
                request.chunk_count, request.chunk_size, request.declared_size
            )));
        }

        let destination =
            VirtualPath::parse(&request.destination, PathKind::Folder, self.roots.mode());
        if destination.is_root() {
            return Err(DeckError::io("unable to upload to root"));
        }
        destination.to_physical_directory(&self.roots)?;

        let temp_path = self.temp_path(&request.upload_id);
        let session = Arc::new(UploadSession {
            id: request.upload_id.clone(),
            destination,
            file_name: request.file_name,
            declared_size: request.declared_size,
            chunk_count: request.chunk_count,
            chunk_size: request.chunk_size,
            temp_path: temp_path.clone(),
            state: tokio::sync::Mutex::new(SessionState {
                file: None,
                chunk_lengths: vec![0; request.chunk_count],
            }),
            last_activity: Mutex::new(Instant::now()),
        });

        // Chunks racing the file creation wait on the state lock.
        let mut state = session.state.lock().await;
        {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(&request.upload_id) {
                return Err(DeckError::bad_request(format!(
                    "upload {} is already active",
                    request.upload_id
                )));
            }
            sessions.insert(request.upload_id.clone(), Arc::clone(&session));
        }

        let opened = async {
            fs::create_dir_all(&self.upload_dir).await?;
            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .await
        }
        .await;

        match opened {
            Ok(file) => {
                state.file = Some(file);
                Ok(UploadReceipt::new(request.upload_id, UploadStatus::Started))
            }
            Err(e) => {
                self.sessions.lock().remove(&request.upload_id);
                tracing::error!(upload = %request.upload_id, error = %e, "unable to start upload");
                Err(DeckError::io(format!("unable to start upload: {e}")))
            }
        }
    }

    /// Write one chunk at `offset`. Sending a chunk again replaces it.
    pub async fn add_chunk(
        &self,
        upload_id: &str,
        chunk_id: usize,
        offset: u64,
        data: &[u8],
    ) -> DeckResult<UploadReceipt> {
        tracing::debug!(upload = %upload_id, chunk_id, offset, len = data.len(), "upload chunk");
        let session = self.session(upload_id)?;
        if chunk_id >= session.chunk_count {
            return Err(DeckError::bad_request(format!(
                "chunk {chunk_id} out of range, upload {upload_id} has {} chunks",
                session.chunk_count
            )));
        }

        let mut state = session.state.lock().await;
        let file = state
            .file
            .as_mut()
            .ok_or_else(|| DeckError::io(format!("Cannot find upload {upload_id}")))?;

        let written = async {
            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(data).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::error!(upload = %upload_id, chunk_id, error = %e, "unable to write chunk");
            return Err(DeckError::io("unable to write to upload stream"));
        }

        state.chunk_lengths[chunk_id] = data.len() as u64;
        session.touch();
        Ok(UploadReceipt::new(upload_id, UploadStatus::Uploading))
    }

    /// Verify the byte count and move the file into its folder.
    ///
    /// The session is gone after this call whether it succeeds or not. A
    /// size mismatch leaves the temp file for the next recovery pass.
    pub async fn complete(&self, upload_id: &str) -> DeckResult<UploadReceipt> {
        tracing::info!(upload = %upload_id, "upload complete");
        let session = self.remove_session(upload_id)?;

        let mut state = session.state.lock().await;
        if let Some(mut file) = state.file.take() {
            file.flush().await?;
        }

        let total: u64 = state.chunk_lengths.iter().sum();
        if total != session.declared_size {
            tracing::error!(
                upload = %upload_id,
                uploaded = total,
                expected = session.declared_size,
                "upload size mismatch"
            );
            return Err(DeckError::io(format!(
                "uploaded {total} bytes, expected {} bytes",
                session.declared_size
            )));
        }

        let dir = session.destination.to_physical_directory(&self.roots)?;
        let target = tree::unique_file_path(&dir, &session.file_name);
        move_into_place(&session.temp_path, &target).await?;

        tracing::info!(upload = %upload_id, path = %target.display(), bytes = total, "upload stored");
        Ok(UploadReceipt::new(upload_id, UploadStatus::Complete))
    }

    /// Abandon an upload and delete its temp file.
    pub async fn cancel(&self, upload_id: &str) -> DeckResult<UploadReceipt> {
        tracing::info!(upload = %upload_id, "upload cancel");
        let session = self.remove_session(upload_id)?;
        discard(&session).await;
        Ok(UploadReceipt::new(upload_id, UploadStatus::Cancelled))
    }

    /// Cancel uploads idle for longer than `max_idle`. Returns how many went.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<Arc<UploadSession>> = {
            let mut sessions = self.sessions.lock();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.idle_for() > max_idle)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        if expired.is_empty() {
            tracing::debug!("upload sweep found no expired uploads");
        } else {
            tracing::warn!(count = expired.len(), "upload sweep found expired uploads");
        }
        for session in &expired {
            tracing::info!(upload = %session.id, idle = ?session.idle_for(), "upload expired");
            discard(session).await;
        }
        expired.len()
    }
}

// Close the temp file and delete it. Failures are logged only.
async fn discard(session: &UploadSession) {
    let mut state = session.state.lock().await;
    state.file.take();
    if let Err(e) = fs::remove_file(&session.temp_path).await {
        tracing::warn!(
            upload = %session.id,
            path = %session.temp_path.display(),
            error = %e,
            "unable to delete upload temp file"
        );
    }
}

// The upload directory is often on another filesystem than the roots.
async fn move_into_place(src: &Path, dest: &Path) -> DeckResult<()> {
    match fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            fs::copy(src, dest).await?;
            fs::remove_file(src).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vpath::CaseMode;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        docs: PathBuf,
        uploads: UploadManager,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        let roots = Arc::new(
            RootTable::new(vec![("/docs/".to_string(), docs)], CaseMode::Insensitive).unwrap(),
        );
        let docs = roots.iter().next().unwrap().dir().to_path_buf();
        let uploads = UploadManager::new(roots, tmp.path().join("uploads"), 512_000);
        Fixture {
            _tmp: tmp,
            docs,
            uploads,
        }
    }

    fn request(id: &str, name: &str, size: u64, chunks: usize) -> UploadRequest {
        UploadRequest {
            upload_id: id.to_string(),
            destination: "/docs/".to_string(),
            file_name: name.to_string(),
            declared_size: size,
            chunk_count: chunks,
            chunk_size: 4,
        }
    }

    #[tokio::test]
    async fn test_out_of_order_chunks() {
        let fx = fixture();
        fx.uploads.start(request("u1", "a.txt", 10, 3)).await.unwrap();
        fx.uploads.add_chunk("u1", 2, 8, b"ij").await.unwrap();
        fx.uploads.add_chunk("u1", 0, 0, b"abcd").await.unwrap();
        fx.uploads.add_chunk("u1", 1, 4, b"efgh").await.unwrap();
        let receipt = fx.uploads.complete("u1").await.unwrap();
        assert_eq!(receipt.status, UploadStatus::Complete);
        assert_eq!(std::fs::read(fx.docs.join("a.txt")).unwrap(), b"abcdefghij");
        assert_eq!(fx.uploads.active(), 0);
    }

    #[tokio::test]
    async fn test_existing_name_gets_suffix() {
        let fx = fixture();
        std::fs::write(fx.docs.join("a.txt"), "old").unwrap();
        fx.uploads.start(request("u1", "a.txt", 3, 1)).await.unwrap();
        fx.uploads.add_chunk("u1", 0, 0, b"new").await.unwrap();
        fx.uploads.complete("u1").await.unwrap();
        assert_eq!(std::fs::read_to_string(fx.docs.join("a.txt")).unwrap(), "old");
        assert_eq!(std::fs::read_to_string(fx.docs.join("a(1).txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_start_validation() {
        let fx = fixture();
        let err = fx.uploads.start(request("", "a.txt", 1, 1)).await.unwrap_err();
        assert!(matches!(err, DeckError::BadRequest(_)));
        let err = fx.uploads.start(request("../x", "a.txt", 1, 1)).await.unwrap_err();
        assert!(matches!(err, DeckError::BadRequest(_)));
        let err = fx.uploads.start(request("u1", "..", 1, 1)).await.unwrap_err();
        assert!(matches!(err, DeckError::BadRequest(_)));

        let mut to_root = request("u1", "a.txt", 1, 1);
        to_root.destination = "/".to_string();
        let err = fx.uploads.start(to_root).await.unwrap_err();
        assert_eq!(err.to_string(), "unable to upload to root");
    }

    #[tokio::test]
    async fn test_chunk_geometry_validated() {
        let fx = fixture();
        let mut zero = request("u1", "a.txt", 10, 3);
        zero.chunk_size = 0;
        let err = fx.uploads.start(zero).await.unwrap_err();
        assert!(matches!(err, DeckError::BadRequest(_)));

        let err = fx.uploads.start(request("u1", "a.txt", 10, 4)).await.unwrap_err();
        assert!(matches!(err, DeckError::BadRequest(_)));
        let err = fx.uploads.start(request("u1", "a.txt", 10, usize::MAX)).await.unwrap_err();
        assert!(matches!(err, DeckError::BadRequest(_)));
        assert_eq!(fx.uploads.active(), 0);

        fx.uploads.start(request("empty", "e.txt", 0, 1)).await.unwrap();
        fx.uploads.start(request("u1", "a.txt", 10, 3)).await.unwrap();
        assert_eq!(fx.uploads.active(), 2);
    }

    #[tokio::test]
    async fn test_chunk_is_on_disk_when_acknowledged() {
        let fx = fixture();
        fx.uploads.start(request("u1", "a.txt", 10, 3)).await.unwrap();
        fx.uploads.add_chunk("u1", 1, 4, b"efgh").await.unwrap();
        let temp = fx.uploads.temp_path("u1");
        assert_eq!(std::fs::metadata(&temp).unwrap().len(), 8);
        assert_eq!(&std::fs::read(&temp).unwrap()[4..], b"efgh");
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let fx = fixture();
        fx.uploads.start(request("u1", "a.txt", 1, 1)).await.unwrap();
        let err = fx.uploads.start(request("u1", "b.txt", 1, 1)).await.unwrap_err();
        assert!(matches!(err, DeckError::BadRequest(_)));
        assert_eq!(fx.uploads.active(), 1);
    }

    #[tokio::test]
    async fn test_chunk_out_of_range() {
        let fx = fixture();
        fx.uploads.start(request("u1", "a.txt", 4, 1)).await.unwrap();
        let err = fx.uploads.add_chunk("u1", 1, 4, b"x").await.unwrap_err();
        assert!(matches!(err, DeckError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_upload() {
        let fx = fixture();
        let err = fx.uploads.add_chunk("nope", 0, 0, b"x").await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot find upload nope");
        assert!(fx.uploads.cancel("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_size_mismatch_removes_session() {
        let fx = fixture();
        fx.uploads.start(request("u1", "a.txt", 1500, 3)).await.unwrap();
        fx.uploads.add_chunk("u1", 0, 0, &[1; 500]).await.unwrap();
        fx.uploads.add_chunk("u1", 1, 500, &[2; 500]).await.unwrap();
        fx.uploads.add_chunk("u1", 2, 1000, &[3; 499]).await.unwrap();
        let err = fx.uploads.complete("u1").await.unwrap_err();
        assert_eq!(err.to_string(), "uploaded 1499 bytes, expected 1500 bytes");
        assert!(!fx.docs.join("a.txt").exists());
        let again = fx.uploads.complete("u1").await.unwrap_err();
        assert_eq!(again.to_string(), "Cannot find upload u1");
    }

    #[tokio::test]
    async fn test_cancel_deletes_temp() {
        let fx = fixture();
        fx.uploads.start(request("u1", "a.txt", 4, 1)).await.unwrap();
        let temp = fx.uploads.temp_path("u1");
        assert!(temp.exists());
        let receipt = fx.uploads.cancel("u1").await.unwrap();
        assert_eq!(receipt.status, UploadStatus::Cancelled);
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_recover_deletes_leftovers() {
        let fx = fixture();
        std::fs::create_dir_all(fx.uploads.upload_dir()).unwrap();
        std::fs::write(fx.uploads.temp_path("stale"), "x").unwrap();
        std::fs::write(fx.uploads.upload_dir().join("keep.txt"), "x").unwrap();
        assert_eq!(fx.uploads.recover().await.unwrap(), 1);
        assert!(fx.uploads.upload_dir().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_recover_creates_directory() {
        let fx = fixture();
        assert_eq!(fx.uploads.recover().await.unwrap(), 0);
        assert!(fx.uploads.upload_dir().is_dir());
    }

    #[tokio::test]
    async fn test_sweep_idle() {
        let fx = fixture();
        fx.uploads.start(request("u1", "a.txt", 4, 1)).await.unwrap();
        assert_eq!(fx.uploads.sweep_idle(Duration::from_secs(3600)).await, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fx.uploads.sweep_idle(Duration::from_millis(5)).await, 1);
        assert!(!fx.uploads.temp_path("u1").exists());
        assert_eq!(fx.uploads.active(), 0);
    }
}
