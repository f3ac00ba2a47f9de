//! Downloads: ranged reads of files and of zipped selections.
//!
//! A range read never returns more than [`MAX_RANGE_CHUNK`] bytes; clients
//! fetch large files with consecutive ranges. Zipped selections requested
//! with a range header are cached so the follow-up ranges slice the same
//! archive instead of rebuilding it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::{Duration, Instant};

use filedeck_types::{Download, FileView, RangePayload};
use parking_lot::Mutex;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::archive;
use crate::config::Config;
use crate::error::{DeckError, DeckResult};
use crate::folders::file_view;
use crate::vpath::{PathKind, RootTable, VirtualPath};

/// Most bytes served by one range read (1000 KiB).
pub const MAX_RANGE_CHUNK: u64 = 1024 * 1000;

/// A requested byte range. `end` is inclusive, as in HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    /// False when the request carried no usable `Range` header.
    pub specified: bool,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ByteRange {
    /// No range: the whole resource (up to the per-read cap).
    pub fn unspecified() -> Self {
        Self::default()
    }

    /// `[start, end]`, both inclusive.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            specified: true,
            start: Some(start),
            end: Some(end),
        }
    }

    /// Parse a `Range` header value: `bytes=a-b`, `bytes=a-` or `bytes=-b`.
    ///
    /// `bytes=-b` reads from the start through byte `b`; it is not a suffix
    /// range. Unparseable bounds are left open.
    pub fn from_header(header: Option<&str>) -> Self {
        let Some(value) = header else {
            return Self::unspecified();
        };
        let value = value.trim();
        let value = value.strip_prefix("bytes=").unwrap_or(value).trim();
        match value.split_once('-') {
            Some((start, end)) => Self {
                specified: true,
                start: start.trim().parse().ok(),
                end: end.trim().parse().ok(),
            },
            None => Self::unspecified(),
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.specified {
            return f.write_str("<not specified>");
        }
        f.write_str("bytes=")?;
        if let Some(start) = self.start {
            write!(f, "{start}")?;
        }
        f.write_str("-")?;
        if let Some(end) = self.end {
            write!(f, "{end}")?;
        }
        Ok(())
    }
}

/// Half-open `[start, end)` slice to serve from a resource of `total` bytes.
///
/// The start defaults to 0 and the end to `total`. The end is clamped to
/// `total` and the width to [`MAX_RANGE_CHUNK`].
pub fn get_range(total: u64, range: &ByteRange) -> DeckResult<(u64, u64)> {
    let start = range.start.unwrap_or(0);
    if start > total {
        return Err(DeckError::bad_request(format!(
            "range start {start} is past the end ({total} bytes)"
        )));
    }
    if let Some(last) = range.end
        && last < start
    {
        return Err(DeckError::bad_request(format!(
            "range end {last} precedes start {start}"
        )));
    }
    let end = range
        .end
        .map(|last| last.saturating_add(1))
        .unwrap_or(total)
        .min(total);
    let end = end.min(start.saturating_add(MAX_RANGE_CHUNK));
    Ok((start, end))
}

/// A zipped selection kept for ranged reads.
#[derive(Debug)]
pub struct CachedArchive {
    pub key: String,
    pub file_name: String,
    pub data: Vec<u8>,
    pub created_at: Instant,
    last_accessed: Mutex<Instant>,
}

impl CachedArchive {
    fn new(key: String, file_name: String, data: Vec<u8>) -> Self {
        let now = Instant::now();
        Self {
            key,
            file_name,
            data,
            created_at: now,
            last_accessed: Mutex::new(now),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn refresh(&self) {
        *self.last_accessed.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_accessed.lock().elapsed()
    }
}

/// Cache key for a selection: sorted, de-duplicated ids joined by `;`.
pub fn cache_key(ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join(";")
}

/// Archives by selection key.
#[derive(Debug, Default)]
pub struct DownloadCache {
    entries: Mutex<HashMap<String, Arc<CachedArchive>>>,
}

impl DownloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an archive and mark it as used.
    pub fn get(&self, key: &str) -> Option<Arc<CachedArchive>> {
        let hit = self.entries.lock().get(key).cloned();
        if let Some(archive) = &hit {
            archive.refresh();
        }
        hit
    }

    pub fn insert(&self, archive: Arc<CachedArchive>) {
        self.entries.lock().insert(archive.key.clone(), archive);
    }

    /// Drop archives not read for longer than `max_idle`. Returns how many went.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, archive| {
            let keep = archive.idle_for() <= max_idle;
            if !keep {
                tracing::info!(key = %key, file = %archive.file_name, "cached download expired");
            }
            keep
        });
        let removed = before - entries.len();
        if removed > 0 {
            tracing::warn!(count = removed, "download sweep found expired downloads");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// File info, ranged reads and zipped selections.
#[derive(Debug)]
pub struct DownloadService {
    roots: Arc<RootTable>,
    config: Arc<Config>,
    cache: DownloadCache,
}

impl DownloadService {
    pub fn new(roots: Arc<RootTable>, config: Arc<Config>) -> Self {
        Self {
            roots,
            config,
            cache: DownloadCache::new(),
        }
    }

    pub fn cache(&self) -> &DownloadCache {
        &self.cache
    }

    fn file_path(&self, file_id: &str) -> VirtualPath {
        VirtualPath::parse(file_id, PathKind::File, self.roots.mode())
    }

    /// True when the selection is exactly one file.
    pub fn is_single_file(&self, ids: &[String]) -> bool {
        match ids {
            [only] => VirtualPath::new(only.as_str(), self.roots.mode()).is_file(),
            _ => false,
        }
    }

    /// Listing entry for one file.
    pub async fn file_info(&self, file_id: &str) -> DeckResult<FileView> {
        let path = self.file_path(file_id);
        let physical = path.to_physical_file(&self.roots)?;
        let meta = fs::metadata(&physical).await.inspect_err(|e| {
            tracing::error!(path = %path, error = %e, "file info failed");
        })?;
        let file_type = self.config.file_type(&physical);
        Ok(file_view(&path, &meta, Some(&file_type)))
    }

    /// Open a file for streaming.
    pub async fn open_file(&self, file_id: &str) -> DeckResult<fs::File> {
        let physical = self.file_path(file_id).to_physical_file(&self.roots)?;
        Ok(fs::File::open(&physical).await?)
    }

    /// Read a slice of a file.
    pub async fn read_range(&self, file_id: &str, range: &ByteRange) -> DeckResult<RangePayload> {
        let path = self.file_path(file_id);
        let physical = path.to_physical_file(&self.roots)?;
        let mut file = fs::File::open(&physical).await?;
        let total = file.metadata().await?.len();
        let (start, end) = get_range(total, range)?;

        file.seek(SeekFrom::Start(start)).await?;
        let mut data = Vec::with_capacity((end - start) as usize);
        file.take(end - start).read_to_end(&mut data).await?;
        let end = start + data.len() as u64;

        tracing::debug!(path = %path, range = %range, start, end, total, "range read");
        Ok(RangePayload {
            file_name: path.name().to_string(),
            data,
            start,
            end,
            total_size: total,
        })
    }

    /// Slice a zipped selection.
    pub fn archive_range(&self, archive: &CachedArchive, range: &ByteRange) -> DeckResult<RangePayload> {
        let total = archive.size();
        let (start, end) = get_range(total, range)?;
        Ok(RangePayload {
            file_name: archive.file_name.clone(),
            data: archive.data[start as usize..end as usize].to_vec(),
            start,
            end,
            total_size: total,
        })
    }

    /// Zip a selection, consulting the cache when `cache` is set.
    pub async fn compress(&self, ids: &[String], cache: bool) -> DeckResult<Arc<CachedArchive>> {
        if ids.is_empty() {
            return Err(DeckError::bad_request("no items selected"));
        }
        let key = cache_key(ids);
        if cache && let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, "loaded download from cache");
            return Ok(hit);
        }

        let mode = self.roots.mode();
        // Same ids as the key: a repeated id is archived once.
        let mut seen = HashSet::new();
        let paths: Vec<VirtualPath> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| VirtualPath::new(id.as_str(), mode))
            .collect();
        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
        let file_name = match paths.as_slice() {
            [only] => format!("{}-{stamp}.zip", only.name()),
            _ => format!("download-{stamp}.zip"),
        };

        let roots = Arc::clone(&self.roots);
        let data = tokio::task::spawn_blocking(move || archive::archive(&roots, &paths)).await??;
        let built = Arc::new(CachedArchive::new(key.clone(), file_name, data));

        if cache {
            self.cache.insert(Arc::clone(&built));
            tracing::info!(key = %key, file = %built.file_name, bytes = built.size(), "saved download to cache");
        } else {
            tracing::info!(key = %key, file = %built.file_name, bytes = built.size(), "compressed download");
        }
        Ok(built)
    }

    /// Whole download: the file itself for a single file, otherwise a zip.
    pub async fn download(&self, ids: &[String]) -> DeckResult<Download> {
        tracing::info!(items = %ids.join(","), "download");
        if ids.is_empty() {
            tracing::warn!("download with no items selected");
            return Err(DeckError::bad_request("no items selected"));
        }
        if self.is_single_file(ids) {
            let path = self.file_path(&ids[0]);
            let physical = path.to_physical_file(&self.roots)?;
            let data = fs::read(&physical).await?;
            return Ok(Download {
                file_name: path.name().to_string(),
                data,
            });
        }

        let built = self.compress(ids, false).await?;
        let archive = Arc::try_unwrap(built).unwrap_or_else(|shared| CachedArchive::new(
            shared.key.clone(),
            shared.file_name.clone(),
            shared.data.clone(),
        ));
        Ok(Download {
            file_name: archive.file_name,
            data: archive.data,
        })
    }

    /// Drop cached archives idle for longer than `max_idle`.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        self.cache.sweep_idle(max_idle)
    }
}
