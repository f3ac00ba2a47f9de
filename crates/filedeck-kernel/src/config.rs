//! File manager configuration.
//!
//! Loaded once at startup from a TOML file:
//!
//! ```toml
//! comparison = "insensitive"
//! upload-directory = "/var/tmp/filedeck"
//! upload-chunk-size = 512000
//!
//! [root-folders]
//! "/docs/" = "/srv/docs"
//! "/media/" = "/srv/media"
//!
//! [file-types.".md"]
//! type = "text"
//! syntax = "markdown"
//! read-only = false
//!
//! [timings]
//! job-expiry = 60.0
//! ```
//!
//! Root folder order matters: path resolution picks the first matching
//! prefix, so `root-folders` is kept in file order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use filedeck_types::FileCategory;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{DeckError, DeckResult};
use crate::vpath::CaseMode;

/// Default recommended upload chunk size (500 KiB).
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 1024 * 500;

/// Default max size of an editable text file (1 MiB).
pub const DEFAULT_MAX_TEXT_SIZE: u64 = 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Case handling for virtual path comparison.
    pub comparison: CaseMode,
    /// Where in-flight uploads are staged.
    pub upload_directory: PathBuf,
    /// Chunk size recommended to upload clients.
    pub upload_chunk_size: u64,
    /// Virtual prefix (`/name/`) → physical directory, in resolution order.
    pub root_folders: IndexMap<String, PathBuf>,
    /// Per-extension file type settings, keyed like `".txt"`.
    pub file_types: HashMap<String, FileTypeConfig>,
    pub timings: Timings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            comparison: CaseMode::Insensitive,
            upload_directory: std::env::temp_dir().join("filedeck-uploads"),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            root_folders: IndexMap::new(),
            file_types: HashMap::new(),
            timings: Timings::default(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> DeckResult<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| DeckError::config(format!("parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> DeckResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeckError::config(format!("unable to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    /// Check values serde cannot enforce.
    pub fn validate(&self) -> DeckResult<()> {
        if self.upload_chunk_size == 0 {
            return Err(DeckError::config("upload-chunk-size must be positive"));
        }
        if self.upload_directory.as_os_str().is_empty() {
            return Err(DeckError::config("upload-directory cannot be empty"));
        }
        Ok(())
    }

    /// Add a root folder. Mostly useful for building configs in code.
    pub fn with_root(mut self, prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.root_folders.insert(prefix.into(), dir.into());
        self
    }

    /// Look up the file type for a path by its extension.
    ///
    /// Unknown extensions are read-only with no syntax.
    pub fn file_type(&self, path: &Path) -> FileTypeConfig {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return FileTypeConfig::unknown();
        };
        let ext = ext.to_lowercase();
        self.file_types
            .get(&format!(".{ext}"))
            .or_else(|| self.file_types.get(&ext))
            .cloned()
            .unwrap_or_else(FileTypeConfig::unknown)
    }
}

/// Settings for one file extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileTypeConfig {
    #[serde(rename = "type")]
    pub category: FileCategory,
    pub icon: Option<String>,
    /// Editor syntax mode, e.g. `markdown`.
    pub syntax: String,
    pub read_only: bool,
    /// Files larger than this are shown truncated and cannot be saved.
    pub max_size: u64,
}

impl Default for FileTypeConfig {
    fn default() -> Self {
        Self {
            category: FileCategory::Unknown,
            icon: None,
            syntax: "text".to_string(),
            read_only: true,
            max_size: DEFAULT_MAX_TEXT_SIZE,
        }
    }
}

impl FileTypeConfig {
    /// Settings for an extension with no configuration.
    pub fn unknown() -> Self {
        Self {
            syntax: String::new(),
            ..Self::default()
        }
    }
}

/// Background timings, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Timings {
    /// A paste job never reports finished earlier than this after starting.
    pub job_min_duration: f64,
    /// Finished jobs are dropped after this long.
    pub job_expiry: f64,
    pub job_sweep_interval: f64,
    /// Uploads with no activity for this long are cancelled.
    pub upload_idle: f64,
    pub upload_sweep_interval: f64,
    /// Cached archives not read for this long are evicted.
    pub archive_idle: f64,
    pub archive_sweep_interval: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            job_min_duration: 1.0,
            job_expiry: 60.0,
            job_sweep_interval: 60.0,
            upload_idle: 60.0 * 60.0,
            upload_sweep_interval: 5.0 * 60.0,
            archive_idle: 15.0 * 60.0,
            archive_sweep_interval: 5.0 * 60.0,
        }
    }
}

impl Timings {
    pub fn job_min_duration(&self) -> Duration {
        secs(self.job_min_duration)
    }

    pub fn job_expiry(&self) -> Duration {
        secs(self.job_expiry)
    }

    pub fn job_sweep_interval(&self) -> Duration {
        secs(self.job_sweep_interval)
    }

    pub fn upload_idle(&self) -> Duration {
        secs(self.upload_idle)
    }

    pub fn upload_sweep_interval(&self) -> Duration {
        secs(self.upload_sweep_interval)
    }

    pub fn archive_idle(&self) -> Duration {
        secs(self.archive_idle)
    }

    pub fn archive_sweep_interval(&self) -> Duration {
        secs(self.archive_sweep_interval)
    }
}

// Negative or NaN values collapse to zero rather than panicking.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
