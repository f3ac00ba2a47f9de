//! # filedeck-kernel
//!
//! Virtual file operations engine for filedeck.
//!
//! Clients never see physical paths. They address files through virtual
//! paths (`/docs/reports/q1.pdf`, folders end with `/`) that resolve under a
//! table of configured roots. On top of that the kernel provides:
//! - A per-session clipboard and background paste jobs (move/copy)
//! - Chunked uploads staged in a temp directory
//! - Ranged downloads of files and of zipped selections, with an archive cache
//! - Folder listing, the folder tree, delete/rename/create-folder
//! - Text content reads and saves governed by per-extension file types
//!
//! Everything is reached through a [`FileManager`], which also runs the
//! sweeps that expire finished jobs, idle uploads and cached archives.

pub mod archive;
pub mod clipboard;
pub mod config;
pub mod content;
pub mod download;
pub mod error;
pub mod folders;
pub mod manager;
pub mod paste;
pub mod tree;
pub mod upload;
pub mod vpath;

pub use clipboard::{ClipboardEntry, ClipboardStore};
pub use config::{Config, FileTypeConfig, Timings};
pub use content::ContentService;
pub use download::{ByteRange, CachedArchive, DownloadCache, DownloadService, MAX_RANGE_CHUNK};
pub use error::{DeckError, DeckResult};
pub use folders::{FolderService, validate_name};
pub use manager::FileManager;
pub use paste::PasteEngine;
pub use upload::{UploadManager, UploadRequest};
pub use vpath::{CaseMode, PathKind, Root, RootTable, SortOrder, VirtualPath};
