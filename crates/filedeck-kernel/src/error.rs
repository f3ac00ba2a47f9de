//! Kernel error types.

use std::io;
use thiserror::Error;

/// Kernel error type.
#[derive(Debug, Error)]
pub enum DeckError {
    /// Malformed or missing caller input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Path does not map into any configured root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Filesystem-level failure described by the kernel.
    #[error("{0}")]
    Io(String),

    /// Filesystem failure reported by the OS.
    #[error("I/O error: {0}")]
    Fs(#[from] io::Error),

    /// Unknown job or upload id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Access denied. Raised by collaborators, never by the kernel itself.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Zip encoding failure.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl DeckError {
    /// Create a BadRequest error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an Io error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP status a front end should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            DeckError::BadRequest(_) => 400,
            DeckError::Unauthorized(_) => 401,
            DeckError::NotFound(_) => 404,
            DeckError::Fs(e) if e.kind() == io::ErrorKind::NotFound => 404,
            DeckError::Fs(e) if e.kind() == io::ErrorKind::PermissionDenied => 401,
            DeckError::InvalidPath(_)
            | DeckError::Io(_)
            | DeckError::Fs(_)
            | DeckError::Config(_)
            | DeckError::Archive(_)
            | DeckError::Task(_) => 500,
        }
    }
}

impl From<tokio::task::JoinError> for DeckError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

/// Convert DeckError to std::io::Error for compatibility.
impl From<DeckError> for io::Error {
    fn from(e: DeckError) -> Self {
        match e {
            DeckError::BadRequest(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            DeckError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            DeckError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            DeckError::Unauthorized(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            DeckError::Fs(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// Kernel result type.
pub type DeckResult<T> = Result<T, DeckError>;
