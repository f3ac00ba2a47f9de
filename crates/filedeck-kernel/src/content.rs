//! Text contents of files, for an in-browser editor.

use std::path::Path;
use std::sync::Arc;

use filedeck_types::{FileCategory, TextContent};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::config::{Config, FileTypeConfig};
use crate::error::{DeckError, DeckResult};
use crate::vpath::{RootTable, VirtualPath};

/// Read and save text files according to the configured file types.
#[derive(Debug, Clone)]
pub struct ContentService {
    roots: Arc<RootTable>,
    config: Arc<Config>,
}

impl ContentService {
    pub fn new(roots: Arc<RootTable>, config: Arc<Config>) -> Self {
        Self { roots, config }
    }

    /// File type of a physical path.
    pub fn file_type(&self, path: &Path) -> FileTypeConfig {
        self.config.file_type(path)
    }

    fn resolve_file(&self, file_id: &str) -> DeckResult<std::path::PathBuf> {
        let path = VirtualPath::new(file_id, self.roots.mode());
        if path.is_folder() {
            return Err(DeckError::io("file is a folder, not a file"));
        }
        path.to_physical_file(&self.roots)
    }

    /// Read up to the type's `max-size` bytes.
    ///
    /// A longer file comes back truncated with a trailer counting the
    /// missing bytes, and is always read-only.
    pub async fn get_text(&self, file_id: &str) -> DeckResult<TextContent> {
        let file = self.resolve_file(file_id)?;
        let file_type = self.file_type(&file);

        let meta = fs::metadata(&file).await?;
        let total = meta.len();
        let mut read_only = file_type.read_only || meta.permissions().readonly();

        let mut buf = Vec::new();
        fs::File::open(&file)
            .await?
            .take(file_type.max_size)
            .read_to_end(&mut buf)
            .await?;

        let mut text = String::from_utf8_lossy(&buf).into_owned();
        let shown = buf.len() as u64;
        if total > shown {
            read_only = true;
            text.push('\n');
            text.push_str(&format!(
                "=========== {} bytes not shown ===========",
                group_thousands(total - shown)
            ));
            tracing::debug!(file = %file_id, total, shown, "text truncated");
        }

        Ok(TextContent {
            text,
            syntax: file_type.syntax,
            read_only,
        })
    }

    /// Overwrite a text file.
    ///
    /// Only files of a writable `text` type no larger than `max-size` can be
    /// saved.
    pub async fn set_text(&self, file_id: &str, content: &str) -> DeckResult<TextContent> {
        let file = self.resolve_file(file_id)?;
        let file_type = self.file_type(&file);

        if file_type.category != FileCategory::Text {
            return Err(DeckError::io(format!(
                "file is type {:?} - only text file types can be saved",
                file_type.category
            )));
        }
        if content.len() as u64 > file_type.max_size {
            return Err(DeckError::io(format!(
                "file is too large - size: {} max-size: {}",
                content.len(),
                file_type.max_size
            )));
        }
        if file_type.read_only {
            return Err(DeckError::io(format!("file type {} is read-only", file_type.syntax)));
        }

        if let Err(e) = fs::write(&file, content).await {
            tracing::error!(file = %file_id, error = %e, "unable to save text");
            return Err(e.into());
        }
        tracing::info!(file = %file_id, bytes = content.len(), "text saved");

        Ok(TextContent {
            text: content.to_string(),
            syntax: file_type.syntax,
            read_only: false,
        })
    }
}

/// `1234567` → `1,234,567`.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
