//! Listing and tree types handed to renderers.

use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// Whether an entry is a file or a folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    pub fn is_folder(&self) -> bool {
        matches!(self, EntryKind::Folder)
    }
}

/// Broad content category of a file, configured per extension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum FileCategory {
    #[default]
    Unknown,
    Text,
    Image,
    Audio,
    Video,
    Pdf,
}

impl FileCategory {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }
}

/// One entry of a folder listing.
///
/// For folders `size` is the number of direct children, for files it is the
/// length in bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileView {
    /// Virtual path of the entry (folders end with `/`).
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub category: FileCategory,
    pub icon: Option<String>,
    /// False when the entry exists but could not be enumerated.
    pub accessible: bool,
    pub created: Option<SystemTime>,
    pub modified: Option<SystemTime>,
    pub size: u64,
    pub read_only: bool,
}

/// A node of the folder tree.
///
/// Collapsed nodes report `has_children`; expanded nodes (ancestors of the
/// selected folder) carry their `children` instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<FolderNode>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub has_children: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub opened: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selected: Option<bool>,
}

impl FolderNode {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Text contents of a file for an editor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
    pub syntax: String,
    pub read_only: bool,
}
