//! The virtual path value type.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use filedeck_types::EntryKind;
use serde::{Deserialize, Serialize};
use strum::EnumString;

use super::roots::RootTable;
use crate::error::{DeckError, DeckResult};

/// Virtual path separator.
pub const SEPARATOR: char = '/';

/// How path strings are compared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum CaseMode {
    #[serde(alias = "case-sensitive", alias = "ordinal")]
    #[strum(serialize = "sensitive", serialize = "case-sensitive", serialize = "ordinal")]
    Sensitive,
    #[default]
    #[serde(alias = "case-insensitive", alias = "ignore-case")]
    #[strum(
        serialize = "insensitive",
        serialize = "case-insensitive",
        serialize = "ignore-case"
    )]
    Insensitive,
}

impl CaseMode {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Compare two strings under this mode.
    pub fn equals(&self, a: &str, b: &str) -> bool {
        match self {
            CaseMode::Sensitive => a == b,
            CaseMode::Insensitive => a
                .chars()
                .flat_map(char::to_lowercase)
                .eq(b.chars().flat_map(char::to_lowercase)),
        }
    }

    /// Strip `prefix` from `value` under this mode.
    pub fn strip_prefix<'a>(&self, value: &'a str, prefix: &str) -> Option<&'a str> {
        match self {
            CaseMode::Sensitive => value.strip_prefix(prefix),
            CaseMode::Insensitive => {
                let mut rest = value.char_indices();
                for expected in prefix.chars() {
                    let (_, actual) = rest.next()?;
                    if !actual.to_lowercase().eq(expected.to_lowercase()) {
                        return None;
                    }
                }
                let offset = rest.next().map(|(i, _)| i).unwrap_or(value.len());
                Some(&value[offset..])
            }
        }
    }
}

/// Kind hint used when parsing a raw path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKind {
    /// Force a file path (trailing `/` is dropped).
    File,
    /// Force a folder path (trailing `/` is added).
    Folder,
    /// Infer from the trailing separator.
    Unknown,
}

impl From<EntryKind> for PathKind {
    fn from(kind: EntryKind) -> Self {
        match kind {
            EntryKind::File => PathKind::File,
            EntryKind::Folder => PathKind::Folder,
        }
    }
}

/// An immutable virtual path.
///
/// Folder values always end with `/`; file values never do. Two paths are
/// equal when their values match, ignoring case only when both sides are
/// case-insensitive. All paths built by one service share the configured
/// mode, so mixed-mode comparisons do not come up in practice.
#[derive(Clone)]
pub struct VirtualPath {
    value: String,
    kind: EntryKind,
    mode: CaseMode,
}

impl VirtualPath {
    /// Parse a raw path with a kind hint.
    ///
    /// Every spelling of the synthetic root becomes the folder `/`. Empty
    /// segments collapse, so `/docs//a` reads as `/docs/a` and a missing
    /// leading separator is added.
    pub fn parse(raw: impl Into<String>, hint: PathKind, mode: CaseMode) -> Self {
        let raw: String = raw.into();
        let segments: Vec<&str> = raw.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
        if raw == "#" || segments.is_empty() {
            return Self {
                value: SEPARATOR.to_string(),
                kind: EntryKind::Folder,
                mode,
            };
        }

        let kind = match hint {
            PathKind::File => EntryKind::File,
            PathKind::Folder => EntryKind::Folder,
            PathKind::Unknown if raw.ends_with(SEPARATOR) => EntryKind::Folder,
            PathKind::Unknown => EntryKind::File,
        };

        let mut value = format!("{SEPARATOR}{}", segments.join("/"));
        if kind.is_folder() {
            value.push(SEPARATOR);
        }
        Self { value, kind, mode }
    }

    /// Parse a raw path, inferring the kind from the trailing separator.
    pub fn new(raw: impl Into<String>, mode: CaseMode) -> Self {
        Self::parse(raw, PathKind::Unknown, mode)
    }

    /// The synthetic root.
    pub fn root(mode: CaseMode) -> Self {
        Self::parse("/", PathKind::Folder, mode)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn mode(&self) -> CaseMode {
        self.mode
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    pub fn is_file(&self) -> bool {
        !self.is_folder()
    }

    /// True for `""`, `"/"` and `"#"`.
    pub fn is_root(&self) -> bool {
        matches!(self.value.as_str(), "" | "/" | "#")
    }

    /// Non-empty segments. The root has none.
    pub fn parts(&self) -> Vec<&str> {
        if self.is_root() {
            return Vec::new();
        }
        self.value
            .split(SEPARATOR)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Last segment, or empty for the root.
    pub fn name(&self) -> &str {
        self.parts().last().copied().unwrap_or("")
    }

    /// Path of a direct child. Only folders have children.
    pub fn child(&self, name: &str, kind: PathKind) -> DeckResult<Self> {
        if !self.is_folder() {
            return Err(DeckError::invalid_path(format!(
                "unable to get the child of a file: {}",
                self.value
            )));
        }
        let base = if self.is_root() { "/" } else { self.value.as_str() };
        Ok(Self::parse(format!("{base}{name}"), kind, self.mode))
    }

    /// The containing folder. The parent of a top-level path is the root.
    pub fn parent(&self) -> Self {
        let parts = self.parts();
        if parts.len() <= 1 {
            return Self::root(self.mode);
        }
        let joined = parts[..parts.len() - 1].join("/");
        Self::parse(format!("/{joined}/"), PathKind::Folder, self.mode)
    }

    /// How many levels `other` sits below `self`.
    ///
    /// `Some(0)` when equal, `Some(1)` for a direct child, `None` when `self`
    /// is not an ancestor of `other`.
    pub fn ancestor_index(&self, other: &VirtualPath) -> Option<usize> {
        let mine = self.parts();
        let theirs = other.parts();
        if theirs.len() < mine.len() {
            return None;
        }
        let all_match = mine
            .iter()
            .zip(theirs.iter())
            .all(|(a, b)| self.mode.equals(a, b));
        all_match.then(|| theirs.len() - mine.len())
    }

    /// Equality for optional paths: an absent path equals nothing.
    pub fn same(a: Option<&VirtualPath>, b: Option<&VirtualPath>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// True when the value is exactly one of the configured root prefixes.
    pub fn is_root_folder(&self, roots: &RootTable) -> bool {
        roots.is_root_folder(&self.value, self.mode)
    }

    /// Map to a physical path under the first matching root.
    ///
    /// Fails for the synthetic root, for values under no root and for
    /// values containing `.` or `..` segments.
    pub fn resolve(&self, roots: &RootTable) -> DeckResult<PathBuf> {
        if self.is_root() {
            return Err(DeckError::invalid_path("the root folder has no physical path"));
        }
        let (root, rest) = roots
            .find(&self.value, self.mode)
            .ok_or_else(|| DeckError::invalid_path(self.value.clone()))?;

        let mut physical = root.dir().to_path_buf();
        for segment in rest.split(SEPARATOR).filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(DeckError::invalid_path(format!(
                    "{} cannot contain {segment}",
                    self.value
                )));
            }
            physical.push(segment);
        }
        Ok(physical)
    }

    /// Physical directory of a folder path.
    pub fn to_physical_directory(&self, roots: &RootTable) -> DeckResult<PathBuf> {
        if self.is_root() {
            return Err(DeckError::invalid_path("cannot get directory of root folder"));
        }
        self.resolve(roots)
    }

    /// Physical file of a file path.
    pub fn to_physical_file(&self, roots: &RootTable) -> DeckResult<PathBuf> {
        if self.is_root() {
            return Err(DeckError::invalid_path("root is not a file"));
        }
        self.resolve(roots)
    }

    /// Virtual path of a physical file.
    pub fn from_physical_file(path: &Path, roots: &RootTable) -> DeckResult<Self> {
        Self::from_physical(path, PathKind::File, roots)
    }

    /// Virtual path of a physical directory.
    pub fn from_physical_dir(path: &Path, roots: &RootTable) -> DeckResult<Self> {
        Self::from_physical(path, PathKind::Folder, roots)
    }

    fn from_physical(path: &Path, kind: PathKind, roots: &RootTable) -> DeckResult<Self> {
        let (root, segments) = roots
            .locate(path)
            .ok_or_else(|| DeckError::invalid_path(path.display().to_string()))?;
        let mut value = root.prefix().to_string();
        value.push_str(&segments.join("/"));
        Ok(Self::parse(value, kind, roots.mode()))
    }
}

impl PartialEq for VirtualPath {
    fn eq(&self, other: &Self) -> bool {
        if self.mode == CaseMode::Insensitive && other.mode == CaseMode::Insensitive {
            CaseMode::Insensitive.equals(&self.value, &other.value)
        } else {
            self.value == other.value
        }
    }
}

impl Eq for VirtualPath {}

// Folded per char like `CaseMode::equals`, so equal paths hash alike.
impl Hash for VirtualPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.value.chars().flat_map(char::to_lowercase) {
            c.hash(state);
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl fmt::Debug for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPath({:?})", self.value)
    }
}

impl AsRef<str> for VirtualPath {
    fn as_ref(&self) -> &str {
        &self.value
    }
}
