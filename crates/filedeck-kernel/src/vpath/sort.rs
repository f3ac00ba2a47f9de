//! Listing order.
//!
//! Names always compare case-insensitively, even on a case-sensitive
//! namespace. Folders only know name orders; a size order lists them by
//! ascending name.

use std::cmp::Ordering;
use std::str::FromStr;

use filedeck_types::FileView;
use serde::{Deserialize, Serialize};
use strum::EnumString;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum SortOrder {
    #[default]
    #[strum(serialize = "name-asc", serialize = "name", serialize = "nameasc")]
    NameAsc,
    #[strum(serialize = "name-desc", serialize = "namedesc")]
    NameDesc,
    #[strum(serialize = "size-asc", serialize = "size", serialize = "sizeasc")]
    SizeAsc,
    #[strum(serialize = "size-desc", serialize = "sizedesc")]
    SizeDesc,
}

impl SortOrder {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::NameAsc => "name-asc",
            SortOrder::NameDesc => "name-desc",
            SortOrder::SizeAsc => "size-asc",
            SortOrder::SizeDesc => "size-desc",
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn by_name(a: &FileView, b: &FileView) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort folder entries.
pub fn sort_folders(entries: &mut [FileView], order: SortOrder) {
    match order {
        SortOrder::NameDesc => entries.sort_by(|a, b| by_name(b, a)),
        _ => entries.sort_by(by_name),
    }
}

/// Sort file entries. Equal sizes fall back to ascending name.
pub fn sort_files(entries: &mut [FileView], order: SortOrder) {
    match order {
        SortOrder::NameAsc => entries.sort_by(by_name),
        SortOrder::NameDesc => entries.sort_by(|a, b| by_name(b, a)),
        SortOrder::SizeAsc => entries.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| by_name(a, b))),
        SortOrder::SizeDesc => entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| by_name(a, b))),
    }
}
