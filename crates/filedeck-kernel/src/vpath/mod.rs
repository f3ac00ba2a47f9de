//! Virtual path namespace.
//!
//! Clients address files through virtual paths like `/docs/reports/q3.pdf`.
//! The first segment(s) name a configured root; the rest is relative to that
//! root's physical directory.
//!
//! - [`VirtualPath`] - immutable path value (trailing `/` marks a folder)
//! - [`RootTable`] - ordered prefix → physical directory mapping
//! - [`SortOrder`] - listing order for folder views
//!
//! The synthetic root (`""`, `"/"` or `"#"`) lists the configured roots and
//! never maps to a physical directory.

mod path;
mod roots;
mod sort;

pub use path::{CaseMode, PathKind, VirtualPath};
pub use roots::{Root, RootTable};
pub use sort::{SortOrder, sort_files, sort_folders};
