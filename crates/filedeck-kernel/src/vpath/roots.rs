//! Root table: virtual prefixes bound to physical directories.
//!
//! Unlike a mount table there is no longest-prefix routing. Roots are tried
//! in configuration order and the first prefix that matches wins.

use std::path::{Component, Path, PathBuf};

use tracing::warn;

use super::path::{CaseMode, SEPARATOR};
use crate::config::Config;
use crate::error::{DeckError, DeckResult};

/// One configured root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    prefix: String,
    dir: PathBuf,
}

impl Root {
    /// Virtual prefix, e.g. `/docs/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Physical directory the prefix maps to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Display name: the prefix without its slashes.
    pub fn name(&self) -> &str {
        self.prefix.trim_matches(SEPARATOR)
    }
}

/// Ordered, immutable list of roots.
#[derive(Debug, Clone)]
pub struct RootTable {
    roots: Vec<Root>,
    mode: CaseMode,
}

impl RootTable {
    /// Build a table from `(prefix, directory)` pairs.
    ///
    /// Prefixes must start and end with `/` and name something. Directories
    /// are canonicalized when they exist so that physical paths reported by
    /// the OS map back cleanly.
    pub fn new(
        entries: impl IntoIterator<Item = (String, PathBuf)>,
        mode: CaseMode,
    ) -> DeckResult<Self> {
        let mut roots: Vec<Root> = Vec::new();
        for (prefix, dir) in entries {
            Self::validate_prefix(&prefix)?;
            if dir.as_os_str().is_empty() {
                return Err(DeckError::config(format!("root {prefix} has no directory")));
            }
            if roots.iter().any(|r| mode.equals(&r.prefix, &prefix)) {
                return Err(DeckError::config(format!("duplicate root {prefix}")));
            }
            for existing in &roots {
                if mode.strip_prefix(&prefix, &existing.prefix).is_some()
                    || mode.strip_prefix(&existing.prefix, &prefix).is_some()
                {
                    warn!(
                        first = %existing.prefix,
                        second = %prefix,
                        "overlapping root prefixes, the first configured wins"
                    );
                }
            }
            let dir = dunce::canonicalize(&dir).unwrap_or(dir);
            roots.push(Root { prefix, dir });
        }
        Ok(Self { roots, mode })
    }

    /// Build the table from the `root-folders` section.
    pub fn from_config(config: &Config) -> DeckResult<Self> {
        Self::new(
            config
                .root_folders
                .iter()
                .map(|(prefix, dir)| (prefix.clone(), dir.clone())),
            config.comparison,
        )
    }

    fn validate_prefix(prefix: &str) -> DeckResult<()> {
        let well_formed = prefix.len() > 2
            && prefix.starts_with(SEPARATOR)
            && prefix.ends_with(SEPARATOR)
            && prefix
                .split(SEPARATOR)
                .all(|segment| segment != ".." && segment != "." && segment != "#");
        if well_formed {
            Ok(())
        } else {
            Err(DeckError::config(format!(
                "invalid root prefix {prefix:?}: expected /name/"
            )))
        }
    }

    pub fn mode(&self) -> CaseMode {
        self.mode
    }

    pub fn iter(&self) -> impl Iterator<Item = &Root> {
        self.roots.iter()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// First root whose prefix starts `value`, with the remainder.
    pub fn find<'a>(&self, value: &'a str, mode: CaseMode) -> Option<(&Root, &'a str)> {
        self.roots
            .iter()
            .find_map(|root| mode.strip_prefix(value, &root.prefix).map(|rest| (root, rest)))
    }

    /// True when `value` is exactly a configured prefix.
    pub fn is_root_folder(&self, value: &str, mode: CaseMode) -> bool {
        self.roots.iter().any(|root| mode.equals(&root.prefix, value))
    }

    /// First root containing `physical`, with the relative segments.
    ///
    /// Root directories are stored canonical, so a path that does not match
    /// as given is canonicalized and tried again.
    pub fn locate(&self, physical: &Path) -> Option<(&Root, Vec<String>)> {
        self.locate_exact(physical)
            .or_else(|| self.locate_exact(&canonical(physical)?))
    }

    fn locate_exact(&self, physical: &Path) -> Option<(&Root, Vec<String>)> {
        self.roots.iter().find_map(|root| {
            strip_physical_prefix(physical, &root.dir, self.mode).map(|rest| (root, rest))
        })
    }
}

// A path that does not exist yet keeps its file name under the canonical parent.
fn canonical(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = dunce::canonicalize(path) {
        return Some(resolved);
    }
    let parent = dunce::canonicalize(path.parent()?).ok()?;
    Some(parent.join(path.file_name()?))
}

/// Component-wise prefix strip. Only normal components may follow the root.
fn strip_physical_prefix(path: &Path, root: &Path, mode: CaseMode) -> Option<Vec<String>> {
    let mut components = path.components();
    for expected in root.components() {
        let actual = components.next()?;
        let matches = match (actual, expected) {
            (Component::Normal(a), Component::Normal(b)) => {
                mode.equals(&a.to_string_lossy(), &b.to_string_lossy())
            }
            (a, b) => a == b,
        };
        if !matches {
            return None;
        }
    }

    components
        .map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(prefix: &str, dir: &str) -> (String, PathBuf) {
        (prefix.to_string(), PathBuf::from(dir))
    }

    #[test]
    fn test_rejects_bad_prefixes() {
        for bad in ["/", "docs/", "/docs", "", "/../", "//"] {
            let err = RootTable::new(vec![pair(bad, "/srv/x")], CaseMode::Insensitive);
            assert!(matches!(err, Err(DeckError::Config(_))), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = RootTable::new(
            vec![pair("/docs/", "/srv/a"), pair("/DOCS/", "/srv/b")],
            CaseMode::Insensitive,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_first_match_wins() {
        let table = RootTable::new(
            vec![pair("/a/", "/srv/one"), pair("/a/b/", "/srv/two")],
            CaseMode::Sensitive,
        )
        .unwrap();
        let (root, rest) = table.find("/a/b/c.txt", CaseMode::Sensitive).unwrap();
        assert_eq!(root.dir(), Path::new("/srv/one"));
        assert_eq!(rest, "b/c.txt");
    }

    #[test]
    fn test_root_name() {
        let table = RootTable::new(vec![pair("/media/", "/srv/media")], CaseMode::Sensitive).unwrap();
        assert_eq!(table.iter().next().unwrap().name(), "media");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_locate() {
        let table = RootTable::new(vec![pair("/docs/", "/srv/docs")], CaseMode::Sensitive).unwrap();
        let (root, rest) = table.locate(Path::new("/srv/docs/x/y.txt")).unwrap();
        assert_eq!(root.prefix(), "/docs/");
        assert_eq!(rest, vec!["x".to_string(), "y.txt".to_string()]);
        assert!(table.locate(Path::new("/srv/docsx/y.txt")).is_none());
        assert!(table.locate(Path::new("/srv/docs/../etc")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_through_linked_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let real = tmp.path().join("real");
        std::fs::create_dir_all(real.join("sub")).unwrap();
        std::fs::write(real.join("sub/a.txt"), "a").unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let table = RootTable::new(vec![("/docs/".to_string(), link.clone())], CaseMode::Sensitive)
            .unwrap();
        let (root, rest) = table.locate(&link.join("sub/a.txt")).unwrap();
        assert_eq!(root.prefix(), "/docs/");
        assert_eq!(rest, vec!["sub".to_string(), "a.txt".to_string()]);

        let (_, rest) = table.locate(&link.join("sub/new.txt")).unwrap();
        assert_eq!(rest, vec!["sub".to_string(), "new.txt".to_string()]);
        assert!(table.locate(&tmp.path().join("elsewhere.txt")).is_none());
    }

    #[test]
    fn test_from_config_keeps_order() {
        let config = Config::default()
            .with_root("/zeta/", "/srv/zeta")
            .with_root("/alpha/", "/srv/alpha");
        let table = RootTable::from_config(&config).unwrap();
        let prefixes: Vec<&str> = table.iter().map(Root::prefix).collect();
        assert_eq!(prefixes, vec!["/zeta/", "/alpha/"]);
    }
}
