//! Folder browsing and simple mutations.
//!
//! Listing, the folder tree, delete, rename and create-folder. The
//! filesystem work runs on the blocking pool; each public method is a thin
//! async wrapper around a synchronous helper.

use std::fs;
use std::sync::Arc;

use filedeck_types::{
    EntryKind, FileCategory, FileView, FolderNode, ItemResult, OperationResult, ResultCode,
};

use crate::config::{Config, FileTypeConfig};
use crate::error::{DeckError, DeckResult};
use crate::tree;
use crate::vpath::{PathKind, RootTable, SortOrder, VirtualPath, sort_files, sort_folders};

/// Characters a file or folder name may not contain.
const FORBIDDEN_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', '\t', '\r', '\n'];

/// Check a new file or folder name.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.contains(FORBIDDEN_NAME_CHARS) {
        Err("name cannot contain \\ / : * ? \" < > |")
    } else if name.is_empty() {
        Err("name cannot be empty")
    } else if name == "." || name == ".." {
        Err("name cannot be . or ..")
    } else {
        Ok(())
    }
}

/// Listing entry for a file.
pub(crate) fn file_view(
    path: &VirtualPath,
    meta: &fs::Metadata,
    file_type: Option<&FileTypeConfig>,
) -> FileView {
    FileView {
        id: path.to_string(),
        name: path.name().to_string(),
        kind: EntryKind::File,
        category: file_type.map(|t| t.category).unwrap_or_default(),
        icon: file_type.and_then(|t| t.icon.clone()),
        accessible: true,
        created: meta.created().ok(),
        modified: meta.modified().ok(),
        size: meta.len(),
        read_only: meta.permissions().readonly(),
    }
}

fn folder_view(path: &VirtualPath, name: &str, dir: &std::path::Path) -> FileView {
    let meta = fs::metadata(dir).ok();
    let count = tree::count_children(dir);
    FileView {
        id: path.to_string(),
        name: name.to_string(),
        kind: EntryKind::Folder,
        category: FileCategory::Unknown,
        icon: None,
        accessible: count.is_ok(),
        created: meta.as_ref().and_then(|m| m.created().ok()),
        modified: meta.as_ref().and_then(|m| m.modified().ok()),
        size: count.unwrap_or(0),
        read_only: false,
    }
}

/// Browse and mutate folders.
#[derive(Debug, Clone)]
pub struct FolderService {
    roots: Arc<RootTable>,
    config: Arc<Config>,
}

impl FolderService {
    pub fn new(roots: Arc<RootTable>, config: Arc<Config>) -> Self {
        Self { roots, config }
    }

    async fn blocking<T, F>(&self, work: F) -> DeckResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RootTable, &Config) -> DeckResult<T> + Send + 'static,
    {
        let roots = Arc::clone(&self.roots);
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || work(&roots, &config)).await?
    }

    /// Entries of a folder: sub-folders first, then files.
    ///
    /// The root lists the configured roots in configuration order.
    pub async fn list(&self, folder: &str, order: SortOrder) -> DeckResult<Vec<FileView>> {
        let folder = folder.to_string();
        self.blocking(move |roots, config| list_folder(roots, config, &folder, order))
            .await
    }

    /// Folder tree under `id` (the root when empty).
    ///
    /// With `select`, every ancestor of `id` is expanded and `id` itself is
    /// marked selected.
    pub async fn tree(&self, id: &str, select: bool) -> DeckResult<Vec<FolderNode>> {
        let id = id.to_string();
        self.blocking(move |roots, _| {
            let mode = roots.mode();
            let (start, selected) = if id.is_empty() {
                (VirtualPath::root(mode), None)
            } else {
                let path = VirtualPath::parse(id.as_str(), PathKind::Folder, mode);
                if select {
                    (VirtualPath::root(mode), Some(path))
                } else {
                    (path, None)
                }
            };
            folder_nodes(roots, &start, selected.as_ref())
        })
        .await
    }

    /// Delete files and folders.
    pub async fn delete(&self, items: Vec<String>) -> DeckResult<OperationResult> {
        self.blocking(move |roots, _| Ok(delete_items(roots, &items)))
            .await
    }

    /// Rename a file or folder in place.
    pub async fn rename(&self, item: &str, name: &str) -> DeckResult<OperationResult> {
        let item = item.to_string();
        let name = name.to_string();
        self.blocking(move |roots, _| Ok(rename_item(roots, &item, &name)))
            .await
    }

    /// Create an empty folder.
    pub async fn create_folder(&self, parent: &str, name: &str) -> DeckResult<OperationResult> {
        let parent = parent.to_string();
        let name = name.to_string();
        self.blocking(move |roots, _| Ok(create_folder(roots, &parent, &name)))
            .await
    }
}

fn list_folder(
    roots: &RootTable,
    config: &Config,
    folder: &str,
    order: SortOrder,
) -> DeckResult<Vec<FileView>> {
    let path = VirtualPath::new(folder, roots.mode());
    if !path.is_folder() {
        return Err(DeckError::io(format!("path {folder} is not a directory")));
    }

    if path.is_root() {
        return Ok(roots
            .iter()
            .map(|root| {
                let root_path = VirtualPath::parse(root.prefix(), PathKind::Folder, roots.mode());
                folder_view(&root_path, root.name(), root.dir())
            })
            .collect());
    }

    let dir = path.to_physical_directory(roots)?;
    if !dir.is_dir() {
        return Err(DeckError::io(format!("folder {path} does not exist")));
    }
    let (dirs, files) = tree::read_children(&dir)?;

    let mut folders = Vec::with_capacity(dirs.len());
    for sub in &dirs {
        let name = entry_name(sub);
        let child = path.child(&name, PathKind::Folder)?;
        folders.push(folder_view(&child, &name, sub));
    }
    sort_folders(&mut folders, order);

    let mut entries = Vec::with_capacity(files.len());
    for file in &files {
        let child = path.child(&entry_name(file), PathKind::File)?;
        match fs::metadata(file) {
            Ok(meta) => {
                let file_type = config.file_type(file);
                entries.push(file_view(&child, &meta, Some(&file_type)));
            }
            Err(e) => {
                tracing::warn!(path = %child, error = %e, "unable to stat file");
            }
        }
    }
    sort_files(&mut entries, order);

    folders.extend(entries);
    Ok(folders)
}

fn entry_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn tree_node(
    roots: &RootTable,
    path: VirtualPath,
    text: &str,
    dir: &std::path::Path,
    selected: Option<&VirtualPath>,
) -> DeckResult<FolderNode> {
    let mut node = FolderNode::new(path.to_string(), text);
    match selected.and_then(|s| path.ancestor_index(s)) {
        Some(depth) => {
            node.children = folder_nodes(roots, &path, selected)?;
            node.opened = Some(true);
            node.selected = Some(depth == 0);
        }
        None => node.has_children = Some(tree::has_subfolders(dir)),
    }
    Ok(node)
}

fn folder_nodes(
    roots: &RootTable,
    parent: &VirtualPath,
    selected: Option<&VirtualPath>,
) -> DeckResult<Vec<FolderNode>> {
    if parent.is_root() {
        return roots
            .iter()
            .map(|root| {
                let path = VirtualPath::parse(root.prefix(), PathKind::Folder, roots.mode());
                tree_node(roots, path, root.name(), root.dir(), selected)
            })
            .collect();
    }

    let dir = parent.to_physical_directory(roots)?;
    let (mut dirs, _) = match tree::read_children(&dir) {
        Ok(children) => children,
        Err(e) => {
            tracing::warn!(path = %parent, error = %e, "unable to read folder");
            return Ok(Vec::new());
        }
    };
    dirs.sort_by_key(|d| entry_name(d).to_lowercase());

    dirs.iter()
        .map(|sub| {
            let name = entry_name(sub);
            let path = parent.child(&name, PathKind::Folder)?;
            tree_node(roots, path, &name, sub, selected)
        })
        .collect()
}

fn delete_items(roots: &RootTable, items: &[String]) -> OperationResult {
    if items.is_empty() {
        return OperationResult::error("no files selected");
    }

    let paths: Vec<VirtualPath> = items
        .iter()
        .map(|item| VirtualPath::new(item.as_str(), roots.mode()))
        .collect();
    for path in &paths {
        if path.is_root() {
            return OperationResult::error("Cannot Delete Root /");
        }
        if path.is_root_folder(roots) {
            return OperationResult::error(format!("Cannot Delete Root Folder {path}"));
        }
    }

    let results: Vec<ItemResult> = paths.iter().map(|path| delete_one(roots, path)).collect();
    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;
    let code = ResultCode::from_results(&results);
    let message = match code {
        ResultCode::Error if results.len() == 1 => results[0].message.clone(),
        ResultCode::Error => "multiple errors - no items deleted".to_string(),
        ResultCode::Partial => format!("{succeeded} items deleted, {failed} errors"),
        _ if succeeded == 1 => "1 item deleted".to_string(),
        _ => format!("{succeeded} items deleted"),
    };
    tracing::info!(items = items.len(), succeeded, failed, "delete");
    OperationResult::new(code, message, results)
}

fn delete_one(roots: &RootTable, path: &VirtualPath) -> ItemResult {
    let name = path.name();
    let physical = match path.resolve(roots) {
        Ok(p) => p,
        Err(e) => return ItemResult::failed(format!("unable to delete {name} - {e}")),
    };
    if roots.iter().any(|root| root.dir() == physical) {
        return ItemResult::failed(format!("Cannot Delete Root Folder {path}"));
    }
    let exists = if path.is_folder() {
        physical.is_dir()
    } else {
        physical.is_file()
    };
    if !exists {
        return ItemResult::failed(format!("unable to delete {name} because it doesn't exist."));
    }
    match tree::remove(&physical) {
        Ok(()) => ItemResult::ok(format!("{name} deleted")),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "delete failed");
            ItemResult::failed(format!("unable to delete {name} - {e}"))
        }
    }
}

fn rename_item(roots: &RootTable, item: &str, name: &str) -> OperationResult {
    if let Err(msg) = validate_name(name) {
        tracing::warn!(item = %item, name = %name, error = %msg, "rename rejected");
        return OperationResult::error(msg);
    }

    let src = VirtualPath::new(item, roots.mode());
    if src.is_root() {
        return OperationResult::error("Cannot Rename Root /");
    }
    if src.is_root_folder(roots) {
        return OperationResult::error(format!("Cannot Rename Root Folder {item}"));
    }

    let renamed = (|| -> DeckResult<VirtualPath> {
        let dest = src.parent().child(name, src.kind().into())?;
        let from = src.resolve(roots)?;
        let to = dest.resolve(roots)?;
        if fs::symlink_metadata(&to).is_ok() {
            return Err(DeckError::io(format!("{name} already exists")));
        }
        fs::rename(&from, &to)?;
        Ok(dest)
    })();

    match renamed {
        Ok(dest) => {
            tracing::info!(from = %src, to = %dest, "renamed");
            OperationResult::new(
                ResultCode::Success,
                format!("{} renamed", src.name()),
                vec![ItemResult::ok(format!("{src} renamed to {dest}"))],
            )
        }
        Err(e) => {
            tracing::warn!(item = %item, name = %name, error = %e, "rename failed");
            OperationResult::new(
                ResultCode::Error,
                e.to_string(),
                vec![ItemResult::failed(e.to_string())],
            )
        }
    }
}

fn create_folder(roots: &RootTable, parent: &str, name: &str) -> OperationResult {
    if let Err(msg) = validate_name(name) {
        return OperationResult::error(msg);
    }
    let parent = VirtualPath::parse(parent, PathKind::Folder, roots.mode());
    if parent.is_root() {
        return OperationResult::error("cannot create a folder in the root");
    }

    let created = (|| -> DeckResult<VirtualPath> {
        let dest = parent.child(name, PathKind::Folder)?;
        let dir = dest.to_physical_directory(roots)?;
        if fs::symlink_metadata(&dir).is_ok() {
            return Err(DeckError::io(format!("folder {name} already exists")));
        }
        fs::create_dir(&dir)?;
        Ok(dest)
    })();

    match created {
        Ok(dest) => {
            tracing::info!(path = %dest, "created folder");
            OperationResult::success(format!("created folder {name}"))
        }
        Err(e) => {
            tracing::warn!(parent = %parent, name = %name, error = %e, "create folder failed");
            OperationResult::error(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        docs: PathBuf,
        folders: FolderService,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        let media = tmp.path().join("media");
        fs::create_dir_all(docs.join("Beta/inner")).unwrap();
        fs::create_dir_all(docs.join("alpha")).unwrap();
        fs::create_dir_all(&media).unwrap();
        fs::write(docs.join("big.txt"), vec![b'x'; 300]).unwrap();
        fs::write(docs.join("small.md"), "x").unwrap();
        fs::write(docs.join("Beta/inner/deep.txt"), "deep").unwrap();

        let config = Config::from_toml(
            r#"
[file-types.".md"]
type = "text"
icon = "file-md"
"#,
        )
        .unwrap()
        .with_root("/docs/", &docs)
        .with_root("/media/", &media);
        let roots = Arc::new(RootTable::from_config(&config).unwrap());
        let docs = roots.iter().next().unwrap().dir().to_path_buf();
        Fixture {
            _tmp: tmp,
            docs,
            folders: FolderService::new(roots, Arc::new(config)),
        }
    }

    fn ids(views: &[FileView]) -> Vec<&str> {
        views.iter().map(|v| v.id.as_str()).collect()
    }

    // ========================================================================
    // Listing
    // ========================================================================

    #[tokio::test]
    async fn test_list_root() {
        let fx = fixture();
        let views = fx.folders.list("#", SortOrder::NameAsc).await.unwrap();
        assert_eq!(ids(&views), vec!["/docs/", "/media/"]);
        assert_eq!(views[0].name, "docs");
        assert_eq!(views[0].size, 4);
        assert!(views[0].accessible);
    }

    #[tokio::test]
    async fn test_list_folders_then_files() {
        let fx = fixture();
        let views = fx.folders.list("/docs/", SortOrder::SizeAsc).await.unwrap();
        assert_eq!(
            ids(&views),
            vec!["/docs/alpha/", "/docs/Beta/", "/docs/small.md", "/docs/big.txt"]
        );
        assert_eq!(views[3].size, 300);
        assert_eq!(views[2].category, FileCategory::Text);
        assert_eq!(views[2].icon.as_deref(), Some("file-md"));

        let desc = fx.folders.list("/docs/", SortOrder::NameDesc).await.unwrap();
        assert_eq!(
            ids(&desc),
            vec!["/docs/Beta/", "/docs/alpha/", "/docs/small.md", "/docs/big.txt"]
        );
    }

    #[tokio::test]
    async fn test_list_file_is_error() {
        let fx = fixture();
        let err = fx.folders.list("/docs/big.txt", SortOrder::NameAsc).await.unwrap_err();
        assert!(matches!(err, DeckError::Io(_)));
    }

    // ========================================================================
    // Tree
    // ========================================================================

    #[tokio::test]
    async fn test_tree_collapsed() {
        let fx = fixture();
        let nodes = fx.folders.tree("", false).await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].has_children, Some(true));
        assert_eq!(nodes[1].has_children, Some(false));
        assert!(nodes[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_tree_expands_ancestors_of_selection() {
        let fx = fixture();
        let nodes = fx.folders.tree("/docs/Beta/inner/", true).await.unwrap();
        let docs = &nodes[0];
        assert_eq!(docs.opened, Some(true));
        assert_eq!(docs.selected, Some(false));
        assert_eq!(nodes[1].opened, None);

        let names: Vec<&str> = docs.children.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Beta"]);
        let alpha = &docs.children[0];
        assert_eq!(alpha.opened, None);
        assert_eq!(alpha.has_children, Some(false));

        let beta = &docs.children[1];
        assert_eq!(beta.opened, Some(true));
        let inner = &beta.children[0];
        assert_eq!(inner.id, "/docs/Beta/inner/");
        assert_eq!(inner.selected, Some(true));
    }

    #[tokio::test]
    async fn test_tree_of_subfolder() {
        let fx = fixture();
        let nodes = fx.folders.tree("/docs/Beta/", false).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "/docs/Beta/inner/");
    }

    // ========================================================================
    // Delete / rename / create
    // ========================================================================

    #[tokio::test]
    async fn test_delete_refuses_roots() {
        let fx = fixture();
        let result = fx.folders.delete(vec!["/docs/".into()]).await.unwrap();
        assert_eq!(result.code, ResultCode::Error);
        assert_eq!(result.message, "Cannot Delete Root Folder /docs/");
        let result = fx.folders.delete(vec!["/".into()]).await.unwrap();
        assert_eq!(result.message, "Cannot Delete Root /");
        let result = fx.folders.delete(vec![]).await.unwrap();
        assert_eq!(result.code, ResultCode::Error);
        assert!(fx.docs.join("big.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_partial() {
        let fx = fixture();
        let result = fx
            .folders
            .delete(vec!["/docs/big.txt".into(), "/docs/Beta/".into(), "/docs/ghost.txt".into()])
            .await
            .unwrap();
        assert_eq!(result.code, ResultCode::Partial);
        assert_eq!(result.message, "2 items deleted, 1 errors");
        assert_eq!(
            result.results[2].message,
            "unable to delete ghost.txt because it doesn't exist."
        );
        assert!(!fx.docs.join("Beta").exists());
    }

    #[tokio::test]
    async fn test_delete_single_success_message() {
        let fx = fixture();
        let result = fx.folders.delete(vec!["/docs/small.md".into()]).await.unwrap();
        assert_eq!(result.code, ResultCode::Success);
        assert_eq!(result.message, "1 item deleted");
    }

    #[tokio::test]
    async fn test_rename() {
        let fx = fixture();
        let result = fx.folders.rename("/docs/small.md", "notes.md").await.unwrap();
        assert_eq!(result.code, ResultCode::Success);
        assert_eq!(result.message, "small.md renamed");
        assert!(fx.docs.join("notes.md").exists());

        let result = fx.folders.rename("/docs/alpha/", "gamma").await.unwrap();
        assert!(result.is_success());
        assert!(fx.docs.join("gamma").is_dir());
    }

    #[tokio::test]
    async fn test_rename_rejections() {
        let fx = fixture();
        let result = fx.folders.rename("/docs/small.md", "a/b").await.unwrap();
        assert_eq!(result.message, "name cannot contain \\ / : * ? \" < > |");
        let result = fx.folders.rename("/docs/small.md", "").await.unwrap();
        assert_eq!(result.message, "name cannot be empty");
        let result = fx.folders.rename("/media/", "x").await.unwrap();
        assert_eq!(result.message, "Cannot Rename Root Folder /media/");
        let result = fx.folders.rename("/docs/small.md", "big.txt").await.unwrap();
        assert_eq!(result.code, ResultCode::Error);
        assert!(fx.docs.join("small.md").exists());
    }

    #[tokio::test]
    async fn test_create_folder() {
        let fx = fixture();
        let result = fx.folders.create_folder("/docs/", "new one").await.unwrap();
        assert_eq!(result.message, "created folder new one");
        assert!(fx.docs.join("new one").is_dir());

        let again = fx.folders.create_folder("/docs/", "new one").await.unwrap();
        assert_eq!(again.code, ResultCode::Error);
        assert_eq!(again.message, "folder new one already exists");

        let root = fx.folders.create_folder("/", "x").await.unwrap();
        assert_eq!(root.code, ResultCode::Error);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("report (final).pdf").is_ok());
        assert!(validate_name("tab\there").is_err());
        assert!(validate_name("..").is_err());
    }
}
