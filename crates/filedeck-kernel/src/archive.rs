//! Zip archives of virtual paths.
//!
//! Each item becomes a sibling at the archive root: a file under its own
//! name, a folder as `name/…` with its whole subtree. Siblings that share a
//! name are numbered like pasted files: `a.txt`, `a(1).txt`. Blocking; run
//! it on the blocking pool.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{DeckError, DeckResult};
use crate::tree;
use crate::vpath::{RootTable, VirtualPath};

/// Build a deflate zip of `items` in memory. Any failure aborts the archive.
pub fn archive(roots: &RootTable, items: &[VirtualPath]) -> DeckResult<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut taken = HashSet::new();

    for item in items {
        if item.is_root() {
            return Err(DeckError::bad_request("cannot archive the root folder"));
        }
        if item.is_folder() {
            let dir = item.to_physical_directory(roots)?;
            let name = unique_entry_name(&mut taken, item.name(), true);
            add_folder(&mut writer, options, &dir, &format!("{name}/"))?;
        } else {
            let file = item.to_physical_file(roots)?;
            let name = unique_entry_name(&mut taken, item.name(), false);
            add_file(&mut writer, options, &file, &name)?;
        }
    }

    let cursor = writer.finish()?;
    let data = cursor.into_inner();
    tracing::debug!(items = items.len(), bytes = data.len(), "archive built");
    Ok(data)
}

/// First name not yet used at the archive root.
fn unique_entry_name(taken: &mut HashSet<String>, name: &str, folder: bool) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if !folder && dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    (1u64..)
        .map(|index| format!("{stem}({index}){ext}"))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or_else(|| name.to_string())
}

fn add_file<W: Write + io::Seek>(
    writer: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    file: &Path,
    entry_name: &str,
) -> DeckResult<()> {
    let mut source = fs::File::open(file)?;
    writer.start_file(entry_name, options)?;
    io::copy(&mut source, writer)?;
    Ok(())
}

// Files first, then sub-folders, matching the copy order.
fn add_folder<W: Write + io::Seek>(
    writer: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    dir: &Path,
    entry_prefix: &str,
) -> DeckResult<()> {
    let (mut dirs, mut files) = tree::walk_children(dir)?;
    files.sort();
    dirs.sort();

    if dirs.is_empty() && files.is_empty() {
        writer.add_directory(entry_prefix, options)?;
        return Ok(());
    }

    for file in &files {
        let name = file_name(file);
        add_file(writer, options, file, &format!("{entry_prefix}{name}"))?;
    }
    for sub in &dirs {
        let name = file_name(sub);
        add_folder(writer, options, sub, &format!("{entry_prefix}{name}/"))?;
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vpath::CaseMode;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn setup() -> (TempDir, RootTable) {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(docs.join("photos/2024")).unwrap();
        fs::create_dir_all(docs.join("empty")).unwrap();
        fs::write(docs.join("readme.txt"), "hello").unwrap();
        fs::write(docs.join("photos/cover.jpg"), "jpg").unwrap();
        fs::write(docs.join("photos/2024/jan.jpg"), "jan").unwrap();
        let roots =
            RootTable::new(vec![("/docs/".to_string(), docs)], CaseMode::Insensitive).unwrap();
        (tmp, roots)
    }

    fn entry_names(data: Vec<u8>) -> Vec<String> {
        let zip = ZipArchive::new(Cursor::new(data)).unwrap();
        zip.file_names().map(String::from).collect::<Vec<_>>()
    }

    #[test]
    fn test_archive_file_and_folder() {
        let (_tmp, roots) = setup();
        let items = vec![
            VirtualPath::new("/docs/readme.txt", CaseMode::Insensitive),
            VirtualPath::new("/docs/photos/", CaseMode::Insensitive),
        ];
        let data = archive(&roots, &items).unwrap();
        let mut names = entry_names(data.clone());
        names.sort();
        assert_eq!(
            names,
            vec!["photos/2024/jan.jpg", "photos/cover.jpg", "readme.txt"]
        );

        let mut zip = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut content = String::new();
        zip.by_name("photos/2024/jan.jpg")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "jan");
    }

    #[test]
    fn test_empty_folder_kept() {
        let (_tmp, roots) = setup();
        let items = vec![VirtualPath::new("/docs/empty/", CaseMode::Insensitive)];
        assert_eq!(entry_names(archive(&roots, &items).unwrap()), vec!["empty/"]);
    }

    #[test]
    fn test_same_named_siblings_are_numbered() {
        let (tmp, roots) = setup();
        let docs = tmp.path().join("docs");
        fs::write(docs.join("photos/readme.txt"), "other").unwrap();
        fs::create_dir_all(docs.join("empty/photos")).unwrap();
        fs::write(docs.join("empty/photos/x.txt"), "x").unwrap();

        let items = vec![
            VirtualPath::new("/docs/readme.txt", CaseMode::Insensitive),
            VirtualPath::new("/docs/photos/readme.txt", CaseMode::Insensitive),
            VirtualPath::new("/docs/photos/", CaseMode::Insensitive),
            VirtualPath::new("/docs/empty/photos/", CaseMode::Insensitive),
        ];
        let data = archive(&roots, &items).unwrap();
        let mut names = entry_names(data.clone());
        names.sort();
        assert_eq!(
            names,
            vec![
                "photos(1)/x.txt",
                "photos/2024/jan.jpg",
                "photos/cover.jpg",
                "photos/readme.txt",
                "readme(1).txt",
                "readme.txt",
            ]
        );

        let mut zip = ZipArchive::new(Cursor::new(data)).unwrap();
        let mut content = String::new();
        zip.by_name("readme(1).txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "other");
    }

    #[test]
    fn test_unique_entry_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_entry_name(&mut taken, "a.tar.gz", false), "a.tar.gz");
        assert_eq!(unique_entry_name(&mut taken, "a.tar.gz", false), "a.tar(1).gz");
        assert_eq!(unique_entry_name(&mut taken, ".env", false), ".env");
        assert_eq!(unique_entry_name(&mut taken, ".env", false), ".env(1)");
        assert_eq!(unique_entry_name(&mut taken, "v1.2", true), "v1.2");
        assert_eq!(unique_entry_name(&mut taken, "v1.2", true), "v1.2(1)");
    }

    #[cfg(unix)]
    #[test]
    fn test_linked_folder_loop_is_skipped() {
        let (tmp, roots) = setup();
        let photos = tmp.path().join("docs/photos");
        std::os::unix::fs::symlink(&photos, photos.join("2024/back")).unwrap();

        let items = vec![VirtualPath::new("/docs/photos/", CaseMode::Insensitive)];
        let mut names = entry_names(archive(&roots, &items).unwrap());
        names.sort();
        assert_eq!(names, vec!["photos/2024/jan.jpg", "photos/cover.jpg"]);
    }

    #[test]
    fn test_missing_item_aborts() {
        let (_tmp, roots) = setup();
        let items = vec![
            VirtualPath::new("/docs/readme.txt", CaseMode::Insensitive),
            VirtualPath::new("/docs/nope.txt", CaseMode::Insensitive),
        ];
        assert!(archive(&roots, &items).is_err());
    }
}
