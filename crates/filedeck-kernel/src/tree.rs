//! Blocking filesystem primitives shared by paste jobs and the archiver.
//!
//! Everything here uses `std::fs` and is meant to run on the blocking pool
//! (`tokio::task::spawn_blocking`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What a traversal is visiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    File,
    Folder,
}

/// First free file path in `dir`: `name.ext`, `name(1).ext`, `name(2).ext`, …
pub fn unique_file_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !exists(&candidate) {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1u64..)
        .map(|index| dir.join(format!("{stem}({index}){ext}")))
        .find(|p| !exists(p))
        .unwrap_or(candidate)
}

/// First free folder path in `parent`: `name`, `name(1)`, `name(2)`, …
pub fn unique_dir_path(parent: &Path, name: &str) -> PathBuf {
    let candidate = parent.join(name);
    if !exists(&candidate) {
        return candidate;
    }
    (1u64..)
        .map(|index| parent.join(format!("{name}({index})")))
        .find(|p| !exists(p))
        .unwrap_or(candidate)
}

// Broken symlinks count as taken.
fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Recursively copy `src` into `dest`.
///
/// Files of a folder are copied before its sub-folders, depth-first.
/// `visit` is called for every folder and file before it is copied. Existing
/// files in `dest` are overwritten.
pub fn copy_tree(src: &Path, dest: &Path, visit: &mut dyn FnMut(&Path, Visit)) -> io::Result<()> {
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source directory not found: {}", src.display()),
        ));
    }
    visit(src, Visit::Folder);

    let (mut dirs, mut files) = walk_children(src)?;
    files.sort();
    dirs.sort();

    fs::create_dir_all(dest)?;

    for file in files {
        visit(&file, Visit::File);
        if let Some(name) = file.file_name() {
            fs::copy(&file, dest.join(name))?;
        }
    }

    for dir in dirs {
        if let Some(name) = dir.file_name() {
            copy_tree(&dir, &dest.join(name), visit)?;
        }
    }
    Ok(())
}

/// Rename a file, falling back to copy + remove across filesystems.
pub fn move_file(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(src, dest)?;
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

/// Remove a file or a folder with its contents.
pub fn remove(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Number of direct children of a folder.
pub fn count_children(dir: &Path) -> io::Result<u64> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        entry?;
        count += 1;
    }
    Ok(count)
}

/// Direct sub-folders and files of `dir`.
pub fn read_children(dir: &Path) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // Follow symlinks so a linked folder lists as a folder.
        let is_dir = fs::metadata(entry.path())
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if is_dir {
            dirs.push(entry.path());
        } else {
            files.push(entry.path());
        }
    }
    Ok((dirs, files))
}

/// Direct sub-folders and files of `dir` for a recursive walk.
///
/// Unlike [`read_children`], linked folders are skipped so a link cycle
/// cannot make a walk loop. Links to files are kept as files.
pub fn walk_children(dir: &Path) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            dirs.push(entry.path());
        } else if file_type.is_symlink() {
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => files.push(entry.path()),
                _ => tracing::debug!(path = %entry.path().display(), "skipping link"),
            }
        } else {
            files.push(entry.path());
        }
    }
    Ok((dirs, files))
}

/// True when a folder has at least one sub-folder.
pub fn has_subfolders(dir: &Path) -> bool {
    read_children(dir)
        .map(|(dirs, _)| !dirs.is_empty())
        .unwrap_or(false)
}
