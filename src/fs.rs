//! Filesystem collaborator.
//!
//! The [`FileSystem`] trait lists every filesystem operation the pipeline
//! performs, so staging and traversal can be exercised against a wrapper
//! that injects failures. The production implementation is [`LocalFs`].
//!
//! All operations are call-scoped: no handle outlives the call that opened
//! it, on success or on error.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub trait FileSystem {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Absolute path with symlinks and `..` resolved. The path must exist.
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Immediate children of `dir`, sorted by file name.
    fn list_dir_sorted(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Every regular file below `root`, depth-first, with siblings sorted
    /// by file name at each level before descending.
    fn walk_files_sorted(&self, root: &Path) -> io::Result<Vec<PathBuf>>;

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Move a file, falling back to copy-then-remove when `from` and `to`
    /// are on different filesystems.
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match self.rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                self.copy_file(from, to)?;
                self.remove_file(from)
            }
            Err(e) => Err(e),
        }
    }
}

/// The real filesystem, via `std::fs` and `walkdir`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn list_dir_sorted(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = std::fs::read_dir(dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }

    fn walk_files_sorted(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::copy(from, to).map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}
