//! Shared test utilities for the photo-ingest test suite.
//!
//! Provides fixture builders for source trees and a [`FileSystem`] wrapper
//! that fails chosen operations, so staging and replacement error paths can
//! be exercised against a real temp directory.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_files(tmp.path(), &["paris/20230714_001.jpg", "notes.txt"]);
//!
//! let flaky = FlakyFs::failing_copies_of(&["20230714_001.jpg"]);
//! assert_eq!(dir_names(tmp.path()), vec!["notes.txt", "paris"]);
//! ```

use std::io;
use std::path::{Path, PathBuf};

use crate::fs::{FileSystem, LocalFs};
use crate::pipeline::CancelToken;

// =========================================================================
// Fixture setup
// =========================================================================

/// Create each relative path under `root` with the contents `"pixels"`.
pub fn write_files(root: &Path, files: &[&str]) {
    for rel in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, "pixels").unwrap();
    }
}

/// Sorted names of the entries directly inside `dir`.
pub fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("cannot list {}: {e}", dir.display()))
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =========================================================================
// Failure injection
// =========================================================================

/// [`LocalFs`] with copy, rename and directory-removal failures keyed on
/// the file name, and an optional token tripped after each successful
/// copy or rename.
#[derive(Debug, Default)]
pub struct FlakyFs {
    fail_copies: Vec<String>,
    fail_renames: Vec<String>,
    fail_dir_removals: Vec<String>,
    cancel_after_transfer: Option<CancelToken>,
}

impl FlakyFs {
    pub fn failing_copies_of(names: &[&str]) -> Self {
        Self {
            fail_copies: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_renames_of(names: &[&str]) -> Self {
        Self {
            fail_renames: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_dir_removals_of(names: &[&str]) -> Self {
        Self {
            fail_dir_removals: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Cancel `token` as soon as the first file has been transferred.
    pub fn cancelling_after_transfer(token: CancelToken) -> Self {
        Self {
            cancel_after_transfer: Some(token),
            ..Self::default()
        }
    }

    fn transferred(&self) {
        if let Some(token) = &self.cancel_after_transfer {
            token.cancel();
        }
    }

    fn injected(list: &[String], from: &Path) -> io::Result<()> {
        let name = from.file_name().map(|n| n.to_string_lossy().into_owned());
        match name {
            Some(name) if list.contains(&name) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected failure for {name}"),
            )),
            _ => Ok(()),
        }
    }
}

impl FileSystem for FlakyFs {
    fn exists(&self, path: &Path) -> bool {
        LocalFs.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        LocalFs.is_dir(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        LocalFs.canonicalize(path)
    }

    fn list_dir_sorted(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        LocalFs.list_dir_sorted(dir)
    }

    fn walk_files_sorted(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        LocalFs.walk_files_sorted(root)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        Self::injected(&self.fail_copies, from)?;
        LocalFs.copy_file(from, to)?;
        self.transferred();
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        Self::injected(&self.fail_renames, from)?;
        LocalFs.rename(from, to)?;
        self.transferred();
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        LocalFs.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        Self::injected(&self.fail_dir_removals, path)?;
        LocalFs.remove_dir_all(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        LocalFs.create_dir_all(path)
    }
}
