//! Staging: turning a source file into a destination file plus a document.
//!
//! Staging always happens *before* a document is buffered for the store, so
//! a failed copy can never leave a database record pointing at a missing
//! file. The reverse (file staged, store write failed) is possible and
//! accepted; a failed run is repaired by re-running it.
//!
//! ## Destination replacement
//!
//! When the destination should end up containing only this run's photos,
//! files are staged into a protected subdirectory first:
//!
//! ```text
//! dest/
//! ├── old_photo.jpg               ← cleared
//! └── .photo-ingest-staging/
//!     ├── paris_2023_1.jpg        ← moved into dest/
//!     └── 2019_2.png
//! ```
//!
//! [`replace_directory_atomically`] then swaps the contents in three steps:
//! park the old entries in a backup subdirectory, move the staged entries
//! up, delete the backup. A failure while parking or moving restores what
//! was parked, so the destination is never left half-cleared by an error.
//! It is not a filesystem transaction: a crash mid-swap can still leave a
//! mixed directory.

use crate::classify::is_image;
use crate::fs::FileSystem;
use crate::metadata::{CityDepth, YearPolicy, extract_city, extract_year};
use crate::types::PhotoDocument;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Subdirectory of the destination that receives staged files when the
/// destination is being replaced.
pub const STAGING_DIR: &str = ".photo-ingest-staging";

/// Subdirectory of the destination that holds the previous contents during
/// a replacement.
const BACKUP_DIR: &str = ".photo-ingest-backup";

#[derive(Error, Debug)]
pub enum StageError {
    #[error("failed to {action} {} to {}: {source}", .from.display(), .to.display())]
    Transfer {
        action: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to list {}: {source}", .path.display())]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// How bytes get from the source tree to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageMode {
    /// Leave the source untouched.
    #[default]
    Copy,
    /// Remove the source once it is in place.
    Move,
}

/// Rules for turning a file into a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentPolicy {
    pub years: YearPolicy,
    pub city_depth: CityDepth,
    /// Reject documents with neither a year nor a city.
    pub require_metadata: bool,
}

impl Default for DocumentPolicy {
    fn default() -> Self {
        Self {
            years: YearPolicy::default(),
            city_depth: CityDepth::default(),
            require_metadata: true,
        }
    }
}

/// Why a file produced no document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotImage,
    NoMetadata,
}

/// Classify a file and extract its metadata.
///
/// The returned document's `name` is the source filename; the namer
/// decides the final destination name.
pub fn build_document(
    path: &Path,
    source_root: &Path,
    policy: &DocumentPolicy,
) -> Result<PhotoDocument, Rejection> {
    if !is_image(path) {
        return Err(Rejection::NotImage);
    }
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let year = extract_year(&filename, &policy.years);
    let city = extract_city(source_root, path, policy.city_depth);
    let doc = PhotoDocument::new(filename, year, city);

    if policy.require_metadata && !doc.has_metadata() {
        return Err(Rejection::NoMetadata);
    }
    Ok(doc)
}

/// Metadata richness of a file already sitting at `dir/name`, if any.
///
/// Only the filename is available for a pre-existing file, so its richness
/// is 1 when the name carries a date token and 0 otherwise.
pub fn occupant_richness(
    fs: &impl FileSystem,
    dir: &Path,
    name: &str,
    years: &YearPolicy,
) -> Option<u8> {
    fs.exists(&dir.join(name))
        .then(|| u8::from(extract_year(name, years).is_some()))
}

/// Place `source` at `destination_dir/document.name`.
pub fn stage(
    fs: &impl FileSystem,
    source: &Path,
    document: &PhotoDocument,
    destination_dir: &Path,
    mode: StageMode,
) -> Result<PathBuf, StageError> {
    let target = destination_dir.join(&document.name);
    let (action, result) = match mode {
        StageMode::Copy => ("copy", fs.copy_file(source, &target)),
        StageMode::Move => ("move", fs.move_file(source, &target)),
    };
    result.map_err(|source_err| StageError::Transfer {
        action,
        from: source.to_path_buf(),
        to: target.clone(),
        source: source_err,
    })?;
    debug!(from = %source.display(), to = %target.display(), action, "staged");
    Ok(target)
}

/// Delete a rejected source file.
pub fn discard(fs: &impl FileSystem, path: &Path) -> Result<(), StageError> {
    fs.remove_file(path).map_err(|source| StageError::Remove {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the contents of `destination_dir` with the entries staged in
/// `staging_dir` (which must be a direct child of `destination_dir`).
///
/// Returns the number of entries moved into place. On error the staging
/// directory is removed and previously parked entries are restored.
pub fn replace_directory_atomically(
    fs: &impl FileSystem,
    destination_dir: &Path,
    staging_dir: &Path,
) -> Result<usize, StageError> {
    let result = swap_contents(fs, destination_dir, staging_dir);
    if result.is_err() && fs.exists(staging_dir) {
        if let Err(e) = fs.remove_dir_all(staging_dir) {
            warn!(path = %staging_dir.display(), error = %e, "could not remove staging directory");
        }
    }
    result
}

fn swap_contents(
    fs: &impl FileSystem,
    destination_dir: &Path,
    staging_dir: &Path,
) -> Result<usize, StageError> {
    let backup_dir = destination_dir.join(BACKUP_DIR);
    let list = |dir: &Path| {
        fs.list_dir_sorted(dir).map_err(|source| StageError::List {
            path: dir.to_path_buf(),
            source,
        })
    };

    let existing: Vec<PathBuf> = list(destination_dir)?
        .into_iter()
        .filter(|p| p != staging_dir && *p != backup_dir)
        .collect();
    let staged = list(staging_dir)?;

    fs.create_dir_all(&backup_dir)
        .map_err(|source| StageError::Transfer {
            action: "create",
            from: destination_dir.to_path_buf(),
            to: backup_dir.clone(),
            source,
        })?;

    // Park the old entries.
    let mut parked = Vec::with_capacity(existing.len());
    for entry in &existing {
        let target = backup_dir.join(entry_name(entry));
        if let Err(source) = fs.rename(entry, &target) {
            restore(fs, &parked);
            let _ = fs.remove_dir_all(&backup_dir);
            return Err(StageError::Transfer {
                action: "park",
                from: entry.clone(),
                to: target,
                source,
            });
        }
        parked.push((target, entry.clone()));
    }

    // Move the staged entries up.
    let mut placed = Vec::with_capacity(staged.len());
    for entry in &staged {
        let target = destination_dir.join(entry_name(entry));
        if let Err(source) = fs.rename(entry, &target) {
            restore(fs, &placed);
            restore(fs, &parked);
            let _ = fs.remove_dir_all(&backup_dir);
            return Err(StageError::Transfer {
                action: "move",
                from: entry.clone(),
                to: target,
                source,
            });
        }
        placed.push((target, entry.clone()));
    }

    // The swap is complete; leftovers are only logged.
    if let Err(e) = fs.remove_dir_all(&backup_dir) {
        warn!(path = %backup_dir.display(), error = %e, "could not remove backup directory");
    }
    if let Err(e) = fs.remove_dir_all(staging_dir) {
        warn!(path = %staging_dir.display(), error = %e, "could not remove staging directory");
    }
    Ok(placed.len())
}

/// Undo renames, most recent first. Best effort.
fn restore(fs: &impl FileSystem, moves: &[(PathBuf, PathBuf)]) {
    for (now, was) in moves.iter().rev() {
        if let Err(e) = fs.rename(now, was) {
            warn!(from = %now.display(), to = %was.display(), error = %e, "rollback rename failed");
        }
    }
}

fn entry_name(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}
