//! CLI output formatting for ingestion runs.
//!
//! # Output Format
//!
//! ```text
//! Ingesting /data/photos → /srv/static/photos
//!     Collection: photos (drop existing)
//!     Batch size: 1000
//!     Files: 4
//! Dropped collection photos
//!     paris/20230714_001.jpg → paris_2023_1.jpg
//!     notes.txt: skipped (not an image)
//!     rome/a.jpg: failed (failed to copy ...)
//! Inserted batch of 1 (1 total)
//!
//! 4 files: 1 staged, 1 skipped, 0 deleted, 1 failed
//! Inserted 1 photos into photos.
//! ```
//!
//! Each event has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::naming::SkipReason;
use crate::pipeline::{IngestEvent, RunOutcome, SkipCause};
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Source path as shown to the user: relative to the source root when
/// possible.
fn display_source(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn skip_label(cause: SkipCause) -> &'static str {
    match cause {
        SkipCause::NotImage => "not an image",
        SkipCause::NoMetadata => "no year or city",
        SkipCause::Name(SkipReason::ClaimedThisRun) => "name already used in this run",
        SkipCause::Name(SkipReason::AlreadyRecorded) => "name already in collection",
        SkipCause::Name(SkipReason::RicherOccupant) => "existing file has more metadata",
    }
}

/// Format one progress event. `root` is the source directory, used to
/// shorten file paths.
pub fn format_event(event: &IngestEvent, root: &Path) -> Vec<String> {
    match event {
        IngestEvent::Started {
            source,
            destination,
            collection,
            batch_size,
            drop_existing,
            files,
        } => {
            let mode = if *drop_existing {
                "drop existing"
            } else {
                "append"
            };
            vec![
                format!("Ingesting {} → {}", source.display(), destination.display()),
                format!("{}Collection: {} ({})", indent(1), collection, mode),
                format!("{}Batch size: {}", indent(1), batch_size),
                format!("{}Files: {}", indent(1), files),
            ]
        }
        IngestEvent::CollectionDropped { collection } => {
            vec![format!("Dropped collection {}", collection)]
        }
        IngestEvent::Staged {
            source,
            name,
            overwrote,
        } => {
            let suffix = if *overwrote { " (replaced existing)" } else { "" };
            vec![format!(
                "{}{} → {}{}",
                indent(1),
                display_source(source, root),
                name,
                suffix
            )]
        }
        IngestEvent::Skipped { source, cause } => vec![format!(
            "{}{}: skipped ({})",
            indent(1),
            display_source(source, root),
            skip_label(*cause)
        )],
        IngestEvent::Deleted { source } => vec![format!(
            "{}{}: deleted",
            indent(1),
            display_source(source, root)
        )],
        IngestEvent::StagingFailed { source, error } => vec![format!(
            "{}{}: failed ({})",
            indent(1),
            display_source(source, root),
            error
        )],
        IngestEvent::Flushed { count, total } => {
            vec![format!("Inserted batch of {} ({} total)", count, total)]
        }
        IngestEvent::DestinationReplaced { entries } => {
            vec![format!("Replaced destination contents ({} entries)", entries)]
        }
    }
}

pub fn print_event(event: &IngestEvent, root: &Path) {
    for line in format_event(event, root) {
        println!("{}", line);
    }
}

/// Format the end-of-run summary.
///
/// An empty source tree is not an error and reports only that nothing was
/// found.
pub fn format_summary(outcome: &RunOutcome) -> Vec<String> {
    if outcome.files == 0 && outcome.is_success() {
        return vec![format!("No files found in {}", outcome.source.display())];
    }

    let mut lines = vec![String::new()];
    if outcome.files > 0 {
        lines.push(format!(
            "{} files: {} staged, {} skipped, {} deleted, {} failed",
            outcome.files,
            outcome.staged,
            outcome.skipped,
            outcome.deleted,
            outcome.staging_failures
        ));
    }
    if outcome.is_success() {
        lines.push(format!(
            "Inserted {} photos into {}.",
            outcome.inserted, outcome.collection
        ));
    } else {
        lines.push(format!(
            "Inserted {} photos into {} before the run aborted.",
            outcome.inserted, outcome.collection
        ));
    }
    lines
}

pub fn print_summary(outcome: &RunOutcome) {
    for line in format_summary(outcome) {
        println!("{}", line);
    }
}
