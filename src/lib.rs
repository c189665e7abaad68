//! # Photo Ingest
//!
//! Synchronizes a directory tree of photographs into two places at once: a
//! flat destination directory of image files, and a collection of documents
//! `{name, year, city}` describing them. The filesystem is the data source:
//! top-level folders become cities and `YYYYMMDD` tokens in filenames become
//! years.
//!
//! # Architecture: One Ordered Pass
//!
//! ```text
//! source tree ──walk (sorted)──▶ classify ──▶ extract ──▶ name ──▶ stage ──▶ batch ──▶ store
//!                                   │                        │        │
//!                                   └─ skip / delete         └─ skip  └─ report, continue
//! ```
//!
//! Every step runs in traversal order on a single thread. Staging happens
//! before a document is buffered, so a document is only ever written for a
//! file that reached the destination.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Orchestrates a run: directory checks, traversal, staging, batching, cancellation |
//! | [`classify`] | Image detection by file extension |
//! | [`metadata`] | Year extraction from filenames, city extraction from paths, year decoys |
//! | [`naming`] | Collision-free destination names (preserve or rewrite strategy) |
//! | [`stage`] | Copy/move into the destination, rejected-file deletion, destination replacement |
//! | [`writer`] | Fixed-size batching of documents into bulk inserts |
//! | [`store`] | Document store trait with SQLite and in-memory implementations |
//! | [`fs`] | Filesystem trait so failure paths can be tested |
//! | [`config`] | TOML config loading, merging, validation, stock config |
//! | [`output`] | CLI output formatting of run events and the summary |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`types`] | The `PhotoDocument` record |
//!
//! # Design Decisions
//!
//! ## Deterministic Order
//!
//! Siblings are sorted by name at every level before descending. Rewritten
//! names carry a run-scoped counter, so the same tree always yields the same
//! names, the same documents and the same batch boundaries.
//!
//! ## Explicit Drop-or-Append
//!
//! Dropping a collection is destructive, so there is no default: the choice
//! must come from the config file or from `--drop` / `--append`. A run that
//! finds no files never drops anything.
//!
//! ## Partial Progress Is Kept
//!
//! Batches that reached the store stay there when a later batch fails. The
//! run reports how many documents were inserted before it aborted; re-running
//! in drop mode repairs the collection.

pub mod classify;
pub mod config;
pub mod fs;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod stage;
pub mod store;
pub mod types;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_helpers;
