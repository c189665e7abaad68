//! Document store collaborator.
//!
//! The pipeline treats the store as schemaless document storage and only
//! needs three operations: drop a collection, bulk-insert documents, and
//! (when append-mode deduplication is enabled) list the names already
//! recorded. Two implementations ship with the crate:
//!
//! | Store | Use |
//! |-------|-----|
//! | [`SqliteStore`] | Production: documents as JSON rows in a SQLite file |
//! | [`MemoryStore`] | Tests and dry runs: records every call, can inject failures |

mod memory;
mod sqlite;

pub use memory::{MemoryStore, StoreOp};
pub use sqlite::SqliteStore;

use crate::types::PhotoDocument;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store rejected {operation} on '{collection}': {reason}")]
    Rejected {
        operation: &'static str,
        collection: String,
        reason: String,
    },
}

pub trait DocumentStore {
    /// Delete every document in `collection`. Dropping a missing
    /// collection is not an error.
    fn drop_collection(&mut self, collection: &str) -> Result<(), StoreError>;

    /// Insert all `documents` in one call, returning how many were stored.
    fn bulk_insert(
        &mut self,
        collection: &str,
        documents: &[PhotoDocument],
    ) -> Result<usize, StoreError>;

    /// Names of documents already recorded in `collection`.
    fn existing_names(&mut self, collection: &str) -> Result<HashSet<String>, StoreError>;
}
