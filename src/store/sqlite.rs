use super::{DocumentStore, StoreError};
use crate::types::PhotoDocument;
use rusqlite::{Connection, params};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Document store backed by a single SQLite file.
///
/// Every document is one row holding its collection, its `name` (indexed,
/// for deduplication lookups) and the full document as JSON. Collections
/// are not declared up front; they exist as soon as a row names them.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened document store");
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// A throwaway database that lives only as long as the store.
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                collection  TEXT NOT NULL,
                name        TEXT NOT NULL,
                body        TEXT NOT NULL
            )",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection_name
             ON documents(collection, name)",
            [],
        )?;
        Ok(())
    }

    /// All documents in `collection`, in insertion order.
    pub fn documents(&self, collection: &str) -> Result<Vec<PhotoDocument>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY id")?;
        let bodies = stmt
            .query_map([collection], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    pub fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl DocumentStore for SqliteStore {
    fn drop_collection(&mut self, collection: &str) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM documents WHERE collection = ?1", [collection])?;
        debug!(collection, removed, "dropped collection");
        Ok(())
    }

    fn bulk_insert(
        &mut self,
        collection: &str,
        documents: &[PhotoDocument],
    ) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare("INSERT INTO documents (collection, name, body) VALUES (?1, ?2, ?3)")?;
            for doc in documents {
                let body = serde_json::to_string(doc)?;
                inserted += stmt.execute(params![collection, doc.name, body])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn existing_names(&mut self, collection: &str) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT name FROM documents WHERE collection = ?1")?;
        let names = stmt
            .query_map([collection], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }
}
