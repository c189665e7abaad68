use super::{DocumentStore, StoreError};
use crate::types::PhotoDocument;
use std::collections::{BTreeMap, HashSet};

/// A store operation as observed by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Drop(String),
    Insert { collection: String, count: usize },
}

/// In-memory document store that records every call.
///
/// `fail_insert_at` makes the Nth `bulk_insert` call (1-based) fail without
/// storing anything, which is how tests exercise partial-progress aborts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: BTreeMap<String, Vec<PhotoDocument>>,
    operations: Vec<StoreOp>,
    insert_calls: usize,
    pub fail_insert_at: Option<usize>,
    pub fail_drop: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose `n`th `bulk_insert` call (1-based) fails.
    pub fn failing_insert_at(n: usize) -> Self {
        Self {
            fail_insert_at: Some(n),
            ..Self::default()
        }
    }

    /// Store whose `drop_collection` always fails.
    pub fn failing_drop() -> Self {
        Self {
            fail_drop: true,
            ..Self::default()
        }
    }

    /// Seed a collection with documents, without recording an operation.
    pub fn with_documents(collection: &str, documents: Vec<PhotoDocument>) -> Self {
        let mut store = Self::default();
        store.collections.insert(collection.to_string(), documents);
        store
    }

    pub fn documents(&self, collection: &str) -> &[PhotoDocument] {
        self.collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn operations(&self) -> &[StoreOp] {
        &self.operations
    }

    /// Sizes of each successful `bulk_insert` call, in order.
    pub fn insert_sizes(&self) -> Vec<usize> {
        self.operations
            .iter()
            .filter_map(|op| match op {
                StoreOp::Insert { count, .. } => Some(*count),
                StoreOp::Drop(_) => None,
            })
            .collect()
    }
}

impl DocumentStore for MemoryStore {
    fn drop_collection(&mut self, collection: &str) -> Result<(), StoreError> {
        if self.fail_drop {
            return Err(StoreError::Rejected {
                operation: "drop",
                collection: collection.to_string(),
                reason: "injected failure".into(),
            });
        }
        self.collections.remove(collection);
        self.operations.push(StoreOp::Drop(collection.to_string()));
        Ok(())
    }

    fn bulk_insert(
        &mut self,
        collection: &str,
        documents: &[PhotoDocument],
    ) -> Result<usize, StoreError> {
        self.insert_calls += 1;
        if self.fail_insert_at == Some(self.insert_calls) {
            return Err(StoreError::Rejected {
                operation: "insert",
                collection: collection.to_string(),
                reason: format!("injected failure on call {}", self.insert_calls),
            });
        }
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend_from_slice(documents);
        self.operations.push(StoreOp::Insert {
            collection: collection.to_string(),
            count: documents.len(),
        });
        Ok(documents.len())
    }

    fn existing_names(&mut self, collection: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .documents(collection)
            .iter()
            .map(|d| d.name.clone())
            .collect())
    }
}
