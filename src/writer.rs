//! Batched writes to the document store.
//!
//! Documents are buffered in memory and written with one `bulk_insert` call
//! per batch. A batch is flushed as soon as it reaches `batch_size`, and the
//! orchestrator flushes the final partial batch at the end of traversal.
//!
//! Batches are committed independently. If the third flush fails, the
//! first two stay in the store; the writer never rolls back.

use crate::store::{DocumentStore, StoreError};
use crate::types::PhotoDocument;
use std::num::NonZeroUsize;
use tracing::{debug, info};

/// Default number of documents per `bulk_insert` call.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug)]
pub struct BatchWriter {
    collection: String,
    batch_size: NonZeroUsize,
    buffer: Vec<PhotoDocument>,
    inserted: usize,
    flushes: usize,
}

impl BatchWriter {
    pub fn new(collection: impl Into<String>, batch_size: NonZeroUsize) -> Self {
        Self {
            collection: collection.into(),
            batch_size,
            buffer: Vec::with_capacity(batch_size.get().min(DEFAULT_BATCH_SIZE)),
            inserted: 0,
            flushes: 0,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    /// Total documents the store reported as inserted so far.
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Documents buffered but not yet flushed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Number of `bulk_insert` calls made.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Empty the target collection. Must run before the first flush.
    pub fn drop_existing(
        &mut self,
        store: &mut (impl DocumentStore + ?Sized),
    ) -> Result<(), StoreError> {
        debug_assert_eq!(self.flushes, 0, "drop after inserts would discard this run");
        store.drop_collection(&self.collection)?;
        info!(collection = %self.collection, "dropped existing documents");
        Ok(())
    }

    /// Buffer a document, flushing if the batch is now full.
    ///
    /// Returns the number of documents written by the triggered flush, or 0.
    pub fn append(
        &mut self,
        document: PhotoDocument,
        store: &mut (impl DocumentStore + ?Sized),
    ) -> Result<usize, StoreError> {
        self.buffer.push(document);
        if self.buffer.len() >= self.batch_size.get() {
            self.flush(store)
        } else {
            Ok(0)
        }
    }

    /// Buffer a document without flushing, even past `batch_size`.
    ///
    /// Used when nothing may reach the store until a later step succeeds;
    /// [`flush`](Self::flush) then writes the backlog in `batch_size` chunks.
    pub fn hold(&mut self, document: PhotoDocument) {
        self.buffer.push(document);
    }

    /// Write all buffered documents, at most `batch_size` per call.
    ///
    /// A no-op on an empty buffer. On failure the unwritten documents stay
    /// buffered; chunks written before the failure stay committed.
    pub fn flush(&mut self, store: &mut (impl DocumentStore + ?Sized)) -> Result<usize, StoreError> {
        let mut written = 0;
        while !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.batch_size.get());
            let count = store.bulk_insert(&self.collection, &self.buffer[..take])?;
            self.buffer.drain(..take);
            self.flushes += 1;
            self.inserted += count;
            written += count;
            debug!(
                collection = %self.collection,
                count,
                total = self.inserted,
                "flushed batch"
            );
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};

    fn doc(n: usize) -> PhotoDocument {
        PhotoDocument::new(format!("{n}.jpg"), Some(2000), None)
    }

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn flushes_automatically_when_full() {
        let mut store = MemoryStore::new();
        let mut writer = BatchWriter::new("photos", size(2));

        assert_eq!(writer.append(doc(1), &mut store).unwrap(), 0);
        assert_eq!(writer.append(doc(2), &mut store).unwrap(), 2);
        assert_eq!(writer.pending(), 0);
        assert_eq!(store.insert_sizes(), vec![2]);
    }

    #[test]
    fn final_flush_writes_partial_batch() {
        let mut store = MemoryStore::new();
        let mut writer = BatchWriter::new("photos", size(3));
        for n in 0..5 {
            writer.append(doc(n), &mut store).unwrap();
        }
        writer.flush(&mut store).unwrap();
        assert_eq!(store.insert_sizes(), vec![3, 2]);
        assert_eq!(writer.inserted(), 5);
        assert_eq!(writer.flushes(), 2);
    }

    #[test]
    fn flush_on_empty_buffer_makes_no_call() {
        let mut store = MemoryStore::new();
        let mut writer = BatchWriter::new("photos", size(10));
        assert_eq!(writer.flush(&mut store).unwrap(), 0);
        assert!(store.operations().is_empty());
    }

    #[test]
    fn inserted_total_matches_buffered_for_any_batch_size() {
        for batch in 1..=7 {
            let mut store = MemoryStore::new();
            let mut writer = BatchWriter::new("photos", size(batch));
            for n in 0..23 {
                writer.append(doc(n), &mut store).unwrap();
            }
            writer.flush(&mut store).unwrap();
            assert_eq!(writer.inserted(), 23, "batch size {batch}");
            assert_eq!(store.insert_sizes().iter().sum::<usize>(), 23);
            assert!(store.insert_sizes().iter().all(|&s| s <= batch));
        }
    }

    #[test]
    fn drop_existing_precedes_inserts() {
        let mut store = MemoryStore::with_documents("photos", vec![doc(99)]);
        let mut writer = BatchWriter::new("photos", size(1));
        writer.drop_existing(&mut store).unwrap();
        writer.append(doc(1), &mut store).unwrap();
        assert_eq!(store.operations()[0], StoreOp::Drop("photos".into()));
        assert_eq!(store.documents("photos"), &[doc(1)]);
    }

    #[test]
    fn failed_flush_keeps_earlier_batches() {
        let mut store = MemoryStore::failing_insert_at(2);
        let mut writer = BatchWriter::new("photos", size(1));
        writer.append(doc(1), &mut store).unwrap();
        assert!(writer.append(doc(2), &mut store).is_err());
        assert_eq!(writer.inserted(), 1);
        assert_eq!(writer.pending(), 1);
        assert_eq!(store.documents("photos").len(), 1);
    }

    #[test]
    fn held_documents_flush_in_batch_sized_chunks() {
        let mut store = MemoryStore::new();
        let mut writer = BatchWriter::new("photos", size(2));
        for n in 0..5 {
            writer.hold(doc(n));
        }
        assert!(store.operations().is_empty());
        assert_eq!(writer.pending(), 5);

        assert_eq!(writer.flush(&mut store).unwrap(), 5);
        assert_eq!(store.insert_sizes(), vec![2, 2, 1]);
        assert_eq!(writer.flushes(), 3);
    }

    #[test]
    fn failed_chunk_keeps_unwritten_documents() {
        let mut store = MemoryStore::failing_insert_at(2);
        let mut writer = BatchWriter::new("photos", size(2));
        for n in 0..5 {
            writer.hold(doc(n));
        }
        assert!(writer.flush(&mut store).is_err());
        assert_eq!(writer.inserted(), 2);
        assert_eq!(writer.pending(), 3);
    }
}
