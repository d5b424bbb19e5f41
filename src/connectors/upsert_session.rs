use std::collections::HashSet;

use log::info;

use crate::connectors::data_storage::{Collection, Row, Store, StoreError};

/// Writes batches of rows into one collection and remembers every key it has
/// written during the run.
///
/// The set of written keys only grows. It is handed over to reconciliation
/// with `into_written_ids` once all batches are written.
pub struct UpsertSink<'a, S: Store + ?Sized> {
    store: &'a mut S,
    collection: &'a Collection,
    written_ids: HashSet<String>,
    n_batches: usize,
    n_rows: usize,
}

impl<'a, S: Store + ?Sized> UpsertSink<'a, S> {
    pub fn new(store: &'a mut S, collection: &'a Collection) -> Self {
        Self {
            store,
            collection,
            written_ids: HashSet::new(),
            n_batches: 0,
            n_rows: 0,
        }
    }

    /// Writes one batch. There is no retry: a failed batch leaves the written
    /// set incomplete, so the caller has to abandon the run.
    pub fn write_batch(&mut self, batch: &[Row]) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let written = self.store.upsert(self.collection, batch)?;
        let n_written = written.len();
        self.written_ids.extend(written);
        self.n_batches += 1;
        self.n_rows += batch.len();
        Ok(n_written)
    }

    pub fn written_ids(&self) -> &HashSet<String> {
        &self.written_ids
    }

    /// Rows sent to the store, duplicates included.
    pub fn rows_written(&self) -> usize {
        self.n_rows
    }

    pub fn into_written_ids(self) -> HashSet<String> {
        info!(
            "Upserted {} rows in {} batches into {}: {} distinct ids",
            self.n_rows,
            self.n_batches,
            self.collection.name(),
            self.written_ids.len()
        );
        self.written_ids
    }
}
