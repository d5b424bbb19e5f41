// Copyright © 2024 Pathway

use std::collections::HashSet;

use log::{error, info};
use serde::Serialize;

use super::config::Config;
use super::error::{Error, Result};
use crate::connectors::data_storage::{Collection, Store};
use crate::retry::{execute_with_retries, RetryConfig};

/// A deletion chunk that failed even after retries. Its ids stay in the store
/// until a later run removes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub ids: usize,
    pub first_id: String,
    pub error: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub persisted: usize,
    pub orphaned: usize,
    pub deleted: usize,
    pub failures: Vec<ChunkFailure>,
}

impl ReconcileReport {
    pub fn failed_ids(&self) -> usize {
        self.failures.iter().map(|failure| failure.ids).sum()
    }
}

/// Deletes every persisted record the run did not write.
#[derive(Debug, Clone)]
pub struct Reconciler {
    chunk_size: usize,
    retries: usize,
    retry_config: RetryConfig,
}

impl Reconciler {
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "deletion chunk size must be positive");
        Self {
            chunk_size,
            retries: 0,
            retry_config: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retries(mut self, retries: usize, retry_config: RetryConfig) -> Self {
        self.retries = retries;
        self.retry_config = retry_config;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.delete_chunk_size())
            .with_retries(config.delete_retries(), config.retry().clone())
    }

    /// Persisted ids absent from `written`, sorted so the chunks are stable.
    pub fn orphaned_ids(persisted: HashSet<String>, written: &HashSet<String>) -> Vec<String> {
        let mut orphaned: Vec<_> = persisted
            .into_iter()
            .filter(|id| !written.contains(id))
            .collect();
        orphaned.sort_unstable();
        orphaned
    }

    /// Takes the written set by value: nothing may be added to it once
    /// reconciliation has started.
    pub fn reconcile<S: Store + ?Sized>(
        &self,
        store: &mut S,
        collection: &Collection,
        written: HashSet<String>,
    ) -> Result<ReconcileReport> {
        let persisted = store
            .select_all_ids(collection)
            .map_err(|source| Error::ListPersisted {
                collection: collection.name().to_owned(),
                source,
            })?;
        let mut report = ReconcileReport {
            persisted: persisted.len(),
            ..ReconcileReport::default()
        };
        let orphaned = Self::orphaned_ids(persisted, &written);
        drop(written);
        report.orphaned = orphaned.len();
        info!(
            "{} of {} persisted records in {} were not written by this run",
            report.orphaned,
            report.persisted,
            collection.name()
        );

        for (chunk_index, chunk) in orphaned.chunks(self.chunk_size).enumerate() {
            let result = execute_with_retries(
                "deleting orphaned records",
                || store.delete_where_id_in(collection, chunk),
                self.retry_config.clone(),
                self.retries,
            );
            match result {
                Ok(deleted) => report.deleted += deleted,
                Err(delete_error) => {
                    error!(
                        "Failed to delete chunk {chunk_index} of {} ids starting at {:?}: {delete_error}",
                        chunk.len(),
                        chunk[0]
                    );
                    report.failures.push(ChunkFailure {
                        chunk: chunk_index,
                        ids: chunk.len(),
                        first_id: chunk[0].clone(),
                        error: delete_error.to_string(),
                    });
                }
            }
        }

        info!(
            "Deleted {} records from {}, {} chunks failed",
            report.deleted,
            collection.name(),
            report.failures.len()
        );
        Ok(report)
    }
}
