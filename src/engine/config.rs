// Copyright © 2024 Pathway

use std::num::NonZeroUsize;
use std::thread::available_parallelism;

use log::warn;

use crate::env::{parse_env_var, parse_env_var_or, Error as EnvError};
use crate::retry::RetryConfig;

const MAX_WORKERS: usize = 256;

pub const DEFAULT_DEMAND_WINDOW: usize = 1024;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_DELETE_CHUNK_SIZE: usize = 1000;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("can't run with no workers")]
    NeedsWorkers,

    #[error("the demand window must hold at least one record")]
    EmptyDemandWindow,

    #[error("the batch size must be positive")]
    EmptyBatch,

    #[error("the deletion chunk size must be positive")]
    EmptyDeleteChunk,

    #[error("the aggregate limit per worker must be positive")]
    EmptyAggregateLimit,

    #[error(transparent)]
    EnvError(#[from] EnvError),
}

#[derive(Clone, Debug)]
pub struct Config {
    workers: usize,
    demand_window: usize,
    batch_size: usize,
    delete_chunk_size: usize,
    delete_retries: usize,
    max_keys_per_worker: Option<usize>,
    retry: RetryConfig,
}

fn default_workers() -> usize {
    available_parallelism().map_or(1, NonZeroUsize::get)
}

fn capped_workers(workers: usize) -> usize {
    if workers > MAX_WORKERS {
        warn!("{workers} is greater than the maximum allowed number of workers ({MAX_WORKERS}), reducing");
        MAX_WORKERS
    } else {
        workers
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: capped_workers(default_workers()),
            demand_window: DEFAULT_DEMAND_WINDOW,
            batch_size: DEFAULT_BATCH_SIZE,
            delete_chunk_size: DEFAULT_DELETE_CHUNK_SIZE,
            delete_retries: 0,
            max_keys_per_worker: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Capacity of every bounded queue between two stages.
    pub fn demand_window(&self) -> usize {
        self.demand_window
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn delete_chunk_size(&self) -> usize {
        self.delete_chunk_size
    }

    pub fn delete_retries(&self) -> usize {
        self.delete_retries
    }

    pub fn max_keys_per_worker(&self) -> Option<usize> {
        self.max_keys_per_worker
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = capped_workers(workers);
        self
    }

    #[must_use]
    pub fn with_demand_window(mut self, demand_window: usize) -> Self {
        self.demand_window = demand_window;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_delete_chunk_size(mut self, delete_chunk_size: usize) -> Self {
        self.delete_chunk_size = delete_chunk_size;
        self
    }

    #[must_use]
    pub fn with_delete_retries(mut self, delete_retries: usize, retry: RetryConfig) -> Self {
        self.delete_retries = delete_retries;
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_max_keys_per_worker(mut self, max_keys_per_worker: Option<usize>) -> Self {
        self.max_keys_per_worker = max_keys_per_worker;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.workers == 0 {
            return Err(Error::NeedsWorkers);
        }
        if self.demand_window == 0 {
            return Err(Error::EmptyDemandWindow);
        }
        if self.batch_size == 0 {
            return Err(Error::EmptyBatch);
        }
        if self.delete_chunk_size == 0 {
            return Err(Error::EmptyDeleteChunk);
        }
        if self.max_keys_per_worker == Some(0) {
            return Err(Error::EmptyAggregateLimit);
        }
        Ok(())
    }

    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();
        let workers: usize = parse_env_var_or("THREADS", default_workers())?;
        if workers == 0 {
            return Err(Error::NeedsWorkers);
        }
        let config = Self {
            workers: capped_workers(workers),
            demand_window: parse_env_var_or("DEMAND_WINDOW", defaults.demand_window)?,
            batch_size: parse_env_var_or("BATCH_SIZE", defaults.batch_size)?,
            delete_chunk_size: parse_env_var_or("DELETE_CHUNK_SIZE", defaults.delete_chunk_size)?,
            delete_retries: parse_env_var_or("DELETE_RETRIES", defaults.delete_retries)?,
            max_keys_per_worker: parse_env_var("MAX_KEYS_PER_WORKER")?,
            retry: defaults.retry,
        };
        config.validate()?;
        Ok(config)
    }
}
