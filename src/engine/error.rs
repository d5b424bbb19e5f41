// Copyright © 2024 Pathway

use std::any::Any;
use std::fmt;
use std::io;
use std::result;

use serde::Serialize;

use super::config::Error as ConfigError;
use crate::connectors::data_storage::{ReadError, StoreError};

/// Phase of a run, used to tell which part of the pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    Configuration,
    Ingest,
    Reduce,
    Join,
    Upsert,
    Reconcile,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Ingest => "ingest",
            Self::Reduce => "reduce",
            Self::Join => "join",
            Self::Upsert => "upsert",
            Self::Reconcile => "reconcile",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Feed {
    Orders,
    Products,
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orders => f.write_str("orders"),
            Self::Products => f.write_str("products"),
        }
    }
}

/// The terminal error of a run. Row-level problems and failed deletion chunks
/// never end up here, they are counted in the summary instead.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("reading the {feed} feed failed: {source}")]
    Read {
        feed: Feed,
        #[source]
        source: ReadError,
    },

    #[error("failed to start a thread in the {phase} phase: {source}")]
    ThreadSpawn {
        phase: Phase,
        #[source]
        source: io::Error,
    },

    #[error("a thread panicked in the {phase} phase: {message}")]
    Panic { phase: Phase, message: String },

    #[error("worker {worker} has more than {limit} aggregates")]
    AggregateCapacityExceeded { worker: usize, limit: usize },

    #[error("{missing} of {expected} workers finished without handing their aggregates over")]
    HandoffLost { expected: usize, missing: usize },

    #[error("collection {collection} can't be initialized: {source}")]
    Initialize {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("upserting a batch of {batch_size} rows into {collection} failed: {source}")]
    Upsert {
        collection: String,
        batch_size: usize,
        #[source]
        source: StoreError,
    },

    #[error("listing the persisted ids of {collection} failed: {source}")]
    ListPersisted {
        collection: String,
        #[source]
        source: StoreError,
    },
}

impl Error {
    pub fn from_panic_payload(phase: Phase, panic_payload: Box<dyn Any + Send + 'static>) -> Self {
        let message = match panic_payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(panic_payload) => match panic_payload.downcast::<String>() {
                Ok(message) => *message,
                Err(panic_payload) => format!("{panic_payload:?}"),
            },
        };
        Self::Panic { phase, message }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::Config(_) => Phase::Configuration,
            Self::Read {
                feed: Feed::Orders,
                ..
            } => Phase::Ingest,
            Self::Read {
                feed: Feed::Products,
                ..
            } => Phase::Join,
            Self::ThreadSpawn { phase, .. } | Self::Panic { phase, .. } => *phase,
            Self::AggregateCapacityExceeded { .. } | Self::HandoffLost { .. } => Phase::Reduce,
            Self::Initialize { .. } | Self::Upsert { .. } => Phase::Upsert,
            Self::ListPersisted { .. } => Phase::Reconcile,
        }
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;
