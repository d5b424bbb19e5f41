pub mod error;
pub use self::error::{Error, Feed, Phase, Result};

pub mod value;
pub use self::value::{Type, Value};

pub mod config;
pub use config::Config;

pub mod shard;
pub use shard::Shard;

pub mod partition;
pub mod reduce;
pub use reduce::Reducer;

pub mod aggregate;
pub mod batcher;
pub mod join;
pub mod reconcile;

pub mod pipeline;
pub use pipeline::{Pipeline, RunStats, Summary};
