// Copyright © 2024 Pathway

use std::env;

use assert_matches::assert_matches;

use inventory_sync_engine::engine::config::{
    Config, Error as ConfigError, DEFAULT_BATCH_SIZE, DEFAULT_DEMAND_WINDOW,
    DEFAULT_DELETE_CHUNK_SIZE,
};
use inventory_sync_engine::env::{full_name, parse_env_var, parse_env_var_or, Error as EnvError};

#[test]
fn test_default_config_is_valid() -> eyre::Result<()> {
    let config = Config::default();
    config.validate()?;
    assert!(config.workers() >= 1);
    assert_eq!(config.demand_window(), DEFAULT_DEMAND_WINDOW);
    assert_eq!(config.batch_size(), DEFAULT_BATCH_SIZE);
    assert_eq!(config.delete_chunk_size(), DEFAULT_DELETE_CHUNK_SIZE);
    assert_eq!(config.delete_retries(), 0);
    assert_eq!(config.max_keys_per_worker(), None);
    Ok(())
}

#[test]
fn test_zero_sizes_are_rejected() {
    assert_matches!(
        Config::default().with_workers(0).validate(),
        Err(ConfigError::NeedsWorkers)
    );
    assert_matches!(
        Config::default().with_batch_size(0).validate(),
        Err(ConfigError::EmptyBatch)
    );
    assert_matches!(
        Config::default().with_delete_chunk_size(0).validate(),
        Err(ConfigError::EmptyDeleteChunk)
    );
    assert_matches!(
        Config::default().with_demand_window(0).validate(),
        Err(ConfigError::EmptyDemandWindow)
    );
    assert_matches!(
        Config::default()
            .with_max_keys_per_worker(Some(0))
            .validate(),
        Err(ConfigError::EmptyAggregateLimit)
    );
}

#[test]
fn test_worker_count_is_capped() {
    assert_eq!(Config::default().with_workers(100_000).workers(), 256);
    assert_eq!(Config::default().with_workers(3).workers(), 3);
}

#[test]
fn test_parse_env_var() -> eyre::Result<()> {
    assert_eq!(full_name("TEST_ENV_UNSET"), "INVENTORY_SYNC_TEST_ENV_UNSET");
    assert_eq!(parse_env_var::<usize>("TEST_ENV_UNSET")?, None);
    assert_eq!(parse_env_var_or("TEST_ENV_UNSET", 7_usize)?, 7);

    env::set_var(full_name("TEST_ENV_NUMBER"), " 42 ");
    assert_eq!(parse_env_var::<usize>("TEST_ENV_NUMBER")?, Some(42));

    env::set_var(full_name("TEST_ENV_EMPTY"), "  ");
    assert_matches!(
        parse_env_var::<usize>("TEST_ENV_EMPTY"),
        Err(EnvError::Empty(name)) if name == "INVENTORY_SYNC_TEST_ENV_EMPTY"
    );

    env::set_var(full_name("TEST_ENV_GARBAGE"), "many");
    assert_matches!(
        parse_env_var::<usize>("TEST_ENV_GARBAGE"),
        Err(EnvError::ParsingFailed(..))
    );
    Ok(())
}

#[test]
fn test_config_from_env() -> eyre::Result<()> {
    env::set_var(full_name("THREADS"), "3");
    env::set_var(full_name("BATCH_SIZE"), "50");
    env::set_var(full_name("DELETE_RETRIES"), "2");
    env::set_var(full_name("MAX_KEYS_PER_WORKER"), "10000");
    let config = Config::from_env();
    for setting in ["THREADS", "BATCH_SIZE", "DELETE_RETRIES", "MAX_KEYS_PER_WORKER"] {
        env::remove_var(full_name(setting));
    }

    let config = config?;
    assert_eq!(config.workers(), 3);
    assert_eq!(config.batch_size(), 50);
    assert_eq!(config.delete_retries(), 2);
    assert_eq!(config.max_keys_per_worker(), Some(10_000));
    assert_eq!(config.demand_window(), DEFAULT_DEMAND_WINDOW);
    Ok(())
}
