// Copyright © 2024 Pathway

use std::env;
use std::error;
use std::str::FromStr;

/// Every setting the engine reads from the environment shares this prefix.
pub const ENV_PREFIX: &str = "INVENTORY_SYNC_";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("couldn't parse the value of {0:?} environment variable as UTF-8 string")]
    NotUtf8(String),

    #[error("environment variable {0:?} is set, but empty")]
    Empty(String),

    #[error("couldn't parse the value of {0:?} environment variable: {1}")]
    ParsingFailed(String, #[source] Box<dyn error::Error + Send + Sync>),
}

pub fn full_name(setting: &str) -> String {
    format!("{ENV_PREFIX}{setting}")
}

/// Reads `INVENTORY_SYNC_<setting>`. An unset variable is `Ok(None)`.
pub fn parse_env_var<T: FromStr>(setting: &str) -> Result<Option<T>, Error>
where
    T::Err: error::Error + Send + Sync + 'static,
{
    let name = full_name(setting);
    let Some(value) = env::var_os(&name) else {
        return Ok(None);
    };
    let value = value.into_string().map_err(|_| Error::NotUtf8(name.clone()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Empty(name));
    }
    value
        .parse()
        .map(Some)
        .map_err(|err| Error::ParsingFailed(name, Box::new(err)))
}

pub fn parse_env_var_or<T: FromStr>(setting: &str, default: T) -> Result<T, Error>
where
    T::Err: error::Error + Send + Sync + 'static,
{
    Ok(parse_env_var(setting)?.unwrap_or(default))
}
