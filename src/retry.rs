use std::time::Duration;

use log::warn;
use rand::Rng;

const DEFAULT_SLEEP_INITIAL_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_SLEEP_BACKOFF_FACTOR: f64 = 1.2;
const DEFAULT_JITTER: Duration = Duration::from_millis(800);

#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug)]
pub struct RetryConfig {
    sleep_duration: Duration,
    backoff_factor: f64,
    jitter: Duration,
}

impl RetryConfig {
    pub fn new(sleep_duration: Duration, backoff_factor: f64, jitter: Duration) -> Self {
        Self {
            sleep_duration,
            backoff_factor,
            jitter,
        }
    }

    /// No sleeping between attempts at all.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0, Duration::ZERO)
    }

    pub fn sleep_after_error(&mut self) {
        if !self.sleep_duration.is_zero() {
            std::thread::sleep(self.sleep_duration);
        }
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::rng().random_range(Duration::ZERO..self.jitter)
        };
        self.sleep_duration = self.sleep_duration.mul_f64(self.backoff_factor) + jitter;
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_SLEEP_INITIAL_DURATION,
            DEFAULT_SLEEP_BACKOFF_FACTOR,
            DEFAULT_JITTER,
        )
    }
}

/// Runs `func` once and then up to `max_retries` more times while it fails.
/// `operation` only names the action in the log.
pub fn execute_with_retries<T, E: std::fmt::Display>(
    operation: &str,
    mut func: impl FnMut() -> Result<T, E>,
    mut retry_config: RetryConfig,
    max_retries: usize,
) -> Result<T, E> {
    let mut exec_result = func();
    for attempt_idx in 0..max_retries {
        match &exec_result {
            Ok(_) => return exec_result,
            Err(error) => {
                warn!("Attempt {attempt_idx}: retrying {operation} after an error: {error}");
            }
        }
        retry_config.sleep_after_error();
        exec_result = func();
    }

    exec_result
}
