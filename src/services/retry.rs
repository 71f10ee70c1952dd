//! Bounded retry with exponential backoff for store writes. Only transient
//! write failures are retried; the membership operations are idempotent by
//! identity match, so repeating them is safe. Each attempt also runs under
//! a timeout so a write that never resolves cannot wedge a request.

use std::{future::Future, time::Duration};

use tokio::time::timeout;
use tracing::warn;

use crate::{config::AppConfig, error::AppError};

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retry attempts after the initial one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap for the exponential growth of the delay.
    pub max_delay: Duration,
    /// Budget for a single attempt before it counts as a transient failure.
    pub attempt_timeout: Duration,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_millis(200),
        max_delay: Duration::from_secs(2),
        attempt_timeout: Duration::from_secs(5),
    };

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.write_retries,
            attempt_timeout: config.write_timeout,
            ..Self::DEFAULT
        }
    }

    /// Delay before retry `attempt` (0-indexed): doubles each time, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub async fn retry_write<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0;
    loop {
        let outcome = match timeout(config.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::TransientWrite("write attempt timed out".into())),
        };
        match outcome {
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(attempt, ?delay, "transient write failure, backing off: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
