//! Polling helper for provider wait primitives
//!
//! Backs every `await_ready` / `await_deleted` gateway call: repeat an async
//! check with exponential backoff until it reports done or the overall
//! timeout elapses.

use anyhow::{Context, Result};
use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Backoff and timeout for one polled condition.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(15),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Poll `check` until it returns `Ok(true)`, sleeping with exponential
/// backoff between attempts. Errors from the check propagate immediately;
/// exceeding the timeout is an error naming the condition.
pub async fn poll_until<F, Fut>(config: PollConfig, what: &str, check: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut delays = ExponentialBuilder::default()
        .with_min_delay(config.initial_delay)
        .with_max_delay(config.max_delay)
        .with_jitter()
        .build();

    let deadline = tokio::time::Instant::now() + config.timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if check().await.with_context(|| format!("checking {what}"))? {
            debug!(condition = %what, attempt, "condition met");
            return Ok(());
        }

        let delay = delays.next().unwrap_or(config.max_delay);
        debug!(
            condition = %what,
            attempt,
            delay_ms = delay.as_millis(),
            "not yet, backing off"
        );

        if tokio::time::Instant::now() + delay > deadline {
            anyhow::bail!(
                "timed out after {:?} waiting for {what} ({attempt} attempts)",
                config.timeout
            );
        }
        tokio::time::sleep(delay).await;
    }
}
