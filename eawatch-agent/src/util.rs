//! Shared helpers: HTTP retry with backoff, error classification, measure-URL
//! parsing

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use eawatch_common::{Error, Result};

/// Retry policy for upstream HTTP calls.
///
/// Transient failures (timeouts, connection errors, 5xx) are retried with
/// exponential backoff plus jitter; terminal failures (4xx, malformed
/// payloads) short-circuit immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
        }
    }

    /// Delay before the retry following attempt number `attempt` (0-based):
    /// `base * 2^attempt` capped at `max_delay`, plus up to 25% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_cap = (exp.as_millis() as u64 / 4).max(1);
        let jitter = rand::thread_rng().gen_range(0..jitter_cap);
        exp + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, fails terminally, or exhausts the attempt
/// budget. Only transient errors are retried.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff_delay(attempt);
                tracing::warn!(
                    what = %what,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Map a reqwest transport error into the transient/terminal split.
pub fn classify_reqwest(err: reqwest::Error, what: &str) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::TransientUpstream {
            status: None,
            message: format!("{what}: {err}"),
        }
    } else {
        Error::TerminalUpstream {
            status: err.status().map(|s| s.as_u16()),
            message: format!("{what}: {err}"),
        }
    }
}

/// Extract the station id from a measure URL.
///
/// Upstream responses embed the station id inside the measure URL; the final
/// path segment's leading hyphen-delimited component is the station id, e.g.
/// `.../measures/531160-level-stage-i-15_min-mASD` → `531160`. The rule is
/// identical across the flood and hydrology APIs.
pub fn extract_station_id(measure_url: &str) -> Option<String> {
    let last_segment = measure_url.rsplit('/').next()?;
    let id = last_segment.split('-').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
