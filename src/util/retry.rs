//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::VoxError;

/// Retry policy configuration.
///
/// With the defaults a failing call is attempted four times in total, sleeping
/// 1s, 2s and 4s between attempts before the last error is surfaced.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Spread each sleep over 75%–125% of the nominal backoff.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Nominal backoff before retry number `retry` (0-based), capped at `max_backoff`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry as i32);
        let secs = (self.initial_backoff.as_secs_f64() * factor).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// The full sequence of nominal sleeps this policy performs when every attempt fails.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| self.backoff_for(retry))
            .collect()
    }

    /// Execute an async operation with retry.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, VoxError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VoxError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() || attempt + 1 >= self.max_attempts {
                        return Err(e);
                    }

                    let sleep_duration = self.sleep_for(attempt, &e);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        backoff_ms = sleep_duration.as_millis() as u64,
                        error = %e,
                        "Retrying after error"
                    );
                    tokio::time::sleep(sleep_duration).await;

                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(VoxError::Timeout(0)))
    }

    fn sleep_for(&self, retry: u32, error: &VoxError) -> Duration {
        let mut backoff = self.backoff_for(retry);

        // A server hint may stretch the sleep, but never past the cap.
        if let VoxError::RateLimited {
            retry_after_ms: Some(hint),
        } = error
        {
            let hinted = Duration::from_millis(*hint).min(self.max_backoff);
            backoff = backoff.max(hinted);
        }

        if self.jitter {
            let jitter_factor = 0.75 + (rand_factor() * 0.5);
            backoff = Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);
        }
        backoff
    }
}

/// Simple pseudo-random factor [0, 1) without pulling in rand crate.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}
