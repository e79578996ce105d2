//! Backoff for query fetches that fail in transport.
//!
//! Only [`DeskError::Transport`] is ever retried; a 401 already got its one
//! refresh-and-retry inside the pipeline. Mutations are never replayed.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{DeskError, Result, TransportFailure};

/// How a transport failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Sending the read again soon may succeed.
    Standard,
    /// The backend reported itself unavailable; wait twice as long.
    Extended,
    /// The backend cannot serve this request; sending it again will not help.
    Never,
}

impl Backoff {
    pub fn for_failure(failure: &TransportFailure) -> Self {
        match failure {
            TransportFailure::Network(_) | TransportFailure::Timeout(_) => Self::Standard,
            TransportFailure::Server { status: 503, .. } => Self::Extended,
            // Not Implemented / HTTP Version Not Supported.
            TransportFailure::Server {
                status: 501 | 505, ..
            } => Self::Never,
            TransportFailure::Server { .. } => Self::Standard,
        }
    }

    fn scale(self) -> Option<f64> {
        match self {
            Self::Standard => Some(1.0),
            Self::Extended => Some(2.0),
            Self::Never => None,
        }
    }
}

/// Caller-directed retry of transport failures on reads.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts in total, the first one included.
    pub max_attempts: u32,
    /// Delay after the first failure, before scaling and jitter.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Growth of the delay per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after attempt number `attempt` (1-based)
    /// failed with `error`, or `None` to give up.
    ///
    /// The delay is drawn from the upper half of the capped backoff.
    pub fn delay_after(&self, error: &DeskError, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let DeskError::Transport(failure) = error else {
            return None;
        };
        let scale = Backoff::for_failure(failure).scale()?;
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let backoff = (self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent) * scale)
            .min(self.max_backoff.as_secs_f64());
        Some(Duration::from_secs_f64(backoff * (0.5 + 0.5 * jitter())))
    }

    /// Run `fetch` until it succeeds, fails with something not worth
    /// retrying, or runs out of attempts.
    pub async fn run<F, Fut, T>(&self, mut fetch: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let error = match fetch().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            let Some(delay) = self.delay_after(&error, attempt) else {
                return Err(error);
            };
            warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "read failed in transport; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Fraction in [0, 1) taken from the clock's sub-second part.
fn jitter() -> f64 {
    f64::from(chrono::Utc::now().timestamp_subsec_nanos() % 1_000_000) / 1_000_000.0
}
