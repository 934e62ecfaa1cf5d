use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{rngs::OsRng, Rng};
use tracing::debug;

use crate::error::{AcmeError, AcmeResult};

/// Polling parameters: attempt count and the inter-attempt delay window.
#[derive(Clone, Debug)]
pub struct RetryOptions {
    pub attempts: u32,
    pub min: Duration,
    pub max: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: 5,
            min: Duration::from_millis(5000),
            max: Duration::from_millis(30000),
        }
    }
}

/// Shared flag an attempt can trip to stop further retries. Also used as the
/// caller-facing cancellation handle for long-running operations.
#[derive(Clone, Debug, Default)]
pub struct Abort(Arc<AtomicBool>);

impl Abort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs `attempt_fn` until it succeeds, trips the abort handle, or all
/// attempts are spent.
///
/// An error with the abort handle tripped propagates immediately. Exhausting
/// the attempts wraps the final error in [`AcmeError::Timeout`].
pub async fn retry<T, F, Fut>(options: &RetryOptions, mut attempt_fn: F) -> AcmeResult<T>
where
    F: FnMut(Abort) -> Fut,
    Fut: Future<Output = AcmeResult<T>>,
{
    let abort = Abort::new();
    let attempts = options.attempts.max(1);
    let mut last_err = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(options, attempt - 1)).await;
        }
        match attempt_fn(abort.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) if abort.is_aborted() => return Err(err),
            Err(AcmeError::Cancelled) => return Err(AcmeError::Cancelled),
            Err(err) => {
                debug!(attempt, error = %err, "attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(AcmeError::Timeout {
        attempts,
        source: Box::new(
            last_err.unwrap_or_else(|| AcmeError::Config("retry ran zero attempts".to_string())),
        ),
    })
}

/// Exponential backoff with jitter, clamped to `[min, max]`.
fn backoff_delay(options: &RetryOptions, prior_attempts: u32) -> Duration {
    let factor = 1u32.checked_shl(prior_attempts).unwrap_or(u32::MAX);
    let uncapped = options.min.saturating_mul(factor);
    let capped = uncapped.clamp(options.min, options.max);
    let jitter: f64 = OsRng.gen_range(0.5..=1.0);
    capped.mul_f64(jitter).clamp(options.min, options.max)
}
