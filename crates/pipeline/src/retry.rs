//! Send-with-retries policy
//!
//! One retry shape serves every submission path: run the action, test the
//! outcome against a predicate, back off and repeat. Two limits exist:
//!
//! - `TransportOnly` - retry forever; the predicate should only demand
//!   that the request reached the server. Used for the first submission
//!   of a batch.
//! - `Bounded(n)` - at most `n` attempts; the predicate additionally
//!   demands zero per-item errors. Exhaustion returns the *last outcome*,
//!   not an error - the caller decides what survives.
//!
//! Backoff starts at 100 ms and doubles only every tenth retry, capped at
//! 5 s; a log line marks every tenth retry so an outage is visible without
//! flooding the log.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::PipelineError;

/// Initial backoff delay
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Backoff delay cap
pub const RETRY_MAX_DELAY: Duration = Duration::from_millis(5000);

/// Retries per backoff doubling and per log line
const RETRIES_PER_STEP: u32 = 10;

/// Retry limit for one submission phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    /// Retry indefinitely until the predicate accepts the outcome
    TransportOnly,

    /// At most this many attempts; the last outcome is returned as-is
    Bounded(u32),
}

/// Run `action` until `accept` passes or the limit is reached
///
/// Cancellation is observed at every backoff sleep; it is logged at
/// informational level and propagated as `PipelineError::Cancelled`.
pub async fn send_with_retries<T, F, Fut, P>(
    mut action: F,
    accept: P,
    limit: RetryLimit,
    cancel: &CancellationToken,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let outcome = action().await;

        if accept(&outcome) {
            return Ok(outcome);
        }

        if let RetryLimit::Bounded(max) = limit {
            if attempts >= max {
                // The caller inspects the last outcome and decides what to
                // quarantine
                return Ok(outcome);
            }
        }

        let delay = backoff_delay(attempts);
        if attempts % RETRIES_PER_STEP == 0 {
            warn!(
                retries = attempts,
                delay_ms = delay.as_millis() as u64,
                "submission still failing, backing off"
            );
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancellation observed during retry backoff");
                return Err(PipelineError::Cancelled);
            }
            _ = sleep(delay) => {}
        }
    }
}

/// Delay before the retry following `retries` completed attempts
///
/// 100 ms for the first ten retries, 200 ms for the next ten, and so on
/// up to the 5 s cap.
pub fn backoff_delay(retries: u32) -> Duration {
    let doublings = (retries / RETRIES_PER_STEP).min(6);
    (RETRY_BASE_DELAY * 2u32.pow(doublings)).min(RETRY_MAX_DELAY)
}
