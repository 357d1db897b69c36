//! Fixed-interval retry with cancellation
//!
//! Every failure is treated the same way: wait `interval`, then try again. There is
//! no backoff and no jitter. With the default [`RetryConfig`] the loop only ends on
//! success or cancellation; `max_attempts` and `max_duration` bound it when set.
//!
//! # Example
//!
//! ```no_run
//! use tts_batch::config::RetryConfig;
//! use tts_batch::retry::{RetryOutcome, run_with_policy};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let outcome = run_with_policy(
//!     &config,
//!     &cancel,
//!     |_attempt| async { Ok::<_, String>(42) },
//!     |_attempt, _error, _retry_in| {},
//! )
//! .await;
//! assert!(matches!(outcome, RetryOutcome::Completed { value: 42, attempts: 1 }));
//! # }
//! ```

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a retry loop ended
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// An attempt succeeded
    Completed {
        /// Value returned by the successful attempt
        value: T,
        /// Attempts made, including the successful one
        attempts: u32,
    },
    /// The configured bound was reached
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last_error: E,
    },
    /// The cancellation token fired
    Cancelled {
        /// Attempts started before cancellation
        attempts: u32,
    },
}

/// Run `operation` until it succeeds, the policy gives up, or `cancel` fires
///
/// `operation` receives the 1-based attempt number. `on_failure` is called after
/// every failed attempt with the attempt number, the error, and the delay before
/// the next attempt (`None` when the policy gives up).
///
/// Cancellation interrupts both an in-flight attempt and the wait between attempts.
pub async fn run_with_policy<F, Fut, T, E, H>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
    mut on_failure: H,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    H: FnMut(u32, &E, Option<Duration>),
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled { attempts: attempt };
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return RetryOutcome::Cancelled { attempts: attempt };
            }
            result = operation(attempt) => result,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return RetryOutcome::Completed {
                    value,
                    attempts: attempt,
                };
            }
            Err(e) => {
                if gives_up(config, attempt, started.elapsed()) {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed, retry policy exhausted"
                    );
                    on_failure(attempt, &e, None);
                    return RetryOutcome::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    };
                }

                on_failure(attempt, &e, Some(config.interval));

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return RetryOutcome::Cancelled { attempts: attempt };
                    }
                    _ = tokio::time::sleep(config.interval) => {}
                }
            }
        }
    }
}

/// Whether another attempt would exceed the configured bounds
fn gives_up(config: &RetryConfig, attempt: u32, elapsed: Duration) -> bool {
    let out_of_attempts = config.max_attempts.is_some_and(|max| attempt >= max);
    // the next attempt would start after another full interval
    let out_of_time = config
        .max_duration
        .is_some_and(|max| elapsed.saturating_add(config.interval) > max);
    out_of_attempts || out_of_time
}
