//! Retry logic with exponential backoff
//!
//! Used for record-local work that may be retried in place, such as article extraction.
//! Feed pagination does not use this module: a failed page is retried by the crawler's
//! own loop and bounded by the source's [error budget](crate::error_budget).
//!
//! # Example
//!
//! ```no_run
//! use news_archives::retry::{IsRetryable, with_retry};
//! use news_archives::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, ExtractionError, FeedError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, overloaded servers) return `true`.
/// Permanent failures (not found, unparseable content, bad configuration) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ExtractionError {
    fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Network { transient, .. } => *transient,
            // Rate limiting and server-side failures usually clear up
            ExtractionError::Http { status } => *status == 429 || *status >= 500,
            ExtractionError::Parse(_) => false,
            // Only surfaced as an error when the empty-body policy asks for retries
            ExtractionError::EmptyBody => true,
        }
    }
}

impl IsRetryable for FeedError {
    fn is_retryable(&self) -> bool {
        match self {
            FeedError::Transport(_) => true,
            FeedError::Api { status, .. } => *status == 429 || *status >= 500,
            FeedError::Auth(_) | FeedError::Parse(_) | FeedError::PageNotFound(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Feed(e) => e.is_retryable(),
            Error::Extraction(e) => e.is_retryable(),
            Error::Resolve(_) => false,
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::ShuttingDown => false,
            Error::Other(_) => false,
        }
    }
}

/// Delays between attempts: `initial_delay`, growing by `backoff_multiplier` up to
/// `max_delay`, one per allowed retry
struct Backoff<'a> {
    config: &'a RetryConfig,
    next: Duration,
    remaining: u32,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            next: config.initial_delay,
            remaining: config.max_attempts,
        }
    }
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.remaining = self.remaining.checked_sub(1)?;
        let base = self.next;
        self.next = base
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);
        Some(if self.config.jitter { add_jitter(base) } else { base })
    }
}

/// Run `operation` until it succeeds, fails permanently, or the retries run out
///
/// The operation runs at most `config.max_attempts + 1` times. The last error is returned
/// when no retry is left.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut delays = Backoff::new(config);
    let mut retries = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::debug!(retries, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        let Some(delay) = delays.next() else {
            tracing::warn!(error = %err, retries, "Giving up, no retries left");
            return Err(err);
        };
        retries += 1;
        tracing::debug!(
            error = %err,
            retry = retries,
            of = config.max_attempts,
            delay_ms = delay.as_millis(),
            "Transient failure, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    delay.mul_f64(1.0 + rand::thread_rng().gen_range(0.0..=1.0))
}
