//! Fixed-wait retry bounded by an absolute deadline.

use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tokio::time::{sleep, timeout, Instant};

/// Retry policy applied around a single fallible call
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed pause between two attempts
    pub wait: Duration,
    /// Absolute budget measured from the first attempt
    pub deadline: Duration,
    /// Optional cap on the number of attempts (None means deadline only)
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait: Duration::from_millis(100),
            deadline: Duration::from_secs(2),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(wait_ms: u64, deadline_ms: u64) -> Self {
        Self {
            wait: Duration::from_millis(wait_ms),
            deadline: Duration::from_millis(deadline_ms),
            max_attempts: None,
        }
    }

    /// Run `operation` until it succeeds, fails with an error rejected by
    /// `is_retryable`, or the policy is exhausted. The last error is returned.
    ///
    /// An attempt still running when the deadline passes is cancelled and
    /// reported as the `Elapsed` conversion of `E`.
    pub async fn run<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display + From<Elapsed>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let remaining = self.deadline.saturating_sub(started.elapsed());
            let err = match timeout(remaining, operation()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(elapsed) => {
                    warn!(
                        "attempt {} still running at the {:?} deadline, giving up",
                        attempt, self.deadline
                    );
                    return Err(E::from(elapsed));
                }
            };

            if !is_retryable(&err) {
                debug!("attempt {} failed with a permanent error: {}", attempt, err);
                return Err(err);
            }

            if self.max_attempts.is_some_and(|max| attempt >= max) {
                warn!("giving up after {} attempts: {}", attempt, err);
                return Err(err);
            }

            // Never start a wait that would end past the deadline
            if started.elapsed() + self.wait >= self.deadline {
                warn!(
                    "giving up after {} attempts in {:?}: {}",
                    attempt,
                    started.elapsed(),
                    err
                );
                return Err(err);
            }

            debug!("attempt {} failed ({}), retrying in {:?}", attempt, err, self.wait);
            sleep(self.wait).await;
        }
    }
}
