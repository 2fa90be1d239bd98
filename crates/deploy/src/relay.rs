//! Bounded polling of conditions that only an external relay can make true.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use crate::{
    cancel::CancelToken,
    error::{DeployError, Result},
};

/// Default delay between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default wall-clock bound on a single wait.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(600);

/// What a single poll observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// The condition holds.
    Ready,
    /// Not yet; poll again.
    Pending,
    /// The condition can no longer become true.
    Failed(String),
}

/// Polls a read-only predicate at a fixed interval, without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayWaiter {
    interval: Duration,
    max_wait: Duration,
}

impl Default for RelayWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_WAIT)
    }
}

impl RelayWaiter {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Poll `predicate` until it reports [`Poll::Ready`].
    ///
    /// The first poll runs immediately. Returns the number of polls performed,
    /// the last one being the poll that observed readiness. Errors from the
    /// predicate abort the wait.
    pub async fn wait_until<F, Fut>(
        &self,
        condition: &str,
        mut predicate: F,
        cancel: &CancelToken,
    ) -> Result<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Poll>>,
    {
        let started = Instant::now();
        let mut polls: u32 = 0;

        tracing::info!(
            condition,
            interval_ms = self.interval.as_millis() as u64,
            max_wait_secs = self.max_wait.as_secs(),
            "Waiting for relay"
        );

        loop {
            cancel.check()?;
            polls += 1;

            match predicate().await? {
                Poll::Ready => {
                    tracing::info!(
                        condition,
                        polls,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Condition satisfied"
                    );
                    return Ok(polls);
                }
                Poll::Failed(reason) => {
                    return Err(DeployError::RelayFailed {
                        condition: condition.to_string(),
                        reason,
                    });
                }
                Poll::Pending => {}
            }

            let elapsed = started.elapsed();
            if elapsed + self.interval > self.max_wait {
                return Err(DeployError::PollTimeout {
                    condition: condition.to_string(),
                    polls,
                    elapsed,
                });
            }

            tracing::debug!(condition, polls, "Condition not met yet");
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            }
        }
    }
}
