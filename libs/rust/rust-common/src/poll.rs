//! Bounded polling until fetched state satisfies a condition.
//!
//! Unlike [`crate::retry::Retrier`], which retries an operation that failed,
//! a [`BoundedPoll`] keeps sampling state that was fetched successfully but
//! does not match yet. A probe reports one of three things: the condition
//! holds ([`Probe::Ready`]), it does not hold yet ([`Probe::Pending`] with a
//! human-readable observation), or polling must stop (`Err`).

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The condition holds
    Ready(T),
    /// The condition does not hold yet; the string describes what was seen
    Pending(String),
}

impl<T> Probe<T> {
    /// Build a pending probe from anything displayable.
    #[must_use]
    pub fn pending(observation: impl Into<String>) -> Self {
        Self::Pending(observation.into())
    }
}

/// Polling ended without the condition being met.
#[derive(Error, Debug)]
pub enum PollError<E> {
    /// The time budget ran out
    #[error("condition not met after {attempts} probes in {elapsed:?}: {last_observation}")]
    TimedOut {
        /// Number of probes made
        attempts: u32,
        /// Time spent polling
        elapsed: Duration,
        /// Observation reported by the last probe
        last_observation: String,
    },

    /// A probe asked to stop polling
    #[error("polling aborted: {0}")]
    Aborted(#[source] E),
}

/// Sleeps `interval`, probes, and repeats until ready or `timeout` elapsed.
#[derive(Debug, Clone, Copy)]
pub struct BoundedPoll {
    interval: Duration,
    timeout: Duration,
}

impl BoundedPoll {
    /// Create a poll with the given pause between probes and overall budget.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Pause between probes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Overall budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `probe` until it reports [`Probe::Ready`].
    ///
    /// The first probe happens one interval after the call.
    ///
    /// # Errors
    ///
    /// [`PollError::TimedOut`] with the last observation when the budget is
    /// spent, [`PollError::Aborted`] as soon as a probe returns `Err`.
    pub async fn until<F, Fut, T, E>(&self, mut probe: F) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, E>>,
    {
        let started = Instant::now();
        let mut attempts = 0_u32;

        loop {
            tokio::time::sleep(self.interval).await;
            attempts += 1;

            let last_observation = match probe().await.map_err(PollError::Aborted)? {
                Probe::Ready(value) => return Ok(value),
                Probe::Pending(observation) => observation,
            };

            let elapsed = started.elapsed();
            debug!(attempts, elapsed_ms = elapsed.as_millis(), observation = %last_observation, "Condition not met yet");

            if elapsed >= self.timeout {
                return Err(PollError::TimedOut {
                    attempts,
                    elapsed,
                    last_observation,
                });
            }
        }
    }
}
