//! Bounded polling with timeout, backoff and cancellation
//!
//! Observation steps (DOM queries, read-after-write HTTP checks, origin
//! handoffs, target health checks) all go through a [`Poller`]. Evaluations
//! happen on the policy cadence after the start, with a final evaluation
//! exactly at the deadline, and every wait yields to the runtime.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{CadenceError, CadenceResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

/// Timeout + interval + backoff for one bounded poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,

    /// Upper bound for exponential delays
    #[serde(default)]
    pub max_interval_ms: Option<u64>,
}

fn default_timeout_ms() -> u64 {
    4000
}

fn default_interval_ms() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
            backoff: Backoff::Fixed,
            max_interval_ms: None,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(timeout_ms: u64, interval_ms: u64) -> Self {
        Self {
            timeout_ms,
            interval_ms,
            backoff: Backoff::Fixed,
            max_interval_ms: None,
        }
    }

    pub fn exponential(timeout_ms: u64, interval_ms: u64, max_interval_ms: u64) -> Self {
        Self {
            timeout_ms,
            interval_ms,
            backoff: Backoff::Exponential,
            max_interval_ms: Some(max_interval_ms),
        }
    }

    /// Evaluate once, right away.
    pub fn immediate() -> Self {
        Self::fixed(0, default_interval_ms())
    }

    pub fn with_timeout(&self, timeout_ms: Option<u64>) -> Self {
        match timeout_ms {
            Some(timeout_ms) => Self {
                timeout_ms,
                ..self.clone()
            },
            None => self.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn first_delay(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    fn next_delay(&self, current: Duration) -> Duration {
        match self.backoff {
            Backoff::Fixed => current,
            Backoff::Exponential => {
                let cap = Duration::from_millis(self.max_interval_ms.unwrap_or(self.timeout_ms).max(1));
                (current * 2).min(cap)
            }
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone)]
pub enum Observation<T> {
    /// The predicate is satisfied.
    Ready(T),
    /// Not yet; the payload is what was seen, kept for diagnostics.
    Pending(Value),
}

/// Drives the wait between evaluations of one bounded poll.
///
/// ```ignore
/// let mut poller = Poller::new("login form", &policy, &cancel);
/// while poller.next_attempt().await? {
///     match evaluate().await? {
///         Observation::Ready(v) => return Ok(v),
///         Observation::Pending(seen) => poller.record(seen),
///     }
/// }
/// Err(poller.timeout_error())
/// ```
pub struct Poller<'a> {
    what: String,
    policy: &'a RetryPolicy,
    cancel: &'a CancellationToken,
    start: Instant,
    delay: Duration,
    attempts: u32,
    finished: bool,
    last_observed: Value,
}

impl<'a> Poller<'a> {
    pub fn new(what: impl Into<String>, policy: &'a RetryPolicy, cancel: &'a CancellationToken) -> Self {
        Self {
            what: what.into(),
            policy,
            cancel,
            start: Instant::now(),
            delay: policy.first_delay(),
            attempts: 0,
            finished: false,
            last_observed: Value::Null,
        }
    }

    /// Wait for the next evaluation slot. Returns `Ok(false)` once the
    /// evaluation at the deadline has already happened.
    pub async fn next_attempt(&mut self) -> CadenceResult<bool> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        if self.finished {
            return Ok(false);
        }
        if self.policy.timeout_ms == 0 {
            self.finished = true;
            self.attempts += 1;
            return Ok(true);
        }

        let remaining = self.policy.timeout().saturating_sub(self.start.elapsed());
        if remaining.is_zero() {
            self.finished = true;
            return Ok(false);
        }

        let wait = self.delay.min(remaining);
        if wait == remaining {
            self.finished = true;
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = self.cancel.cancelled() => return Err(self.cancelled()),
        }

        self.delay = self.policy.next_delay(self.delay);
        self.attempts += 1;
        trace!(what = %self.what, attempt = self.attempts, "poll attempt");
        Ok(true)
    }

    pub fn record(&mut self, observed: Value) {
        self.last_observed = observed;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn timeout_error(&self) -> CadenceError {
        CadenceError::TimeoutExceeded {
            what: self.what.clone(),
            elapsed_ms: self.start.elapsed().as_millis() as u64,
            attempts: self.attempts,
            last_observed: self.last_observed.clone(),
        }
    }

    fn cancelled(&self) -> CadenceError {
        CadenceError::Cancelled(format!("poll for {} abandoned", self.what))
    }
}

/// Evaluate `predicate` until it is satisfied or the policy deadline passes.
pub async fn observe<T, F, Fut>(
    what: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut predicate: F,
) -> CadenceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CadenceResult<Observation<T>>>,
{
    let mut poller = Poller::new(what, policy, cancel);
    while poller.next_attempt().await? {
        match predicate().await? {
            Observation::Ready(value) => return Ok(value),
            Observation::Pending(seen) => poller.record(seen),
        }
    }
    Err(poller.timeout_error())
}
