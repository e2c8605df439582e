//! Per-endpoint circuit breaker.
//!
//! Failure-tracking state machine that short-circuits calls to a failing
//! endpoint. One instance per endpoint client; all concurrent invocations
//! share it, so the {state, counter, last-failure} tuple lives behind a
//! single mutex and every transition is applied atomically.
//!
//! The clock is `tokio::time::Instant` so breaker behavior is testable
//! under paused time.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::types::config::CircuitBreakerConfig;
use crate::types::{Error, Result};

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Wire-stable lowercase name, as reported by health checks.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    /// When set, a HALF_OPEN trial call is in flight and further callers are
    /// rejected until it settles. A claim older than the reset timeout is
    /// treated as abandoned (the trial future was dropped) and released.
    trial_started: Option<Instant>,
}

/// Failure-tracking guard around an endpoint's calls.
///
/// Transitions: CLOSED→OPEN when the consecutive-failure counter reaches the
/// threshold; OPEN→HALF_OPEN once the reset timeout elapses; HALF_OPEN→CLOSED
/// on a successful trial call; HALF_OPEN→OPEN immediately on a failed trial
/// call (single-shot trial). The counter resets to zero whenever the state
/// becomes CLOSED.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    enabled: bool,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout,
            enabled: config.enabled,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_started: None,
            }),
        }
    }

    /// Run `op` through the breaker.
    ///
    /// While OPEN and before the reset timeout elapses, fails immediately
    /// with [`Error::CircuitOpen`] without invoking `op` and without counting
    /// a failure. When disabled, calls `op` directly and touches no state.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.enabled {
            return op().await;
        }

        self.before_call()?;

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }

    /// Current state, re-evaluating the OPEN→HALF_OPEN time transition first.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        Self::refresh(&mut inner, self.reset_timeout);
        inner.state
    }

    /// Consecutive-failure counter.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Forcibly return to CLOSED with a zeroed counter (administrative use).
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.trial_started = None;
    }

    fn before_call(&self) -> Result<()> {
        let mut inner = self.lock();
        Self::refresh(&mut inner, self.reset_timeout);
        match inner.state {
            CircuitState::Open => Err(Error::circuit_open("endpoint unavailable")),
            // HALF_OPEN admits exactly one trial call; the claim is taken
            // under the same lock so concurrent callers cannot race past it.
            CircuitState::HalfOpen if inner.trial_started.is_some() => {
                Err(Error::circuit_open("trial call in flight"))
            }
            CircuitState::HalfOpen => {
                inner.trial_started = Some(Instant::now());
                Ok(())
            }
            CircuitState::Closed => Ok(()),
        }
    }

    fn refresh(inner: &mut BreakerInner, reset_timeout: Duration) {
        match inner.state {
            CircuitState::Open => {
                if let Some(last) = inner.last_failure {
                    if last.elapsed() >= reset_timeout {
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_started = None;
                    }
                }
            }
            CircuitState::HalfOpen => {
                if let Some(started) = inner.trial_started {
                    if started.elapsed() >= reset_timeout {
                        inner.trial_started = None;
                    }
                }
            }
            CircuitState::Closed => {}
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen | CircuitState::Closed => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.trial_started = None;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        inner.trial_started = None;
        // A failed HALF_OPEN trial reopens immediately; in CLOSED the breaker
        // opens only once the consecutive-failure counter reaches the threshold.
        if inner.state == CircuitState::HalfOpen || inner.failure_count >= self.failure_threshold {
            inner.state = CircuitState::Open;
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
