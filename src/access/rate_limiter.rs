//! Per-principal fixed-window rate limiter.
//!
//! Each principal gets an independent window of `max_requests` points; the
//! window resets wholesale when its deadline passes. Callers without an
//! identity share the anonymous window. The clock is `tokio::time::Instant`
//! so limiter behavior is testable under paused time.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::types::config::RateLimitConfig;
use crate::types::{Error, Result};

/// Shared principal key for unidentified callers.
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

#[derive(Debug)]
struct Window {
    remaining: u32,
    resets_at: Instant,
}

/// Fixed-window request limiter keyed by principal.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    enabled: bool,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            enabled: config.enabled,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one point from the principal's window.
    ///
    /// Returns [`Error::RateLimited`] with the whole seconds remaining until
    /// the window resets (rounded up, minimum 1) once the window is
    /// exhausted. A `None` principal draws from the anonymous window.
    pub fn check_limit(&self, principal: Option<&str>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let key = principal.unwrap_or(ANONYMOUS_PRINCIPAL);
        let now = Instant::now();
        let mut windows = self.lock();

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            remaining: self.max_requests,
            resets_at: now + self.window,
        });

        if now >= window.resets_at {
            window.remaining = self.max_requests;
            window.resets_at = now + self.window;
        }

        if window.remaining == 0 {
            let until_reset = window.resets_at.duration_since(now);
            let retry_after = until_reset.as_secs_f64().ceil().max(1.0) as u64;
            tracing::warn!(principal = key, retry_after, "rate limit exceeded");
            return Err(Error::rate_limited(retry_after));
        }

        window.remaining -= 1;
        Ok(())
    }

    /// Points left in the principal's current window, without consuming one.
    pub fn remaining(&self, principal: Option<&str>) -> u32 {
        if !self.enabled {
            return self.max_requests;
        }
        let key = principal.unwrap_or(ANONYMOUS_PRINCIPAL);
        let now = Instant::now();
        let windows = self.lock();
        match windows.get(key) {
            Some(window) if now < window.resets_at => window.remaining,
            _ => self.max_requests,
        }
    }

    /// Drop the principal's window (administrative reset).
    pub fn reset(&self, principal: &str) {
        self.lock().remove(principal);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
