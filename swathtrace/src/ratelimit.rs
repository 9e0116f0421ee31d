//! Minimum-interval rate limiting for remote calls.

use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// Enforces a minimum spacing between consecutive remote calls.
///
/// The limiter is owned by whoever issues the calls and is used through
/// `&mut self`; it is not shared between threads.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Option<Instant>,
    calls: u64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
            calls: 0,
        }
    }

    /// A limiter that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Time left before the next call may start.
    pub fn remaining(&self) -> Duration {
        match self.last_call {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Runs `f` after waiting out the interval since the previous call.
    ///
    /// The timestamp is taken when `f` returns, whatever its result.
    pub fn call<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let wait = self.remaining();
        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis() as u64, "Rate limiting remote call");
            thread::sleep(wait);
        }
        let result = f();
        self.last_call = Some(Instant::now());
        self.calls += 1;
        result
    }

    /// Number of calls made through this limiter.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}
