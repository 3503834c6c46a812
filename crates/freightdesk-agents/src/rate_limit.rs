//! Per-cargo quote pacing.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::EngineError;

/// Remembers when the last quote went out for each cargo and refuses a new
/// one until the window has passed. Rate-limited attempts are not queued.
#[derive(Debug)]
pub struct QuoteRateLimiter {
    window: Duration,
    last_sent: HashMap<String, Instant>,
}

impl QuoteRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Time left before `cargo_id` may be quoted again, if any.
    pub fn remaining(&self, cargo_id: &str) -> Option<Duration> {
        let last = self.last_sent.get(cargo_id)?;
        let elapsed = last.elapsed();
        (elapsed < self.window).then(|| self.window - elapsed)
    }

    pub fn can_send(&self, cargo_id: &str) -> bool {
        self.remaining(cargo_id).is_none()
    }

    /// `RateLimited` with the wait in whole seconds, rounded up.
    pub fn check(&self, cargo_id: &str) -> Result<(), EngineError> {
        match self.remaining(cargo_id) {
            None => Ok(()),
            Some(left) => {
                let mut wait_seconds = left.as_secs();
                if left.subsec_nanos() > 0 {
                    wait_seconds += 1;
                }
                Err(EngineError::RateLimited {
                    cargo_id: cargo_id.to_string(),
                    wait_seconds,
                })
            }
        }
    }

    pub fn record(&mut self, cargo_id: &str) {
        self.last_sent.insert(cargo_id.to_string(), Instant::now());
    }

    /// Drop entries whose window has passed. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.last_sent.len();
        let window = self.window;
        self.last_sent.retain(|_, sent| sent.elapsed() < window);
        before - self.last_sent.len()
    }

    pub fn tracked(&self) -> usize {
        self.last_sent.len()
    }
}
