use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use freightdesk_models::{DispatchConfig, RetryQueueEntry};
use tokio_util::sync::CancellationToken;

/// Exponential backoff for failed submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial failed submission.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// delay = base * 2^attempt, attempt counted from 0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Failed submissions awaiting their next attempt, each with its own cancel handle.
#[derive(Debug, Default)]
pub struct RetryQueue {
    entries: HashMap<String, (RetryQueueEntry, CancellationToken)>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an entry. A previous entry with the same id is cancelled and replaced.
    pub fn push(&mut self, entry: RetryQueueEntry, timer: CancellationToken) {
        if let Some((_, old)) = self.entries.insert(entry.id.clone(), (entry, timer)) {
            old.cancel();
        }
    }

    /// Count one more failed retry. Returns the new count.
    pub fn record_failure(&mut self, id: &str) -> Option<u32> {
        let (entry, _) = self.entries.get_mut(id)?;
        entry.retry_count += 1;
        entry.last_attempt = Utc::now();
        Some(entry.retry_count)
    }

    /// Remove an entry without touching its timer (used when the retry task finishes).
    pub fn remove(&mut self, id: &str) -> Option<RetryQueueEntry> {
        self.entries.remove(id).map(|(entry, _)| entry)
    }

    /// Stop the pending timer and drop the entry.
    pub fn cancel(&mut self, id: &str) -> Option<RetryQueueEntry> {
        self.entries.remove(id).map(|(entry, timer)| {
            timer.cancel();
            entry
        })
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, (_, timer)) in self.entries.drain() {
            timer.cancel();
        }
        count
    }

    pub fn get(&self, id: &str) -> Option<&RetryQueueEntry> {
        self.entries.get(id).map(|(entry, _)| entry)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn entries(&self) -> Vec<RetryQueueEntry> {
        self.entries.values().map(|(entry, _)| entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
