use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::quote::QuoteRequest;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryKind {
    Quote,
    Message,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RetryPayload {
    Quote(QuoteRequest),
    Message(ChatMessage),
}

/// A failed submission waiting for its next backoff attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryQueueEntry {
    /// Quote id or chat message id of the failed submission.
    pub id: String,
    pub kind: RetryKind,
    pub payload: RetryPayload,
    /// Retries already spent. Never exceeds the configured maximum.
    pub retry_count: u32,
    pub last_attempt: DateTime<Utc>,
}

impl RetryQueueEntry {
    pub fn new(id: String, payload: RetryPayload) -> Self {
        let kind = match payload {
            RetryPayload::Quote(_) => RetryKind::Quote,
            RetryPayload::Message(_) => RetryKind::Message,
        };
        Self {
            id,
            kind,
            payload,
            retry_count: 0,
            last_attempt: Utc::now(),
        }
    }
}
