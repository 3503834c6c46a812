use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Agent,
    User,
    System,
}

/// A human-readable log line posted to the cargo's chat thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub cargo_id: String,
    pub sender: SenderType,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn agent(cargo_id: &str, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            cargo_id: cargo_id.to_string(),
            sender: SenderType::Agent,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}
