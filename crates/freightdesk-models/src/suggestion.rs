use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    /// Send a quote at the suggested price.
    Quote,
    /// Answer a counter-offer with our own counter price.
    Counter,
    /// Hand the thread to a human (accept the counter or walk away).
    Negotiate,
    /// Do not bid on this offer.
    Skip,
}

/// An actionable recommendation produced by the suggestion or negotiation level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSuggestion {
    pub id: Uuid,
    pub cargo_id: String,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    pub price: Option<Decimal>,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub reasoning: String,
    /// The engine is confident enough to dispatch without confirmation.
    /// Whether it actually does is up to the orchestrator.
    #[serde(default)]
    pub auto_send: bool,
    pub created_at: DateTime<Utc>,
}

impl AgentSuggestion {
    pub fn new(
        cargo_id: &str,
        kind: SuggestionType,
        price: Option<Decimal>,
        confidence: Decimal,
        reasoning: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cargo_id: cargo_id.to_string(),
            kind,
            price,
            confidence,
            reasoning,
            auto_send: false,
            created_at: Utc::now(),
        }
    }
}
