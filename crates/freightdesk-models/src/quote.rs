use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a quote.
///
/// `Pending → Accepted | Refused | Countered`, and `Countered → Accepted`
/// when a counter is explicitly accepted. `Accepted` and `Refused` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Accepted,
    Refused,
    Countered,
}

impl QuoteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, QuoteStatus::Accepted | QuoteStatus::Refused)
    }

    pub fn can_transition_to(self, next: QuoteStatus) -> bool {
        matches!(
            (self, next),
            (QuoteStatus::Pending, QuoteStatus::Accepted)
                | (QuoteStatus::Pending, QuoteStatus::Refused)
                | (QuoteStatus::Pending, QuoteStatus::Countered)
                | (QuoteStatus::Countered, QuoteStatus::Accepted)
        )
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteStatus::Pending => write!(f, "pending"),
            QuoteStatus::Accepted => write!(f, "accepted"),
            QuoteStatus::Refused => write!(f, "refused"),
            QuoteStatus::Countered => write!(f, "countered"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    Manual,
    Agent,
}

/// A price quote sent for a cargo offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub id: String,
    pub cargo_id: String,
    pub price: Decimal,
    pub status: QuoteStatus,
    pub source: QuoteSource,
    /// Price proposed by the shipper when the quote was countered.
    pub counter_price: Option<Decimal>,
    /// Id assigned by the quote storage once the submission went through.
    #[serde(default)]
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    /// A freshly recorded, not yet submitted quote.
    pub fn pending(request: &QuoteRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            cargo_id: request.cargo_id.clone(),
            price: request.price,
            status: QuoteStatus::Pending,
            source: request.source,
            counter_price: None,
            remote_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn matches_id(&self, id: &str) -> bool {
        self.id == id || self.remote_id.as_deref() == Some(id)
    }
}

/// Payload handed to the quote storage collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteRequest {
    pub cargo_id: String,
    pub price: Decimal,
    pub message: Option<String>,
    pub source: QuoteSource,
}

impl QuoteRequest {
    pub fn agent(cargo_id: &str, price: Decimal, message: Option<String>) -> Self {
        Self {
            cargo_id: cargo_id.to_string(),
            price,
            message,
            source: QuoteSource::Agent,
        }
    }

    pub fn manual(cargo_id: &str, price: Decimal) -> Self {
        Self {
            cargo_id: cargo_id.to_string(),
            price,
            message: None,
            source: QuoteSource::Manual,
        }
    }
}

/// A status change reported by the quote storage (shipper accepted, refused or countered).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuoteFeedback {
    /// Local quote id or the storage-assigned id.
    pub quote_id: String,
    pub status: QuoteStatus,
    #[serde(default)]
    pub counter_price: Option<Decimal>,
}
