//! Deterministic collaborators for unit and scenario tests.
//!
//! Each double follows a fixed script (a constant distance, a number of
//! failures before success) so engine behaviour under test never depends on
//! the network or on randomness.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use freightdesk_models::{CargoOffer, ChatMessage, Coordinates, Quote, QuoteRequest, Urgency};
use freightdesk_store::StoreError;
use rust_decimal::Decimal;

use crate::chat::ChatSink;
use crate::error::{ChatError, GeoError};
use crate::geo::GeoDistance;
use crate::quote_store::QuoteStore;

/// Warsaw to Berlin pallets with normal urgency, posted now.
pub fn sample_offer(id: &str, price: Decimal) -> CargoOffer {
    CargoOffer {
        id: id.to_string(),
        pickup: Coordinates::new(52.2297, 21.0122),
        delivery: Coordinates::new(52.5200, 13.4050),
        weight_kg: Decimal::from(12_000),
        urgency: Urgency::Normal,
        cargo_type: "pallets".to_string(),
        price,
        posted_at: Utc::now(),
    }
}

/// Every route has the same length.
pub struct FixedDistance(pub Decimal);

#[async_trait]
impl GeoDistance for FixedDistance {
    async fn distance_km(&self, _from: &Coordinates, _to: &Coordinates) -> Result<Decimal, GeoError> {
        Ok(self.0)
    }
}

/// A geo service that is always down.
pub struct FailingDistance;

#[async_trait]
impl GeoDistance for FailingDistance {
    async fn distance_km(&self, _from: &Coordinates, _to: &Coordinates) -> Result<Decimal, GeoError> {
        Err(GeoError::Lookup("geo service unreachable".to_string()))
    }
}

/// Quote storage that fails its first `fail_first` submissions, then succeeds.
pub struct ScriptedQuoteStore {
    fail_first: usize,
    calls: AtomicUsize,
    submitted: Mutex<Vec<Quote>>,
}

impl ScriptedQuoteStore {
    pub fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            fail_first,
            calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// Submissions attempted so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Quotes that went through, in order.
    pub fn submitted(&self) -> Vec<Quote> {
        self.submitted.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuoteStore for ScriptedQuoteStore {
    async fn submit(&self, quote: &Quote, _request: &QuoteRequest) -> Result<String, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(StoreError::Unavailable(format!(
                "scripted failure {} of {}",
                call + 1,
                self.fail_first
            )));
        }
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(quote.clone());
        }
        Ok(format!("remote-{}", quote.id))
    }
}

/// Chat sink that keeps every delivered entry.
#[derive(Default)]
pub struct RecordingChatSink {
    fail_first: usize,
    calls: AtomicUsize,
    messages: Mutex<Vec<ChatMessage>>,
}

impl RecordingChatSink {
    pub fn failing_first(fail_first: usize) -> Self {
        Self {
            fail_first,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }
}

#[async_trait]
impl ChatSink for RecordingChatSink {
    async fn post(&self, message: &ChatMessage) -> Result<(), ChatError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ChatError("chat unavailable".to_string()));
        }
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.clone());
        }
        Ok(())
    }
}
