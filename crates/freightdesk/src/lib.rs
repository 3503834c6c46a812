//! Freightdesk - negotiation engine for freight dispatchers
//!
//! Prices cargo offers, suggests quotes, tunes the margin from shipper
//! feedback and answers counter-offers. Quotes are recorded in a local
//! SQLite ledger.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use freightdesk::models::{CargoOffer, FreightdeskConfig, QuoteFeedback};
//! use freightdesk::agents::{NegotiationEngine, OfferReport};
//! use freightdesk::store::QuoteLedger;
//! ```

pub use freightdesk_agents as agents;
pub use freightdesk_models as models;
pub use freightdesk_store as store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use freightdesk_agents::{
    CachedGeoDistance, FeedbackReport, Haversine, LedgerQuoteStore, NegotiationEngine,
    OfferReport, TracingChatSink,
};
use freightdesk_models::{
    AgentMetrics, AgentSuggestion, CargoOffer, CostSettings, FreightdeskConfig, Quote,
    QuoteFeedback, RetryQueueEntry,
};
use freightdesk_store::QuoteLedger;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

const IN_MEMORY: &str = ":memory:";

/// An engine wired to the ledger it submits quotes to.
pub struct Desk {
    pub engine: Arc<NegotiationEngine>,
    pub ledger: Arc<LedgerQuoteStore>,
}

/// Feedback the engine refused, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedFeedback {
    pub quote_id: String,
    pub error: String,
}

/// Everything one batch run produced, plus the engine state afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub offers: Vec<OfferReport>,
    pub feedback: Vec<FeedbackReport>,
    pub rejected_feedback: Vec<RejectedFeedback>,
    pub suggestions: Vec<AgentSuggestion>,
    pub quotes: Vec<Quote>,
    pub retry_queue: Vec<RetryQueueEntry>,
    pub metrics: AgentMetrics,
    pub settings: CostSettings,
}

/// Build a Desk from configuration.
///
/// Open quotes already in the ledger are loaded into the engine so that
/// feedback from a later run can refer to them.
pub fn build_desk(config: &FreightdeskConfig) -> Result<Desk, anyhow::Error> {
    let ledger = open_ledger(&config.store.sqlite_path)?;
    let open_quotes = ledger.list_open().context("Failed to read open quotes")?;
    let ledger = Arc::new(LedgerQuoteStore::new(ledger));

    let geo = Arc::new(CachedGeoDistance::new(
        Haversine,
        config.store.distance_cache_capacity,
        Duration::from_secs(config.store.distance_cache_ttl_seconds),
    ));
    let engine = Arc::new(NegotiationEngine::new(
        config,
        geo,
        ledger.clone(),
        Arc::new(TracingChatSink),
    ));
    engine.restore_quotes(open_quotes)?;

    Ok(Desk { engine, ledger })
}

fn open_ledger(path: &str) -> Result<QuoteLedger, anyhow::Error> {
    if path == IN_MEMORY {
        return Ok(QuoteLedger::open_in_memory()?);
    }
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create ledger directory: {}", dir.display()))?;
        }
    }
    QuoteLedger::open(path).with_context(|| format!("Failed to open ledger: {path}"))
}

/// Decode feedback records one at a time.
///
/// A record that does not decode is rejected with the serde error and the
/// others still go through.
pub fn decode_feedback(records: Vec<Value>) -> (Vec<QuoteFeedback>, Vec<RejectedFeedback>) {
    let mut decoded = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        let quote_id = record
            .get("quote_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<QuoteFeedback>(record) {
            Ok(feedback) => decoded.push(feedback),
            Err(e) => {
                warn!(index, quote_id = %quote_id, error = %e, "Malformed feedback record skipped");
                rejected.push(RejectedFeedback {
                    quote_id,
                    error: e.to_string(),
                });
            }
        }
    }
    (decoded, rejected)
}

impl Desk {
    /// Process `offers` concurrently, then apply `feedback` records in order.
    ///
    /// Accepted feedback is mirrored into the ledger. Records that do not
    /// decode or that the engine refuses are reported and change nothing.
    pub async fn run_batch(
        &self,
        offers: Vec<CargoOffer>,
        feedback: Vec<Value>,
    ) -> Result<BatchReport, anyhow::Error> {
        let handles: Vec<_> = offers
            .into_iter()
            .map(|offer| self.engine.spawn_offer(offer))
            .collect();

        let mut offer_reports = Vec::new();
        for handle in handles {
            if let Some(report) = handle.await.context("Offer task panicked")?? {
                offer_reports.push(report);
            }
        }

        let (feedback, mut rejected) = decode_feedback(feedback);
        let mut applied = Vec::new();
        for event in feedback {
            match self.engine.handle_feedback(event.clone()).await {
                Ok(report) => {
                    let quote = &report.quote;
                    if let Err(e) = self.ledger.with_ledger(|l| {
                        l.update_status(&quote.id, quote.status, quote.counter_price)
                    }) {
                        warn!(quote_id = %quote.id, error = %e, "Ledger not updated");
                    }
                    applied.push(report);
                }
                Err(e) => rejected.push(RejectedFeedback {
                    quote_id: event.quote_id,
                    error: e.to_string(),
                }),
            }
        }

        info!(
            offers = offer_reports.len(),
            feedback = applied.len(),
            rejected = rejected.len(),
            "Batch complete"
        );

        Ok(BatchReport {
            offers: offer_reports,
            feedback: applied,
            rejected_feedback: rejected,
            suggestions: self.engine.suggestions()?,
            quotes: self.engine.quotes()?,
            retry_queue: self.engine.retry_queue()?,
            metrics: self.engine.metrics()?,
            settings: self.engine.settings()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use freightdesk_agents::OfferStage;
    use freightdesk_models::{Coordinates, QuoteRequest, QuoteStatus, SuggestionType, Urgency};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn warsaw_berlin(id: &str, price: rust_decimal::Decimal) -> CargoOffer {
        CargoOffer {
            id: id.to_string(),
            pickup: Coordinates::new(52.2297, 21.0122),
            delivery: Coordinates::new(52.5200, 13.4050),
            weight_kg: dec!(8000),
            urgency: Urgency::Normal,
            cargo_type: "pallets".to_string(),
            price,
            posted_at: Utc::now(),
        }
    }

    fn memory_config() -> FreightdeskConfig {
        let mut config = FreightdeskConfig::default();
        config.store.sqlite_path = IN_MEMORY.to_string();
        config
    }

    #[tokio::test]
    async fn batch_prices_offers_and_rejects_unknown_feedback() {
        let desk = build_desk(&memory_config()).unwrap();
        let report = desk
            .run_batch(
                vec![warsaw_berlin("cheap", dec!(500)), warsaw_berlin("good", dec!(1400))],
                vec![json!({"quote_id": "missing", "status": "accepted"})],
            )
            .await
            .unwrap();

        assert_eq!(report.offers.len(), 2);
        let cheap = report.offers.iter().find(|r| r.cargo_id == "cheap").unwrap();
        assert_eq!(cheap.stage, OfferStage::Skipped);
        let good = report.offers.iter().find(|r| r.cargo_id == "good").unwrap();
        assert_eq!(good.suggestion.as_ref().unwrap().kind, SuggestionType::Quote);

        assert!(report.feedback.is_empty());
        assert_eq!(report.rejected_feedback.len(), 1);
        assert_eq!(report.metrics.total_processed, 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["offers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn feedback_in_a_later_run_updates_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = FreightdeskConfig::default();
        config.store.sqlite_path = dir
            .path()
            .join("ledger")
            .join("freightdesk.db")
            .to_string_lossy()
            .into_owned();

        let quote_id = {
            let desk = build_desk(&config).unwrap();
            let quote = desk
                .engine
                .send_quote(QuoteRequest::agent("cargo-1", dec!(1223), None))
                .await
                .unwrap();
            desk.engine.shutdown().await;
            quote.id
        };

        let desk = build_desk(&config).unwrap();
        let report = desk
            .run_batch(
                Vec::new(),
                vec![json!({"quote_id": quote_id, "status": "accepted"})],
            )
            .await
            .unwrap();

        assert_eq!(report.feedback.len(), 1);
        assert_eq!(report.settings.margin_pct, dec!(14.5));
        let stored = desk
            .ledger
            .with_ledger(|l| l.get(&quote_id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, QuoteStatus::Accepted);
    }

    #[tokio::test]
    async fn malformed_feedback_record_is_rejected_alone() {
        let desk = build_desk(&memory_config()).unwrap();
        let mut ids = Vec::new();
        for cargo in ["cargo-a", "cargo-b", "cargo-c"] {
            let quote = desk
                .engine
                .send_quote(QuoteRequest::agent(cargo, dec!(1223), None))
                .await
                .unwrap();
            ids.push(quote.id);
        }

        let report = desk
            .run_batch(
                Vec::new(),
                vec![
                    json!({"quote_id": ids[0], "status": "accepted"}),
                    json!({"quote_id": ids[1], "status": "lost"}),
                    json!({"quote_id": ids[2], "status": "refused"}),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report.feedback.len(), 2);
        assert_eq!(report.rejected_feedback.len(), 1);
        assert_eq!(report.rejected_feedback[0].quote_id, ids[1]);
        assert!(report.rejected_feedback[0].error.contains("lost"));

        assert_eq!(report.metrics.quotes_generated, 2);
        assert_eq!(report.metrics.acceptance_rate, dec!(0.5));
        assert_eq!(report.settings.margin_pct, dec!(15));
        let untouched = desk.engine.quote(&ids[1]).unwrap().unwrap();
        assert_eq!(untouched.status, QuoteStatus::Pending);
        desk.engine.shutdown().await;
    }
}
