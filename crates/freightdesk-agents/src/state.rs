//! Mutable engine state shared by offer processing, feedback handling and
//! the background sweeps.
//!
//! All state sits behind one `Mutex`. Handlers do their read-modify-write
//! inside a single [`SharedState::with`] closure and never hold the lock
//! across an `.await`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use freightdesk_models::{
    AgentMetrics, AgentSuggestion, CargoOffer, CostSettings, CounterOfferData, FreightdeskConfig,
    LevelFlags, Quote, QuoteStatus,
};
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::rate_limit::QuoteRateLimiter;
use crate::retry::RetryQueue;

/// Rolling buffer of the most recent suggestions.
#[derive(Debug)]
pub struct SuggestionBuffer {
    capacity: usize,
    items: VecDeque<AgentSuggestion>,
}

impl SuggestionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Append, evicting the oldest suggestion once over capacity.
    pub fn push(&mut self, suggestion: AgentSuggestion) {
        self.items.push_back(suggestion);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    /// Drop suggestions created before `now - ttl`. Returns how many were dropped.
    pub fn expire(&mut self, ttl: ChronoDuration, now: DateTime<Utc>) -> usize {
        let cutoff = now - ttl;
        let before = self.items.len();
        self.items.retain(|s| s.created_at >= cutoff);
        before - self.items.len()
    }

    pub fn latest_for(&self, cargo_id: &str) -> Option<&AgentSuggestion> {
        self.items.iter().rev().find(|s| s.cargo_id == cargo_id)
    }

    pub fn to_vec(&self) -> Vec<AgentSuggestion> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Local record of every quote sent in this process.
#[derive(Debug, Default)]
pub struct QuoteBook {
    quotes: HashMap<String, Quote>,
}

impl QuoteBook {
    pub fn insert(&mut self, quote: Quote) {
        self.quotes.insert(quote.id.clone(), quote);
    }

    /// Look up by local id, falling back to the storage-assigned id.
    pub fn get(&self, id: &str) -> Option<&Quote> {
        self.quotes
            .get(id)
            .or_else(|| self.quotes.values().find(|q| q.matches_id(id)))
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Quote> {
        let key = self.get(id)?.id.clone();
        self.quotes.get_mut(&key)
    }

    pub fn remove(&mut self, id: &str) -> Option<Quote> {
        self.quotes.remove(id)
    }

    pub fn set_remote_id(&mut self, id: &str, remote_id: String) {
        if let Some(quote) = self.quotes.get_mut(id) {
            quote.remote_id = Some(remote_id);
            quote.updated_at = Utc::now();
        }
    }

    /// Move a quote to `status`, rejecting transitions the lifecycle forbids.
    pub fn apply_status(
        &mut self,
        id: &str,
        status: QuoteStatus,
        counter_price: Option<Decimal>,
    ) -> Result<Quote, EngineError> {
        let quote = self
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownQuote(id.to_string()))?;

        if !quote.status.can_transition_to(status) {
            return Err(EngineError::IllegalTransition {
                from: quote.status,
                to: status,
            });
        }
        if status == QuoteStatus::Countered {
            let price = counter_price.ok_or_else(|| {
                EngineError::MalformedFeedback(format!("counter on quote {id} without a price"))
            })?;
            if price <= Decimal::ZERO {
                return Err(EngineError::MalformedFeedback(format!(
                    "counter on quote {id} with non-positive price {price}"
                )));
            }
            quote.counter_price = Some(price);
        }
        // An accepted counter settles at the shipper's price.
        if quote.status == QuoteStatus::Countered && status == QuoteStatus::Accepted {
            if let Some(price) = quote.counter_price {
                quote.price = price;
            }
        }

        quote.status = status;
        quote.updated_at = Utc::now();
        Ok(quote.clone())
    }

    pub fn by_cargo(&self, cargo_id: &str) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self
            .quotes
            .values()
            .filter(|q| q.cargo_id == cargo_id)
            .cloned()
            .collect();
        quotes.sort_by_key(|q| q.created_at);
        quotes
    }

    pub fn all(&self) -> Vec<Quote> {
        let mut quotes: Vec<Quote> = self.quotes.values().cloned().collect();
        quotes.sort_by_key(|q| q.created_at);
        quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// An offer kept for later counter-offers, stamped with when the pipeline took it.
#[derive(Debug, Clone)]
pub struct SeenOffer {
    pub offer: CargoOffer,
    pub seen_at: DateTime<Utc>,
}

/// Everything the engine mutates.
#[derive(Debug)]
pub struct EngineState {
    pub settings: CostSettings,
    pub levels: LevelFlags,
    pub metrics: AgentMetrics,
    pub suggestions: SuggestionBuffer,
    /// Offer ids already claimed by a pipeline pass.
    pub processed: HashSet<String>,
    /// Offers seen by the pipeline, needed to price counter-offers later.
    pub offers: HashMap<String, SeenOffer>,
    /// Open counter-offer threads keyed by cargo id.
    pub negotiations: HashMap<String, CounterOfferData>,
    pub quotes: QuoteBook,
    pub rate_limiter: QuoteRateLimiter,
    pub retry_queue: RetryQueue,
}

impl EngineState {
    pub fn new(config: &FreightdeskConfig) -> Self {
        Self {
            settings: config.cost.clone().normalized(),
            levels: config.levels,
            metrics: AgentMetrics::default(),
            suggestions: SuggestionBuffer::new(config.agent.suggestion_buffer_size),
            processed: HashSet::new(),
            offers: HashMap::new(),
            negotiations: HashMap::new(),
            quotes: QuoteBook::default(),
            rate_limiter: QuoteRateLimiter::new(std::time::Duration::from_secs(
                config.dispatch.rate_limit_window_seconds,
            )),
            retry_queue: RetryQueue::new(),
        }
    }
}

impl EngineState {
    pub fn remember_offer(&mut self, offer: CargoOffer) {
        self.offers.insert(
            offer.id.clone(),
            SeenOffer {
                offer,
                seen_at: Utc::now(),
            },
        );
    }

    pub fn offer(&self, cargo_id: &str) -> Option<&CargoOffer> {
        self.offers.get(cargo_id).map(|seen| &seen.offer)
    }

    /// Forget offers taken more than `ttl` before `now`, unless a negotiation
    /// on them is still open. The processed-id set is left alone so a
    /// forgotten offer is still never priced twice.
    pub fn prune_offers(&mut self, ttl: ChronoDuration, now: DateTime<Utc>) -> usize {
        let cutoff = now - ttl;
        let negotiations = &self.negotiations;
        let before = self.offers.len();
        self.offers
            .retain(|id, seen| seen.seen_at > cutoff || negotiations.contains_key(id));
        before - self.offers.len()
    }
}

/// Single lock around [`EngineState`].
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<EngineState>,
}

impl SharedState {
    pub fn new(state: EngineState) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Run one atomic read-modify-write against the state.
    pub fn with<T>(&self, f: impl FnOnce(&mut EngineState) -> T) -> Result<T, EngineError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|e| EngineError::StatePoisoned(format!("Engine mutex poisoned: {e}")))?;
        Ok(f(&mut state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightdesk_models::{QuoteRequest, SuggestionType};
    use rust_decimal_macros::dec;

    fn suggestion(cargo_id: &str, age_minutes: i64) -> AgentSuggestion {
        let mut s = AgentSuggestion::new(
            cargo_id,
            SuggestionType::Quote,
            Some(dec!(1000)),
            dec!(0.6),
            "test".to_string(),
        );
        s.created_at = Utc::now() - ChronoDuration::minutes(age_minutes);
        s
    }

    #[test]
    fn buffer_keeps_last_n() {
        let mut buffer = SuggestionBuffer::new(20);
        for i in 0..25 {
            buffer.push(suggestion(&format!("cargo-{i}"), 0));
        }
        assert_eq!(buffer.len(), 20);
        let ids: Vec<String> = buffer.to_vec().into_iter().map(|s| s.cargo_id).collect();
        assert_eq!(ids.first().unwrap(), "cargo-5");
        assert_eq!(ids.last().unwrap(), "cargo-24");
    }

    #[test]
    fn buffer_expires_old_suggestions() {
        let mut buffer = SuggestionBuffer::new(20);
        buffer.push(suggestion("old", 150));
        buffer.push(suggestion("fresh", 30));

        assert_eq!(buffer.expire(ChronoDuration::hours(2), Utc::now()), 1);
        assert_eq!(buffer.len(), 1);
        assert!(buffer.latest_for("fresh").is_some());
        assert!(buffer.latest_for("old").is_none());
    }

    fn book_with_pending() -> (QuoteBook, String) {
        let mut book = QuoteBook::default();
        let quote = Quote::pending(&QuoteRequest::agent("cargo-1", dec!(1223), None));
        let id = quote.id.clone();
        book.insert(quote);
        (book, id)
    }

    #[test]
    fn countered_then_accepted_settles_at_counter_price() {
        let (mut book, id) = book_with_pending();
        book.apply_status(&id, QuoteStatus::Countered, Some(dec!(1150)))
            .unwrap();
        let quote = book.apply_status(&id, QuoteStatus::Accepted, None).unwrap();
        assert_eq!(quote.status, QuoteStatus::Accepted);
        assert_eq!(quote.price, dec!(1150));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let (mut book, id) = book_with_pending();
        book.apply_status(&id, QuoteStatus::Refused, None).unwrap();
        let err = book
            .apply_status(&id, QuoteStatus::Accepted, None)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::IllegalTransition {
                from: QuoteStatus::Refused,
                to: QuoteStatus::Accepted
            }
        ));
        assert_eq!(book.get(&id).unwrap().status, QuoteStatus::Refused);
    }

    #[test]
    fn counter_requires_price() {
        let (mut book, id) = book_with_pending();
        let err = book
            .apply_status(&id, QuoteStatus::Countered, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedFeedback(_)));
        assert_eq!(book.get(&id).unwrap().status, QuoteStatus::Pending);
    }

    #[test]
    fn lookup_by_remote_id() {
        let (mut book, id) = book_with_pending();
        book.set_remote_id(&id, "remote-77".to_string());
        assert_eq!(book.get("remote-77").unwrap().id, id);
        book.apply_status("remote-77", QuoteStatus::Accepted, None)
            .unwrap();
        assert_eq!(book.get(&id).unwrap().status, QuoteStatus::Accepted);
    }

    #[test]
    fn unknown_quote() {
        let mut book = QuoteBook::default();
        assert!(matches!(
            book.apply_status("nope", QuoteStatus::Accepted, None),
            Err(EngineError::UnknownQuote(_))
        ));
    }

    #[test]
    fn state_clamps_configured_margin() {
        let mut config = FreightdeskConfig::default();
        config.cost.margin_pct = dec!(55);
        let state = EngineState::new(&config);
        assert_eq!(state.settings.margin_pct, dec!(30));
    }
}
