pub mod chat;
pub mod costing;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod negotiator;
pub mod orchestrator;
pub mod pipeline;
pub mod quote_store;
pub mod rate_limit;
pub mod retry;
pub mod scorer;
pub mod state;
pub mod suggester;
pub mod sweeper;
pub mod tuner;

pub mod test_support;

pub use chat::{ChatSink, TracingChatSink};
pub use costing::{calculate_cost, CostCalculator};
pub use dispatch::{DispatchEvent, QuoteDispatcher};
pub use error::{ChatError, EngineError, GeoError};
pub use geo::{CachedGeoDistance, GeoDistance, Haversine};
pub use negotiator::NegotiationAssistant;
pub use orchestrator::{FeedbackReport, NegotiationEngine, OfferReport};
pub use pipeline::OfferStage;
pub use quote_store::{LedgerQuoteStore, QuoteStore};
pub use rate_limit::QuoteRateLimiter;
pub use retry::{RetryPolicy, RetryQueue};
pub use scorer::score_confidence;
pub use suggester::suggest_quote;
pub use tuner::{AutoTuner, TuneOutcome};
