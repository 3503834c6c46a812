pub mod chat;
pub mod config;
pub mod cost;
pub mod metrics;
pub mod negotiation;
pub mod offer;
pub mod quote;
pub mod retry;
pub mod suggestion;

pub use chat::{ChatMessage, SenderType};
pub use config::{
    clamp_margin, AgentConfig, CostSettings, DispatchConfig, FreightdeskConfig, Level, LevelFlags,
    StoreConfig, MAX_MARGIN_PCT, MIN_MARGIN_PCT,
};
pub use cost::{CostAnalysis, CostBreakdown};
pub use metrics::AgentMetrics;
pub use negotiation::CounterOfferData;
pub use offer::{CargoOffer, Coordinates, Urgency};
pub use quote::{Quote, QuoteFeedback, QuoteRequest, QuoteSource, QuoteStatus};
pub use retry::{RetryKind, RetryPayload, RetryQueueEntry};
pub use suggestion::{AgentSuggestion, SuggestionType};
