use freightdesk_models::QuoteStatus;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Quote for cargo {cargo_id} rate limited, retry in {wait_seconds}s")]
    RateLimited { cargo_id: String, wait_seconds: u64 },

    #[error("Invalid quote price: {0}")]
    InvalidPrice(Decimal),

    #[error("Quote dispatch failed: {0}")]
    DispatchFailure(String),

    #[error("Giving up on {id} after {attempts} retries")]
    RetryExhausted { id: String, attempts: u32 },

    #[error("Unknown quote: {0}")]
    UnknownQuote(String),

    #[error("Illegal quote transition {from} -> {to}")]
    IllegalTransition { from: QuoteStatus, to: QuoteStatus },

    #[error("Malformed feedback: {0}")]
    MalformedFeedback(String),

    #[error("Engine state unavailable: {0}")]
    StatePoisoned(String),

    #[error("Engine is shut down")]
    ShutDown,
}

impl EngineError {
    /// Failures that need a human: the engine will not retry them on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidPrice(_) | EngineError::RetryExhausted { .. }
        )
    }
}

/// Failure of the geo-distance collaborator.
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Distance lookup failed: {0}")]
    Lookup(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

/// Failure of the chat sink collaborator.
#[derive(Error, Debug)]
#[error("Chat sink error: {0}")]
pub struct ChatError(pub String);
