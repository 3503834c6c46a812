use async_trait::async_trait;
use freightdesk_models::ChatMessage;
use tracing::info;

use crate::error::ChatError;

/// Destination for the engine's human-readable reasoning. Mockable for testing.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn post(&self, message: &ChatMessage) -> Result<(), ChatError>;
}

/// Writes chat entries to the tracing log. Used when no chat transport is wired.
pub struct TracingChatSink;

#[async_trait]
impl ChatSink for TracingChatSink {
    async fn post(&self, message: &ChatMessage) -> Result<(), ChatError> {
        info!(
            cargo_id = %message.cargo_id,
            sender = ?message.sender,
            "{}",
            message.text
        );
        Ok(())
    }
}
