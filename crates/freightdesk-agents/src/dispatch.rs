//! Quote and chat dispatch with per-cargo rate limiting and backoff retries.

use std::sync::Arc;

use freightdesk_models::{
    ChatMessage, Quote, QuoteRequest, RetryKind, RetryPayload, RetryQueueEntry,
};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::chat::ChatSink;
use crate::error::EngineError;
use crate::quote_store::QuoteStore;
use crate::retry::RetryPolicy;
use crate::state::SharedState;

const EVENT_CAPACITY: usize = 64;

/// Outcome of a queued retry, published once per queue entry.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// A retry went through after `attempts` retries.
    Delivered {
        id: String,
        kind: RetryKind,
        attempts: u32,
    },
    /// Every retry failed and the entry was dropped.
    RetryExhausted {
        id: String,
        kind: RetryKind,
        attempts: u32,
    },
}

/// Sends quotes to the quote store and chat entries to the chat sink.
///
/// Cheap to clone: every clone shares the same state, collaborators, retry
/// tasks and event channel.
#[derive(Clone)]
pub struct QuoteDispatcher {
    state: Arc<SharedState>,
    store: Arc<dyn QuoteStore>,
    chat: Arc<dyn ChatSink>,
    policy: RetryPolicy,
    events: broadcast::Sender<DispatchEvent>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl QuoteDispatcher {
    pub fn new(
        state: Arc<SharedState>,
        store: Arc<dyn QuoteStore>,
        chat: Arc<dyn ChatSink>,
        policy: RetryPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state,
            store,
            chat,
            policy,
            events,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Validate, rate-check, record and submit a quote.
    ///
    /// A failed submission stays in the quote book as `pending` and is
    /// queued for backoff retries. The caller gets `DispatchFailure`. When
    /// the retries run out the quote is dropped from the book.
    pub async fn send_quote(&self, request: QuoteRequest) -> Result<Quote, EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::ShutDown);
        }
        if request.price <= Decimal::ZERO {
            return Err(EngineError::InvalidPrice(request.price));
        }

        let mut quote = self.state.with(|s| {
            s.rate_limiter.check(&request.cargo_id)?;
            let quote = Quote::pending(&request);
            s.quotes.insert(quote.clone());
            s.rate_limiter.record(&request.cargo_id);
            Ok::<_, EngineError>(quote)
        })??;

        match self.store.submit(&quote, &request).await {
            Ok(remote_id) => {
                self.state
                    .with(|s| s.quotes.set_remote_id(&quote.id, remote_id.clone()))?;
                info!(
                    cargo_id = %quote.cargo_id,
                    quote_id = %quote.id,
                    price = %quote.price,
                    source = ?quote.source,
                    "Quote sent"
                );
                quote.remote_id = Some(remote_id);
                Ok(quote)
            }
            Err(e) => {
                warn!(
                    cargo_id = %quote.cargo_id,
                    quote_id = %quote.id,
                    error = %e,
                    "Quote submission failed, queued for retry"
                );
                self.enqueue(RetryQueueEntry::new(
                    quote.id.clone(),
                    RetryPayload::Quote(request),
                ))?;
                Err(EngineError::DispatchFailure(e.to_string()))
            }
        }
    }

    /// Wait `base_delay * 2^attempt`, then resubmit a recorded quote once.
    pub async fn retry_quote(
        &self,
        id: &str,
        request: &QuoteRequest,
        attempt: u32,
    ) -> Result<String, EngineError> {
        tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
        self.resubmit(id, request).await
    }

    async fn resubmit(&self, id: &str, request: &QuoteRequest) -> Result<String, EngineError> {
        let quote = self
            .state
            .with(|s| s.quotes.get(id).cloned())?
            .ok_or_else(|| EngineError::UnknownQuote(id.to_string()))?;

        let remote_id = self
            .store
            .submit(&quote, request)
            .await
            .map_err(|e| EngineError::DispatchFailure(e.to_string()))?;
        self.state
            .with(|s| s.quotes.set_remote_id(id, remote_id.clone()))?;
        Ok(remote_id)
    }

    /// Post a chat entry. A failed post is queued for backoff retries.
    pub async fn post_message(&self, message: ChatMessage) -> Result<(), EngineError> {
        match self.chat.post(&message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(cargo_id = %message.cargo_id, error = %e, "Chat post failed, queued for retry");
                if !self.cancel.is_cancelled() {
                    self.enqueue(RetryQueueEntry::new(
                        message.id.to_string(),
                        RetryPayload::Message(message),
                    ))?;
                }
                Err(EngineError::DispatchFailure(e.to_string()))
            }
        }
    }

    /// Stop the pending retries for `id`. Returns whether anything was queued.
    pub fn cancel_retry(&self, id: &str) -> Result<bool, EngineError> {
        let cancelled = self.state.with(|s| s.retry_queue.cancel(id))?;
        if cancelled.is_some() {
            info!(id, "Retry cancelled");
        }
        Ok(cancelled.is_some())
    }

    pub fn pending_retries(&self) -> Result<Vec<RetryQueueEntry>, EngineError> {
        self.state.with(|s| s.retry_queue.entries())
    }

    /// Cancel every retry timer and wait for the retry tasks to stop.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        match self.state.with(|s| s.retry_queue.cancel_all()) {
            Ok(dropped) if dropped > 0 => info!(dropped, "Pending retries cancelled"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Could not clear retry queue"),
        }
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn enqueue(&self, entry: RetryQueueEntry) -> Result<(), EngineError> {
        let timer = self.cancel.child_token();
        self.state
            .with(|s| s.retry_queue.push(entry.clone(), timer.clone()))?;

        let dispatcher = self.clone();
        self.tracker
            .spawn(async move { dispatcher.run_retries(entry, timer).await });
        Ok(())
    }

    async fn run_retries(&self, entry: RetryQueueEntry, timer: CancellationToken) {
        let id = entry.id.clone();
        let mut attempt = entry.retry_count;

        while self.policy.should_retry(attempt) {
            let delay = self.policy.delay_for_attempt(attempt);
            debug!(id = %id, attempt, delay_ms = delay.as_millis() as u64, "Retry scheduled");

            let result = tokio::select! {
                _ = timer.cancelled() => {
                    debug!(id = %id, "Retry timer cancelled");
                    return;
                }
                result = self.attempt(&id, &entry.payload, attempt) => result,
            };
            attempt += 1;

            match result {
                Ok(()) => {
                    self.finish(&id);
                    info!(id = %id, attempts = attempt, "Retry delivered");
                    let _ = self.events.send(DispatchEvent::Delivered {
                        id,
                        kind: entry.kind,
                        attempts: attempt,
                    });
                    return;
                }
                Err(e) => {
                    warn!(id = %id, attempt, error = %e, "Retry failed");
                    if let Err(e) = self.state.with(|s| s.retry_queue.record_failure(&id)) {
                        error!(id = %id, error = %e, "Could not record retry failure");
                    }
                }
            }
        }

        self.drop_exhausted(&id, entry.kind);
        let err = EngineError::RetryExhausted {
            id: id.clone(),
            attempts: attempt,
        };
        error!(id = %id, kind = ?entry.kind, error = %err, "Retries exhausted");
        let _ = self.events.send(DispatchEvent::RetryExhausted {
            id,
            kind: entry.kind,
            attempts: attempt,
        });
    }

    async fn attempt(
        &self,
        id: &str,
        payload: &RetryPayload,
        attempt: u32,
    ) -> Result<(), EngineError> {
        match payload {
            RetryPayload::Quote(request) => self.retry_quote(id, request, attempt).await.map(|_| ()),
            RetryPayload::Message(message) => {
                tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                self.chat
                    .post(message)
                    .await
                    .map_err(|e| EngineError::DispatchFailure(e.to_string()))
            }
        }
    }

    /// Forget an entry whose retries ran out, along with the quote it carried.
    fn drop_exhausted(&self, id: &str, kind: RetryKind) {
        let dropped = self.state.with(|s| {
            s.retry_queue.remove(id);
            match kind {
                RetryKind::Quote => s.quotes.remove(id).is_some(),
                RetryKind::Message => false,
            }
        });
        match dropped {
            Ok(true) => info!(id, "Undelivered quote dropped"),
            Ok(false) => {}
            Err(e) => error!(id, error = %e, "Could not drop exhausted entry"),
        }
    }

    fn finish(&self, id: &str) {
        if let Err(e) = self.state.with(|s| s.retry_queue.remove(id)) {
            error!(id, error = %e, "Could not drop retry entry");
        }
    }
}
