//! Periodic background loops run by the engine until cancelled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use freightdesk_models::AgentMetrics;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::state::SharedState;

/// Prune expired rate-limit entries and publish a metrics snapshot every `interval`.
pub async fn metrics_loop(
    state: Arc<SharedState>,
    publisher: watch::Sender<AgentMetrics>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Metrics loop shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                publish_metrics(&state, &publisher);
            }
        }
    }
}

/// One metrics tick.
pub fn publish_metrics(state: &SharedState, publisher: &watch::Sender<AgentMetrics>) {
    match state.with(|s| (s.rate_limiter.prune(), s.metrics.clone())) {
        Ok((pruned, metrics)) => {
            debug!(
                pruned,
                total_processed = metrics.total_processed,
                acceptance_rate = %metrics.acceptance_rate.round_dp(3),
                "Metrics published"
            );
            publisher.send_replace(metrics);
        }
        Err(e) => error!(error = %e, "Metrics tick failed"),
    }
}

/// Drop suggestions and offers older than `ttl` every `interval`.
pub async fn suggestion_sweep_loop(
    state: Arc<SharedState>,
    ttl: chrono::Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Suggestion sweep shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                sweep_suggestions(&state, ttl);
            }
        }
    }
}

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Swept {
    pub suggestions: usize,
    pub offers: usize,
}

/// Expire old suggestions, and old offers that no open negotiation still needs.
pub fn sweep_suggestions(state: &SharedState, ttl: chrono::Duration) -> Swept {
    let now = Utc::now();
    let result = state.with(|s| Swept {
        suggestions: s.suggestions.expire(ttl, now),
        offers: s.prune_offers(ttl, now),
    });
    match result {
        Ok(swept) => {
            if swept != Swept::default() {
                info!(
                    suggestions = swept.suggestions,
                    offers = swept.offers,
                    "Expired entries swept"
                );
            }
            swept
        }
        Err(e) => {
            error!(error = %e, "Suggestion sweep failed");
            Swept::default()
        }
    }
}
