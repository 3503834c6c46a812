use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use freightdesk_models::{
    AgentConfig, AgentMetrics, AgentSuggestion, CargoOffer, ChatMessage, CostAnalysis,
    CostSettings, CounterOfferData, FreightdeskConfig, Level, LevelFlags, Quote, QuoteFeedback,
    QuoteRequest, QuoteStatus, RetryQueueEntry, SuggestionType,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::chat::ChatSink;
use crate::costing::CostCalculator;
use crate::dispatch::{DispatchEvent, QuoteDispatcher};
use crate::error::EngineError;
use crate::geo::GeoDistance;
use crate::negotiator::{floor_price, NegotiationAssistant};
use crate::pipeline::{OfferStage, StageTracker};
use crate::quote_store::QuoteStore;
use crate::retry::RetryPolicy;
use crate::state::{EngineState, SharedState};
use crate::suggester::{suggest_quote, AutoSendThresholds};
use crate::sweeper;
use crate::tuner::{AutoTuner, TuneOutcome};

/// What one pipeline pass did with an offer.
#[derive(Debug, Clone, Serialize)]
pub struct OfferReport {
    pub cargo_id: String,
    pub stage: OfferStage,
    pub history: Vec<OfferStage>,
    pub analysis: Option<CostAnalysis>,
    pub suggestion: Option<AgentSuggestion>,
    /// Quote dispatched by auto-send, if any.
    pub quote: Option<Quote>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// What a feedback event changed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackReport {
    pub quote: Quote,
    pub tuning: Option<TuneOutcome>,
    /// L4 answer to a counter-offer.
    pub suggestion: Option<AgentSuggestion>,
    pub negotiation: Option<CounterOfferData>,
    /// Our counter quote, when auto-send dispatched one.
    pub counter_quote: Option<Quote>,
}

enum Claim {
    Disabled,
    Duplicate,
    Claimed {
        settings: CostSettings,
        levels: LevelFlags,
        metrics: AgentMetrics,
    },
}

/// Runs offers through L1 and L2, dispatches auto-sent quotes and folds
/// feedback back into L3 and L4.
pub struct NegotiationEngine {
    config: AgentConfig,
    state: Arc<SharedState>,
    calculator: Arc<CostCalculator>,
    negotiator: NegotiationAssistant,
    tuner: AutoTuner,
    dispatcher: QuoteDispatcher,
    metrics_tx: watch::Sender<AgentMetrics>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    background_started: AtomicBool,
}

impl NegotiationEngine {
    pub fn new(
        config: &FreightdeskConfig,
        geo: Arc<dyn GeoDistance>,
        store: Arc<dyn QuoteStore>,
        chat: Arc<dyn ChatSink>,
    ) -> Self {
        let state = Arc::new(SharedState::new(EngineState::new(config)));
        let calculator = Arc::new(CostCalculator::new(geo));
        let dispatcher = QuoteDispatcher::new(
            state.clone(),
            store,
            chat,
            RetryPolicy::from(&config.dispatch),
        );
        let (metrics_tx, _) = watch::channel(AgentMetrics::default());

        Self {
            config: config.agent.clone(),
            state,
            negotiator: NegotiationAssistant::new(calculator.clone()),
            calculator,
            tuner: AutoTuner::from(&config.agent),
            dispatcher,
            metrics_tx,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            background_started: AtomicBool::new(false),
        }
    }

    /// Run one offer through the pipeline.
    ///
    /// Returns `Ok(None)` when intake (L0) is off or the offer was already
    /// processed. With L2 off the pass ends at `Costed`.
    pub async fn process_offer(
        &self,
        offer: CargoOffer,
    ) -> Result<Option<OfferReport>, EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::ShutDown);
        }
        let start = Instant::now();

        let claim = self.state.with(|s| {
            if !s.levels.is_enabled(Level::L0) {
                return Claim::Disabled;
            }
            if !s.processed.insert(offer.id.clone()) {
                return Claim::Duplicate;
            }
            s.remember_offer(offer.clone());
            Claim::Claimed {
                settings: s.settings.clone(),
                levels: s.levels,
                metrics: s.metrics.clone(),
            }
        })?;

        let (settings, levels, metrics) = match claim {
            Claim::Disabled => {
                debug!(cargo_id = %offer.id, "Intake disabled, offer ignored");
                return Ok(None);
            }
            Claim::Duplicate => {
                debug!(cargo_id = %offer.id, "Offer already processed");
                return Ok(None);
            }
            Claim::Claimed {
                settings,
                levels,
                metrics,
            } => (settings, levels, metrics),
        };

        info!(cargo_id = %offer.id, price = %offer.price, "Processing offer");
        let mut stages = StageTracker::default();
        let mut report = OfferReport {
            cargo_id: offer.id.clone(),
            stage: OfferStage::Pending,
            history: Vec::new(),
            analysis: None,
            suggestion: None,
            quote: None,
            error: None,
            elapsed_ms: 0,
        };

        let analysis = self
            .calculator
            .analyze(&offer, &settings, &levels, metrics.learning_progress)
            .await;

        match &analysis {
            None => {
                stages.advance(OfferStage::Unpriced);
                warn!(cargo_id = %offer.id, "Offer could not be priced");
            }
            Some(_) => {
                stages.advance(OfferStage::Costed);
            }
        }

        let suggestion = suggest_quote(
            &offer,
            analysis.as_ref(),
            &levels,
            &metrics,
            AutoSendThresholds::from(&self.config),
        );

        if let Some(suggestion) = &suggestion {
            let next = match suggestion.kind {
                SuggestionType::Skip => OfferStage::Skipped,
                _ => OfferStage::Suggested,
            };
            stages.advance(next);
            self.post_chat(&offer.id, &suggestion.reasoning).await;
        }

        if let (Some(suggestion), Some(analysis)) = (&suggestion, &analysis) {
            if self.config.auto_send && suggestion.auto_send {
                if let Some(price) = suggestion.price {
                    let request = QuoteRequest::agent(&offer.id, price, None);
                    match self.dispatcher.send_quote(request).await {
                        Ok(quote) => {
                            stages.advance(OfferStage::Dispatched);
                            self.post_chat(
                                &offer.id,
                                &format!(
                                    "Auto-sent quote: €{}. Profit: {}%.",
                                    price,
                                    analysis.profit_pct.round_dp(1)
                                ),
                            )
                            .await;
                            report.quote = Some(quote);
                        }
                        Err(e) => {
                            stages.advance(OfferStage::DispatchFailed);
                            warn!(cargo_id = %offer.id, error = %e, "Auto-send failed");
                            report.error = Some(e.to_string());
                        }
                    }
                }
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.state.with(|s| {
            if let Some(suggestion) = &suggestion {
                s.suggestions.push(suggestion.clone());
            }
            s.metrics.record_processed(elapsed_ms);
        })?;

        info!(
            cargo_id = %offer.id,
            stage = %stages.stage(),
            elapsed_ms,
            "Offer processed"
        );

        report.stage = stages.stage();
        report.history = stages.history().to_vec();
        report.analysis = analysis;
        report.suggestion = suggestion;
        report.elapsed_ms = elapsed_ms;
        Ok(Some(report))
    }

    /// Process an offer on a tracked task that stops on shutdown.
    pub fn spawn_offer(
        self: &Arc<Self>,
        offer: CargoOffer,
    ) -> JoinHandle<Result<Option<OfferReport>, EngineError>> {
        let engine = Arc::clone(self);
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(EngineError::ShutDown),
                result = engine.process_offer(offer) => result,
            }
        })
    }

    /// Manual quote dispatch, subject to the same validation, rate limit and retries.
    pub async fn send_quote(&self, request: QuoteRequest) -> Result<Quote, EngineError> {
        self.dispatcher.send_quote(request).await
    }

    /// Apply a status change reported for one of our quotes.
    ///
    /// Resolved agent quotes feed the margin tuner and close the cargo's
    /// negotiation thread. A counter opens or advances the thread. A rejected
    /// event changes nothing and comes back as the error.
    pub async fn handle_feedback(
        &self,
        feedback: QuoteFeedback,
    ) -> Result<FeedbackReport, EngineError> {
        match self.apply_feedback(&feedback).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(
                    quote_id = %feedback.quote_id,
                    status = %feedback.status,
                    error = %e,
                    "Feedback rejected"
                );
                Err(e)
            }
        }
    }

    async fn apply_feedback(&self, feedback: &QuoteFeedback) -> Result<FeedbackReport, EngineError> {
        let (quote, tuning) = self.state.with(|s| {
            let quote =
                s.quotes
                    .apply_status(&feedback.quote_id, feedback.status, feedback.counter_price)?;
            let mut tuning = None;
            if quote.status.is_terminal() {
                if s.negotiations.remove(&quote.cargo_id).is_some() {
                    debug!(cargo_id = %quote.cargo_id, "Negotiation closed");
                }
                tuning = self
                    .tuner
                    .apply(&mut s.settings, &mut s.metrics, &quote, &s.levels)?;
            }
            Ok::<_, EngineError>((quote, tuning))
        })??;

        info!(
            quote_id = %quote.id,
            cargo_id = %quote.cargo_id,
            status = %quote.status,
            "Feedback applied"
        );

        let mut report = FeedbackReport {
            quote,
            tuning,
            suggestion: None,
            negotiation: None,
            counter_quote: None,
        };
        if report.quote.status == QuoteStatus::Countered {
            self.negotiate(&mut report).await?;
        }
        Ok(report)
    }

    async fn negotiate(&self, report: &mut FeedbackReport) -> Result<(), EngineError> {
        let quote = &report.quote;
        let Some(counter_price) = quote.counter_price else {
            return Ok(());
        };
        let (offer, existing, settings, levels, learning) = self.state.with(|s| {
            (
                s.offer(&quote.cargo_id).cloned(),
                s.negotiations.get(&quote.cargo_id).cloned(),
                s.settings.clone(),
                s.levels,
                s.metrics.learning_progress,
            )
        })?;

        if !levels.is_enabled(Level::L4) {
            return Ok(());
        }
        let Some(offer) = offer else {
            warn!(cargo_id = %quote.cargo_id, "Counter on an offer never processed, cannot negotiate");
            return Ok(());
        };

        let mut counter = match existing {
            Some(mut thread) => {
                thread.counter_price = counter_price;
                thread
            }
            None => {
                let Some(analysis) = self
                    .calculator
                    .analyze(&offer, &settings, &levels, learning)
                    .await
                else {
                    warn!(cargo_id = %offer.id, "Cannot price countered offer");
                    return Ok(());
                };
                let floor = floor_price(analysis.breakdown.total_cost, settings.margin_pct);
                debug!(cargo_id = %offer.id, floor = %floor, "Negotiation opened");
                CounterOfferData::new(quote.price, counter_price, floor, self.config.max_counters)
            }
        };

        let suggestion = self
            .negotiator
            .respond(&offer, &counter, &settings, &levels, learning)
            .await;
        let proposed = suggestion
            .as_ref()
            .filter(|s| s.kind == SuggestionType::Counter)
            .and_then(|s| s.price);

        // With auto-send on, a round is spent only once our counter reaches the shipper.
        if let Some(price) = proposed {
            if self.config.auto_send {
                let request = QuoteRequest::agent(&offer.id, price, None);
                match self.dispatcher.send_quote(request).await {
                    Ok(quote) => {
                        report.counter_quote = Some(quote);
                        counter.current_counters += 1;
                    }
                    Err(e) => warn!(
                        cargo_id = %offer.id,
                        error = %e,
                        round = counter.current_counters + 1,
                        "Counter quote not sent, round not spent"
                    ),
                }
            } else {
                counter.current_counters += 1;
            }
        }

        self.state.with(|s| {
            s.negotiations.insert(offer.id.clone(), counter.clone());
            if let Some(suggestion) = &suggestion {
                s.suggestions.push(suggestion.clone());
            }
        })?;

        if let Some(s) = &suggestion {
            info!(
                cargo_id = %offer.id,
                kind = ?s.kind,
                price = ?s.price,
                confidence = %s.confidence,
                round = counter.current_counters,
                "Counter-offer answered"
            );
            self.post_chat(&offer.id, &s.reasoning).await;
        }

        report.suggestion = suggestion;
        report.negotiation = Some(counter);
        Ok(())
    }

    async fn post_chat(&self, cargo_id: &str, text: &str) {
        let message = ChatMessage::agent(cargo_id, text);
        if let Err(e) = self.dispatcher.post_message(message).await {
            debug!(cargo_id, error = %e, "Chat entry deferred");
        }
    }

    pub fn settings(&self) -> Result<CostSettings, EngineError> {
        self.state.with(|s| s.settings.clone())
    }

    pub fn levels(&self) -> Result<LevelFlags, EngineError> {
        self.state.with(|s| s.levels)
    }

    pub fn metrics(&self) -> Result<AgentMetrics, EngineError> {
        self.state.with(|s| s.metrics.clone())
    }

    /// Buffered suggestions, oldest first.
    pub fn suggestions(&self) -> Result<Vec<AgentSuggestion>, EngineError> {
        self.state.with(|s| s.suggestions.to_vec())
    }

    /// Look up a quote by local or storage-assigned id.
    pub fn quote(&self, id: &str) -> Result<Option<Quote>, EngineError> {
        self.state.with(|s| s.quotes.get(id).cloned())
    }

    pub fn quotes(&self) -> Result<Vec<Quote>, EngineError> {
        self.state.with(|s| s.quotes.all())
    }

    pub fn quotes_for(&self, cargo_id: &str) -> Result<Vec<Quote>, EngineError> {
        self.state.with(|s| s.quotes.by_cargo(cargo_id))
    }

    /// Load quotes recorded by an earlier run so feedback can refer to them.
    /// Quotes already known are left as they are.
    pub fn restore_quotes(&self, quotes: Vec<Quote>) -> Result<usize, EngineError> {
        let restored = self.state.with(|s| {
            let mut restored = 0;
            for quote in quotes {
                if s.quotes.get(&quote.id).is_none() {
                    s.quotes.insert(quote);
                    restored += 1;
                }
            }
            restored
        })?;
        if restored > 0 {
            info!(restored, "Open quotes restored");
        }
        Ok(restored)
    }

    pub fn negotiation(&self, cargo_id: &str) -> Result<Option<CounterOfferData>, EngineError> {
        self.state.with(|s| s.negotiations.get(cargo_id).cloned())
    }

    pub fn retry_queue(&self) -> Result<Vec<RetryQueueEntry>, EngineError> {
        self.dispatcher.pending_retries()
    }

    pub fn cancel_retry(&self, id: &str) -> Result<bool, EngineError> {
        self.dispatcher.cancel_retry(id)
    }

    /// Replace the cost settings. The margin is clamped to its bounds.
    pub fn update_settings(&self, settings: CostSettings) -> Result<CostSettings, EngineError> {
        let settings = settings.normalized();
        self.state.with(|s| s.settings = settings.clone())?;
        info!(margin_pct = %settings.margin_pct, "Cost settings updated");
        Ok(settings)
    }

    pub fn update_levels(&self, levels: LevelFlags) -> Result<(), EngineError> {
        self.state.with(|s| s.levels = levels)?;
        info!(?levels, "Levels updated");
        Ok(())
    }

    /// Metrics snapshots, refreshed by the background metrics loop.
    pub fn subscribe_metrics(&self) -> watch::Receiver<AgentMetrics> {
        self.metrics_tx.subscribe()
    }

    /// Outcomes of queued retries.
    pub fn subscribe_dispatch(&self) -> broadcast::Receiver<DispatchEvent> {
        self.dispatcher.subscribe()
    }

    /// Start the metrics publisher and the suggestion sweep. Later calls do nothing.
    pub fn start_background(&self) {
        if self.background_started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.tracker.spawn(sweeper::metrics_loop(
            self.state.clone(),
            self.metrics_tx.clone(),
            Duration::from_secs(self.config.metrics_interval_seconds),
            self.cancel.child_token(),
        ));
        self.tracker.spawn(sweeper::suggestion_sweep_loop(
            self.state.clone(),
            chrono::Duration::seconds(self.config.suggestion_ttl_seconds as i64),
            Duration::from_secs(self.config.sweep_interval_seconds),
            self.cancel.child_token(),
        ));
        info!("Background loops started");
    }

    /// Stop background loops, in-flight offer tasks and every retry timer.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.dispatcher.shutdown().await;
        info!("Negotiation engine stopped");
    }

    pub fn margin_pct(&self) -> Result<Decimal, EngineError> {
        self.state.with(|s| s.settings.margin_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        sample_offer, FailingDistance, FixedDistance, RecordingChatSink, ScriptedQuoteStore,
    };
    use freightdesk_models::QuoteSource;
    use rust_decimal_macros::dec;

    fn engine_with(
        config: FreightdeskConfig,
        geo: Arc<dyn GeoDistance>,
    ) -> (NegotiationEngine, Arc<ScriptedQuoteStore>, Arc<RecordingChatSink>) {
        let store = Arc::new(ScriptedQuoteStore::succeeding());
        let chat = Arc::new(RecordingChatSink::default());
        let engine = NegotiationEngine::new(&config, geo, store.clone(), chat.clone());
        (engine, store, chat)
    }

    fn engine() -> (NegotiationEngine, Arc<ScriptedQuoteStore>, Arc<RecordingChatSink>) {
        engine_with(
            FreightdeskConfig::default(),
            Arc::new(FixedDistance(dec!(650))),
        )
    }

    #[tokio::test]
    async fn profitable_offer_is_suggested_not_sent() {
        let (engine, store, _) = engine();
        let report = engine
            .process_offer(sample_offer("cargo-1", dec!(1400)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.stage, OfferStage::Suggested);
        assert_eq!(
            report.history,
            vec![OfferStage::Pending, OfferStage::Costed]
        );
        let suggestion = report.suggestion.unwrap();
        assert_eq!(suggestion.kind, SuggestionType::Quote);
        assert_eq!(suggestion.price, Some(dec!(1223)));
        assert!(report.quote.is_none());
        assert_eq!(store.calls(), 0);
        assert_eq!(engine.metrics().unwrap().total_processed, 1);
        assert_eq!(engine.suggestions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn intake_disabled_ignores_offers() {
        let (engine, _, _) = engine();
        let mut levels = LevelFlags::default();
        levels.set(Level::L0, false);
        engine.update_levels(levels).unwrap();

        assert!(engine
            .process_offer(sample_offer("cargo-1", dec!(1400)))
            .await
            .unwrap()
            .is_none());
        assert_eq!(engine.metrics().unwrap().total_processed, 0);

        // Not claimed while intake was off.
        engine.update_levels(LevelFlags::default()).unwrap();
        assert!(engine
            .process_offer(sample_offer("cargo-1", dec!(1400)))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn unpriced_offer_ends_without_suggestion() {
        let (engine, _, _) = engine_with(FreightdeskConfig::default(), Arc::new(FailingDistance));
        let report = engine
            .process_offer(sample_offer("cargo-1", dec!(1400)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.stage, OfferStage::Unpriced);
        assert!(report.suggestion.is_none());
        assert!(engine.suggestions().unwrap().is_empty());
        assert_eq!(engine.metrics().unwrap().total_processed, 1);
    }

    #[tokio::test]
    async fn l2_off_stops_at_costed() {
        let (engine, _, _) = engine();
        let mut levels = LevelFlags::default();
        levels.set(Level::L2, false);
        engine.update_levels(levels).unwrap();

        let report = engine
            .process_offer(sample_offer("cargo-1", dec!(1400)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.stage, OfferStage::Costed);
        assert!(report.analysis.is_some());
        assert!(report.suggestion.is_none());
    }

    #[tokio::test]
    async fn update_settings_clamps_margin() {
        let (engine, _, _) = engine();
        let settings = CostSettings {
            margin_pct: dec!(2),
            ..CostSettings::default()
        };
        assert_eq!(engine.update_settings(settings).unwrap().margin_pct, dec!(5));
        assert_eq!(engine.margin_pct().unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn manual_quote_feedback_does_not_tune() {
        let (engine, _, _) = engine();
        let quote = engine
            .send_quote(QuoteRequest::manual("cargo-1", dec!(990)))
            .await
            .unwrap();
        assert_eq!(quote.source, QuoteSource::Manual);

        let report = engine
            .handle_feedback(QuoteFeedback {
                quote_id: quote.id.clone(),
                status: QuoteStatus::Accepted,
                counter_price: None,
            })
            .await
            .unwrap();
        assert!(report.tuning.is_none());
        assert_eq!(engine.metrics().unwrap().quotes_generated, 0);
        assert_eq!(engine.margin_pct().unwrap(), dec!(15));
    }

    #[tokio::test]
    async fn restored_quotes_accept_feedback() {
        let (engine, _, _) = engine();
        let quote = Quote::pending(&QuoteRequest::agent("cargo-9", dec!(1223), None));
        assert_eq!(engine.restore_quotes(vec![quote.clone()]).unwrap(), 1);
        assert_eq!(engine.restore_quotes(vec![quote.clone()]).unwrap(), 0);

        let report = engine
            .handle_feedback(QuoteFeedback {
                quote_id: quote.id.clone(),
                status: QuoteStatus::Refused,
                counter_price: None,
            })
            .await
            .unwrap();
        assert!(!report.tuning.unwrap().accepted);
        assert_eq!(engine.margin_pct().unwrap(), dec!(15.5));
    }

    #[tokio::test]
    async fn feedback_for_unknown_quote_is_an_error() {
        let (engine, _, _) = engine();
        let err = engine
            .handle_feedback(QuoteFeedback {
                quote_id: "nope".to_string(),
                status: QuoteStatus::Accepted,
                counter_price: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownQuote(_)));
    }

    #[tokio::test]
    async fn shutdown_refuses_new_work() {
        let (engine, _, _) = engine();
        engine.start_background();
        engine.shutdown().await;
        assert!(matches!(
            engine.process_offer(sample_offer("cargo-1", dec!(1400))).await,
            Err(EngineError::ShutDown)
        ));
    }
}
