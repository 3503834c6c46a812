use freightdesk_models::{
    clamp_margin, AgentConfig, AgentMetrics, CostSettings, Level, LevelFlags, Quote, QuoteSource,
    QuoteStatus,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::EngineError;

/// Effect of one resolved agent quote on the margin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuneOutcome {
    pub accepted: bool,
    pub previous_margin_pct: Decimal,
    pub margin_pct: Decimal,
    pub acceptance_rate: Decimal,
    pub learning_progress: Decimal,
}

/// Level 3: nudges the margin down after acceptances and up after refusals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoTuner {
    pub learning_increment: Decimal,
    pub margin_step: Decimal,
}

impl From<&AgentConfig> for AutoTuner {
    fn from(config: &AgentConfig) -> Self {
        Self {
            learning_increment: config.learning_increment,
            margin_step: config.margin_step,
        }
    }
}

impl Default for AutoTuner {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl AutoTuner {
    /// Fold one resolved quote into the metrics and the margin.
    ///
    /// Returns `Ok(None)` when there is nothing to learn (L3 off, manual
    /// quote). A quote that is not in a terminal status is malformed feedback
    /// and leaves both `metrics` and `settings` untouched.
    pub fn apply(
        &self,
        settings: &mut CostSettings,
        metrics: &mut AgentMetrics,
        quote: &Quote,
        levels: &LevelFlags,
    ) -> Result<Option<TuneOutcome>, EngineError> {
        if !levels.is_enabled(Level::L3) {
            return Ok(None);
        }
        if !quote.status.is_terminal() {
            return Err(EngineError::MalformedFeedback(format!(
                "quote {} is {}, not resolved",
                quote.id, quote.status
            )));
        }
        if quote.source != QuoteSource::Agent {
            debug!(quote_id = %quote.id, "Manual quote resolved, nothing to tune");
            return Ok(None);
        }

        let accepted = quote.status == QuoteStatus::Accepted;
        let success = if accepted { Decimal::ONE } else { Decimal::ZERO };

        metrics.quotes_generated += 1;
        let n = Decimal::from(metrics.quotes_generated);
        metrics.acceptance_rate =
            (metrics.acceptance_rate * (n - Decimal::ONE) + success) / n;
        metrics.learning_progress =
            (metrics.learning_progress + self.learning_increment).min(Decimal::ONE);

        let previous_margin_pct = settings.margin_pct;
        let adjusted = if accepted {
            previous_margin_pct - self.margin_step
        } else {
            previous_margin_pct + self.margin_step
        };
        settings.margin_pct = clamp_margin(adjusted);

        info!(
            quote_id = %quote.id,
            accepted,
            margin_pct = %settings.margin_pct,
            acceptance_rate = %metrics.acceptance_rate.round_dp(3),
            "Margin tuned"
        );

        Ok(Some(TuneOutcome {
            accepted,
            previous_margin_pct,
            margin_pct: settings.margin_pct,
            acceptance_rate: metrics.acceptance_rate,
            learning_progress: metrics.learning_progress,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freightdesk_models::{QuoteRequest, MAX_MARGIN_PCT, MIN_MARGIN_PCT};
    use rust_decimal_macros::dec;

    fn resolved(status: QuoteStatus, source: QuoteSource) -> Quote {
        let mut request = QuoteRequest::agent("cargo-1", dec!(1223), None);
        request.source = source;
        let mut quote = Quote::pending(&request);
        quote.status = status;
        quote
    }

    #[test]
    fn acceptance_lowers_margin() {
        let mut settings = CostSettings::default();
        let mut metrics = AgentMetrics::default();
        let outcome = AutoTuner::default()
            .apply(
                &mut settings,
                &mut metrics,
                &resolved(QuoteStatus::Accepted, QuoteSource::Agent),
                &LevelFlags::default(),
            )
            .unwrap()
            .unwrap();

        assert!(outcome.accepted);
        assert_eq!(settings.margin_pct, dec!(14.5));
        assert_eq!(metrics.quotes_generated, 1);
        assert_eq!(metrics.acceptance_rate, dec!(1));
        assert_eq!(metrics.learning_progress, dec!(0.01));
    }

    #[test]
    fn refusal_raises_margin() {
        let mut settings = CostSettings::default();
        let mut metrics = AgentMetrics::default();
        AutoTuner::default()
            .apply(
                &mut settings,
                &mut metrics,
                &resolved(QuoteStatus::Refused, QuoteSource::Agent),
                &LevelFlags::default(),
            )
            .unwrap();

        assert_eq!(settings.margin_pct, dec!(15.5));
        assert_eq!(metrics.acceptance_rate, dec!(0));
    }

    #[test]
    fn acceptance_rate_is_running_mean() {
        let mut settings = CostSettings::default();
        let mut metrics = AgentMetrics::default();
        let tuner = AutoTuner::default();
        let levels = LevelFlags::default();
        for status in [
            QuoteStatus::Accepted,
            QuoteStatus::Refused,
            QuoteStatus::Accepted,
            QuoteStatus::Accepted,
        ] {
            tuner
                .apply(&mut settings, &mut metrics, &resolved(status, QuoteSource::Agent), &levels)
                .unwrap();
        }
        assert_eq!(metrics.quotes_generated, 4);
        assert_eq!(metrics.acceptance_rate.round_dp(6), dec!(0.75));
        assert_eq!(settings.margin_pct, dec!(14));
        assert_eq!(metrics.learning_progress, dec!(0.04));
    }

    #[test]
    fn margin_stays_in_band() {
        let mut settings = CostSettings::default();
        let mut metrics = AgentMetrics::default();
        let tuner = AutoTuner::default();
        let levels = LevelFlags::default();

        for _ in 0..100 {
            tuner
                .apply(
                    &mut settings,
                    &mut metrics,
                    &resolved(QuoteStatus::Accepted, QuoteSource::Agent),
                    &levels,
                )
                .unwrap();
            assert!(settings.margin_pct >= MIN_MARGIN_PCT);
        }
        assert_eq!(settings.margin_pct, MIN_MARGIN_PCT);

        for _ in 0..100 {
            tuner
                .apply(
                    &mut settings,
                    &mut metrics,
                    &resolved(QuoteStatus::Refused, QuoteSource::Agent),
                    &levels,
                )
                .unwrap();
            assert!(settings.margin_pct <= MAX_MARGIN_PCT);
        }
        assert_eq!(settings.margin_pct, MAX_MARGIN_PCT);
        assert_eq!(metrics.learning_progress, Decimal::ONE);
    }

    #[test]
    fn manual_quotes_are_ignored() {
        let mut settings = CostSettings::default();
        let mut metrics = AgentMetrics::default();
        let outcome = AutoTuner::default()
            .apply(
                &mut settings,
                &mut metrics,
                &resolved(QuoteStatus::Accepted, QuoteSource::Manual),
                &LevelFlags::default(),
            )
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(metrics, AgentMetrics::default());
        assert_eq!(settings.margin_pct, dec!(15));
    }

    #[test]
    fn disabled_level_mutates_nothing() {
        let mut settings = CostSettings::default();
        let mut metrics = AgentMetrics::default();
        let mut levels = LevelFlags::default();
        levels.set(Level::L3, false);
        let outcome = AutoTuner::default()
            .apply(
                &mut settings,
                &mut metrics,
                &resolved(QuoteStatus::Refused, QuoteSource::Agent),
                &levels,
            )
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(metrics, AgentMetrics::default());
        assert_eq!(settings.margin_pct, dec!(15));
    }

    #[test]
    fn unresolved_quote_is_rejected_without_side_effects() {
        let mut settings = CostSettings::default();
        let mut metrics = AgentMetrics {
            quotes_generated: 4,
            acceptance_rate: dec!(0.75),
            ..Default::default()
        };
        let before = metrics.clone();
        let result = AutoTuner::default().apply(
            &mut settings,
            &mut metrics,
            &resolved(QuoteStatus::Countered, QuoteSource::Agent),
            &LevelFlags::default(),
        );
        assert!(matches!(result, Err(EngineError::MalformedFeedback(_))));
        assert_eq!(metrics, before);
    }
}
