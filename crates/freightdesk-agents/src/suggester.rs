use freightdesk_models::{
    AgentConfig, AgentMetrics, AgentSuggestion, CargoOffer, CostAnalysis, Level, LevelFlags,
    SuggestionType,
};
use rust_decimal::Decimal;

/// Bar an L2 quote must clear before it is marked for auto-send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoSendThresholds {
    /// Confidence must be strictly greater.
    pub confidence: Decimal,
    /// Running acceptance rate must be strictly greater.
    pub acceptance_rate: Decimal,
}

impl From<&AgentConfig> for AutoSendThresholds {
    fn from(config: &AgentConfig) -> Self {
        Self {
            confidence: config.auto_send_confidence,
            acceptance_rate: config.auto_send_acceptance_rate,
        }
    }
}

impl Default for AutoSendThresholds {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

/// Level 2: decide whether to skip an offer or quote it.
///
/// Has no side effects. Whether an `auto_send` quote is actually dispatched
/// is decided by the orchestrator.
pub fn suggest_quote(
    offer: &CargoOffer,
    analysis: Option<&CostAnalysis>,
    levels: &LevelFlags,
    metrics: &AgentMetrics,
    thresholds: AutoSendThresholds,
) -> Option<AgentSuggestion> {
    if !levels.is_enabled(Level::L2) {
        return None;
    }
    let analysis = analysis?;

    if analysis.is_loss() {
        let reasoning = format!(
            "Skip: posted price €{} is a {}% loss against total cost €{} over {} km.",
            offer.price.normalize(),
            (-analysis.profit_pct).round_dp(1),
            analysis.breakdown.total_cost.round_dp(2),
            analysis.distance_km.round_dp(0),
        );
        return Some(AgentSuggestion::new(
            &offer.id,
            SuggestionType::Skip,
            None,
            analysis.confidence,
            reasoning,
        ));
    }

    let auto_send = analysis.confidence > thresholds.confidence
        && metrics.acceptance_rate > thresholds.acceptance_rate;

    let verdict = if auto_send {
        "High confidence and a strong acceptance record: auto-send recommended."
    } else {
        "Confirm before sending."
    };
    let reasoning = format!(
        "Quote €{} (cost €{}, posted €{}, profit {}%). {verdict}",
        analysis.suggested_price,
        analysis.breakdown.total_cost.round_dp(2),
        offer.price.normalize(),
        analysis.profit_pct.round_dp(1),
    );

    let mut suggestion = AgentSuggestion::new(
        &offer.id,
        SuggestionType::Quote,
        Some(analysis.suggested_price),
        analysis.confidence,
        reasoning,
    );
    suggestion.auto_send = auto_send;
    Some(suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costing::calculate_cost;
    use crate::test_support::sample_offer;
    use freightdesk_models::{CostSettings, Urgency};
    use rust_decimal_macros::dec;

    fn analysis_for(offer: &CargoOffer) -> CostAnalysis {
        calculate_cost(offer, &CostSettings::default(), dec!(650), Decimal::ZERO).unwrap()
    }

    fn seasoned_metrics(acceptance_rate: Decimal) -> AgentMetrics {
        AgentMetrics {
            acceptance_rate,
            ..Default::default()
        }
    }

    #[test]
    fn loss_is_skipped() {
        let offer = sample_offer("cargo-1", dec!(900));
        let analysis = analysis_for(&offer);
        let s = suggest_quote(
            &offer,
            Some(&analysis),
            &LevelFlags::default(),
            &AgentMetrics::default(),
            AutoSendThresholds::default(),
        )
        .unwrap();

        assert_eq!(s.kind, SuggestionType::Skip);
        assert!(s.price.is_none());
        assert!(s.reasoning.contains("15.3% loss"), "{}", s.reasoning);
        assert!(!s.auto_send);
    }

    #[test]
    fn profitable_offer_is_quoted_at_suggested_price() {
        let offer = sample_offer("cargo-2", dec!(1400));
        let analysis = analysis_for(&offer);
        let s = suggest_quote(
            &offer,
            Some(&analysis),
            &LevelFlags::default(),
            &AgentMetrics::default(),
            AutoSendThresholds::default(),
        )
        .unwrap();

        assert_eq!(s.kind, SuggestionType::Quote);
        assert_eq!(s.price, Some(dec!(1223)));
        assert_eq!(s.confidence, dec!(0.8));
        // 0.8 is not strictly above the threshold.
        assert!(!s.auto_send);
        assert!(s.reasoning.contains("Confirm"));
    }

    #[test]
    fn auto_send_needs_confidence_and_track_record() {
        let mut offer = sample_offer("cargo-3", dec!(1400));
        offer.urgency = Urgency::Urgent;
        let analysis = analysis_for(&offer);
        assert_eq!(analysis.confidence, dec!(0.9));

        let s = suggest_quote(
            &offer,
            Some(&analysis),
            &LevelFlags::default(),
            &seasoned_metrics(dec!(0.75)),
            AutoSendThresholds::default(),
        )
        .unwrap();
        assert!(s.auto_send);
        assert!(s.reasoning.contains("auto-send"));

        let s = suggest_quote(
            &offer,
            Some(&analysis),
            &LevelFlags::default(),
            &seasoned_metrics(dec!(0.6)),
            AutoSendThresholds::default(),
        )
        .unwrap();
        assert!(!s.auto_send);
    }

    #[test]
    fn zero_profit_is_still_quoted() {
        let offer = sample_offer("cargo-4", dec!(1063.125));
        let analysis = analysis_for(&offer);
        let s = suggest_quote(
            &offer,
            Some(&analysis),
            &LevelFlags::default(),
            &AgentMetrics::default(),
            AutoSendThresholds::default(),
        )
        .unwrap();
        assert_eq!(s.kind, SuggestionType::Quote);
    }

    #[test]
    fn disabled_or_unpriced_yields_nothing() {
        let offer = sample_offer("cargo-5", dec!(1400));
        let analysis = analysis_for(&offer);
        let mut levels = LevelFlags::default();
        levels.set(Level::L2, false);

        assert!(suggest_quote(
            &offer,
            Some(&analysis),
            &levels,
            &AgentMetrics::default(),
            AutoSendThresholds::default()
        )
        .is_none());
        assert!(suggest_quote(
            &offer,
            None,
            &LevelFlags::default(),
            &AgentMetrics::default(),
            AutoSendThresholds::default()
        )
        .is_none());
    }
}
