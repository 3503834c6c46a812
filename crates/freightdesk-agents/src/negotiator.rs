use std::sync::Arc;

use freightdesk_models::{
    AgentSuggestion, CargoOffer, CostAnalysis, CostSettings, CounterOfferData, Level, LevelFlags,
    SuggestionType,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::costing::{profit_pct, round_price, CostCalculator};
use crate::scorer::score_confidence;

/// Confidence attached to hand-over recommendations once the round budget is spent.
pub const EXHAUSTED_CONFIDENCE: Decimal = dec!(0.3);
/// Confidence attached to accepting a counter that keeps half the margin.
pub const ACCEPT_CONFIDENCE: Decimal = dec!(0.8);

/// Lowest price that still keeps half the target margin, rounded up to whole EUR.
pub fn floor_price(total_cost: Decimal, margin_pct: Decimal) -> Decimal {
    (total_cost * (Decimal::ONE + margin_pct * dec!(0.5) / dec!(100))).ceil()
}

/// Recommendation once `max_counters` rounds are used up: take the counter
/// if it clears the floor, otherwise walk away. Left to a human either way.
pub fn exhausted_recommendation(offer: &CargoOffer, counter: &CounterOfferData) -> AgentSuggestion {
    let clears_floor = counter.counter_price >= counter.min_acceptable;
    let reasoning = if clears_floor {
        format!(
            "{} counter rounds used. Shipper's €{} clears our floor of €{}: consider accepting.",
            counter.current_counters, counter.counter_price, counter.min_acceptable
        )
    } else {
        format!(
            "{} counter rounds used. Shipper's €{} is below our floor of €{}: consider walking away.",
            counter.current_counters, counter.counter_price, counter.min_acceptable
        )
    };
    AgentSuggestion::new(
        &offer.id,
        SuggestionType::Negotiate,
        clears_floor.then_some(counter.counter_price),
        EXHAUSTED_CONFIDENCE,
        reasoning,
    )
}

/// Answer a counter-offer given fresh cost data.
///
/// Accepts when at least half the target margin survives at the counter
/// price. Otherwise splits the difference between the counter and our
/// suggested price, never going below `counter.min_acceptable`.
pub fn evaluate_counter(
    offer: &CargoOffer,
    counter: &CounterOfferData,
    analysis: &CostAnalysis,
    settings: &CostSettings,
    learning_progress: Decimal,
) -> AgentSuggestion {
    let total_cost = analysis.breakdown.total_cost;
    let pct_at_counter = profit_pct(counter.counter_price - total_cost, total_cost);
    let target = settings.margin_pct * dec!(0.5);

    if pct_at_counter >= target {
        return AgentSuggestion::new(
            &offer.id,
            SuggestionType::Negotiate,
            Some(counter.counter_price),
            ACCEPT_CONFIDENCE,
            format!(
                "Accept counter €{}: profit {}% keeps at least half of the {}% target margin.",
                counter.counter_price,
                pct_at_counter.round_dp(1),
                settings.margin_pct.normalize()
            ),
        );
    }

    let midpoint = round_price((counter.counter_price + analysis.suggested_price) / dec!(2));
    let our_counter = midpoint.max(counter.min_acceptable);
    let confidence = score_confidence(
        pct_at_counter,
        analysis.distance_km,
        offer.urgency,
        learning_progress,
    );

    AgentSuggestion::new(
        &offer.id,
        SuggestionType::Counter,
        Some(our_counter),
        confidence,
        format!(
            "Counter at €{our_counter}: shipper's €{} leaves only {}% profit (round {} of {}).",
            counter.counter_price,
            pct_at_counter.round_dp(1),
            counter.current_counters + 1,
            counter.max_counters
        ),
    )
}

/// Level 4: bounded counter-offer negotiation.
pub struct NegotiationAssistant {
    calculator: Arc<CostCalculator>,
}

impl NegotiationAssistant {
    pub fn new(calculator: Arc<CostCalculator>) -> Self {
        Self { calculator }
    }

    /// `None` when L4 is off, or when L1 cannot price the offer and the round
    /// budget is not yet spent.
    pub async fn respond(
        &self,
        offer: &CargoOffer,
        counter: &CounterOfferData,
        settings: &CostSettings,
        levels: &LevelFlags,
        learning_progress: Decimal,
    ) -> Option<AgentSuggestion> {
        if !levels.is_enabled(Level::L4) {
            return None;
        }
        if counter.is_exhausted() {
            debug!(cargo_id = %offer.id, rounds = counter.current_counters, "Counter budget spent");
            return Some(exhausted_recommendation(offer, counter));
        }

        let analysis = self
            .calculator
            .analyze(offer, settings, levels, learning_progress)
            .await?;
        Some(evaluate_counter(offer, counter, &analysis, settings, learning_progress))
    }
}
