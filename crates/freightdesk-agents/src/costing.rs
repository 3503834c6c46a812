use std::sync::Arc;

use freightdesk_models::{CargoOffer, CostAnalysis, CostBreakdown, CostSettings, Level, LevelFlags};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::geo::GeoDistance;
use crate::scorer::score_confidence;

/// Round a price to whole EUR, halves away from zero.
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// `profit / total_cost * 100`. A zero cost base yields 0.
pub fn profit_pct(profit: Decimal, total_cost: Decimal) -> Decimal {
    profit
        .checked_div(total_cost)
        .map(|ratio| ratio * dec!(100))
        .unwrap_or(Decimal::ZERO)
}

/// Pure cost computation for an offer over a known distance.
///
/// Returns `None` when the settings cannot price a haul (non-positive average speed).
pub fn calculate_cost(
    offer: &CargoOffer,
    settings: &CostSettings,
    distance_km: Decimal,
    learning_progress: Decimal,
) -> Option<CostAnalysis> {
    if settings.average_speed_kmh <= Decimal::ZERO {
        return None;
    }

    let estimated_time_hours = distance_km.checked_div(settings.average_speed_kmh)?;
    let fuel_cost = distance_km * settings.cost_per_km;
    let driver_cost = estimated_time_hours * settings.cost_per_hour;
    let fixed_costs = settings.insurance_fee + settings.road_fee;
    let total_cost = fuel_cost + driver_cost + fixed_costs;

    let profit = offer.price - total_cost;
    let profit_pct = profit_pct(profit, total_cost);
    let suggested_price =
        round_price(total_cost * (Decimal::ONE + settings.margin_pct / dec!(100)));
    let confidence = score_confidence(profit_pct, distance_km, offer.urgency, learning_progress);

    Some(CostAnalysis {
        distance_km,
        breakdown: CostBreakdown {
            fuel_cost,
            driver_cost,
            fixed_costs,
            total_cost,
            estimated_time_hours,
        },
        profit,
        profit_pct,
        suggested_price,
        confidence,
    })
}

/// Level 1: turns an offer into economics, fetching the distance from the geo collaborator.
pub struct CostCalculator {
    geo: Arc<dyn GeoDistance>,
}

impl CostCalculator {
    pub fn new(geo: Arc<dyn GeoDistance>) -> Self {
        Self { geo }
    }

    /// `None` means the offer cannot be priced: L1 is off, the distance is
    /// unobtainable, or the settings are unusable.
    pub async fn analyze(
        &self,
        offer: &CargoOffer,
        settings: &CostSettings,
        levels: &LevelFlags,
        learning_progress: Decimal,
    ) -> Option<CostAnalysis> {
        if !levels.is_enabled(Level::L1) {
            debug!(cargo_id = %offer.id, "L1 disabled, not pricing offer");
            return None;
        }

        let distance_km = match self.geo.distance_km(&offer.pickup, &offer.delivery).await {
            Ok(km) => km,
            Err(e) => {
                warn!(cargo_id = %offer.id, error = %e, "Distance unavailable, cannot price offer");
                return None;
            }
        };

        let analysis = calculate_cost(offer, settings, distance_km, learning_progress);
        match &analysis {
            Some(a) => debug!(
                cargo_id = %offer.id,
                distance_km = %a.distance_km,
                total_cost = %a.breakdown.total_cost,
                profit_pct = %a.profit_pct.round_dp(2),
                "Offer priced"
            ),
            None => warn!(
                cargo_id = %offer.id,
                average_speed_kmh = %settings.average_speed_kmh,
                "Cost settings cannot price offer"
            ),
        }
        analysis
    }
}
