use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-offer cost components. Derived on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostBreakdown {
    pub fuel_cost: Decimal,
    pub driver_cost: Decimal,
    pub fixed_costs: Decimal,
    /// `fuel_cost + driver_cost + fixed_costs`.
    pub total_cost: Decimal,
    pub estimated_time_hours: Decimal,
}

/// Output of the cost calculator for one offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CostAnalysis {
    pub distance_km: Decimal,
    pub breakdown: CostBreakdown,
    /// Posted price minus total cost. Negative means a loss.
    pub profit: Decimal,
    /// `profit / total_cost * 100`.
    pub profit_pct: Decimal,
    /// Total cost marked up by the current margin, rounded to whole EUR.
    pub suggested_price: Decimal,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
}

impl CostAnalysis {
    pub fn is_loss(&self) -> bool {
        self.profit_pct < Decimal::ZERO
    }
}
