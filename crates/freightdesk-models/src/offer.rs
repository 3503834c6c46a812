use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A point on the map in decimal degrees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A cargo listing published on the marketplace. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CargoOffer {
    /// Marketplace cargo id. Quotes and suggestions refer back to it.
    pub id: String,
    pub pickup: Coordinates,
    pub delivery: Coordinates,
    pub weight_kg: Decimal,
    #[serde(default)]
    pub urgency: Urgency,
    pub cargo_type: String,
    /// Price posted by the shipper, in EUR.
    pub price: Decimal,
    pub posted_at: DateTime<Utc>,
}
