use freightdesk_models::Coordinates;
use moka::future::Cache;
use rust_decimal::Decimal;
use std::time::Duration;

/// In-memory memo of route distances backed by moka.
///
/// Distance lookups can hit a routing API, so repeated offers on the same
/// lane are answered from here. Entries are evicted after TTL.
pub struct DistanceCache {
    inner: Cache<String, Decimal>,
}

impl DistanceCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cache key for a lane. Coordinates are rounded to 1e-5 degrees (about a metre).
    pub fn route_key(from: &Coordinates, to: &Coordinates) -> String {
        format!(
            "{:.5},{:.5}->{:.5},{:.5}",
            from.lat, from.lng, to.lat, to.lng
        )
    }

    pub async fn get(&self, from: &Coordinates, to: &Coordinates) -> Option<Decimal> {
        self.inner.get(&Self::route_key(from, to)).await
    }

    pub async fn insert(&self, from: &Coordinates, to: &Coordinates, distance_km: Decimal) {
        self.inner
            .insert(Self::route_key(from, to), distance_km)
            .await;
    }

    pub async fn invalidate(&self, from: &Coordinates, to: &Coordinates) {
        self.inner.invalidate(&Self::route_key(from, to)).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
