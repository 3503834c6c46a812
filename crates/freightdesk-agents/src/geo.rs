use std::time::Duration;

use async_trait::async_trait;
use freightdesk_models::Coordinates;
use freightdesk_store::DistanceCache;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::GeoError;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Source of road distances between two points. Mockable for testing.
#[async_trait]
pub trait GeoDistance: Send + Sync {
    async fn distance_km(&self, from: &Coordinates, to: &Coordinates) -> Result<Decimal, GeoError>;
}

/// Great-circle distance, rounded to metres.
pub struct Haversine;

impl Haversine {
    pub fn distance(from: &Coordinates, to: &Coordinates) -> Result<Decimal, GeoError> {
        for point in [from, to] {
            if !point.lat.is_finite()
                || !point.lng.is_finite()
                || point.lat.abs() > 90.0
                || point.lng.abs() > 180.0
            {
                return Err(GeoError::InvalidCoordinates(format!(
                    "({}, {})",
                    point.lat, point.lng
                )));
            }
        }

        let d_lat = (to.lat - from.lat).to_radians();
        let d_lng = (to.lng - from.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        let km = EARTH_RADIUS_KM * c;

        Decimal::from_f64(km)
            .map(|d| d.round_dp(3))
            .ok_or_else(|| GeoError::Lookup(format!("distance not representable: {km}")))
    }
}

#[async_trait]
impl GeoDistance for Haversine {
    async fn distance_km(&self, from: &Coordinates, to: &Coordinates) -> Result<Decimal, GeoError> {
        Self::distance(from, to)
    }
}

/// Read-through memo in front of another distance source.
pub struct CachedGeoDistance<G> {
    inner: G,
    cache: DistanceCache,
}

impl<G: GeoDistance> CachedGeoDistance<G> {
    pub fn new(inner: G, max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner,
            cache: DistanceCache::new(max_capacity, ttl),
        }
    }

    pub fn cached_routes(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl<G: GeoDistance> GeoDistance for CachedGeoDistance<G> {
    async fn distance_km(&self, from: &Coordinates, to: &Coordinates) -> Result<Decimal, GeoError> {
        if let Some(km) = self.cache.get(from, to).await {
            return Ok(km);
        }

        let km = self.inner.distance_km(from, to).await?;
        debug!(distance_km = %km, "Caching route distance");
        self.cache.insert(from, to, km).await;
        Ok(km)
    }
}
