//! Bounded-wait geolocation.
//!
//! [`GeoLocator`] wraps a [`GeoProvider`] so that neither the position fix
//! nor reverse geocoding can stall a capture: each call is limited by a
//! timeout and callers get an explicit fallback (no coordinates, or a
//! coordinate string instead of an address).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LocationConfig;
use crate::error::{GeocodeError, LocationError};
use crate::models::Coordinates;
use crate::traits::GeoProvider;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const LABEL_LAT_PREFIX: &str = "lat:";

/// Formats coordinates as `lat:X, lng:Y` with four decimals.
pub fn coordinate_label(coordinates: Coordinates) -> String {
    format!(
        "{}{:.4}, lng:{:.4}",
        LABEL_LAT_PREFIX, coordinates.latitude, coordinates.longitude
    )
}

/// Whether `label` is just a [`coordinate_label`] rather than an address.
pub fn is_coordinate_label(label: &str) -> bool {
    let label = label.trim();
    let Some(rest) = label.strip_prefix(LABEL_LAT_PREFIX) else {
        return false;
    };
    let Some((lat, lng)) = rest.split_once(", lng:") else {
        return false;
    };
    lat.trim().parse::<f64>().is_ok() && lng.trim().parse::<f64>().is_ok()
}

#[derive(Clone)]
pub struct GeoLocator {
    provider: Arc<dyn GeoProvider>,
    locate_timeout: Duration,
    geocode_timeout: Duration,
}

impl GeoLocator {
    pub fn new(provider: Arc<dyn GeoProvider>) -> Self {
        Self {
            provider,
            locate_timeout: DEFAULT_TIMEOUT,
            geocode_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(provider: Arc<dyn GeoProvider>, config: &LocationConfig) -> Self {
        Self::new(provider).with_timeouts(
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.geocode_timeout_secs),
        )
    }

    pub fn with_timeouts(mut self, locate: Duration, geocode: Duration) -> Self {
        self.locate_timeout = locate;
        self.geocode_timeout = geocode;
        self
    }

    pub async fn locate(&self) -> Result<Coordinates, LocationError> {
        match tokio::time::timeout(self.locate_timeout, self.provider.current_coordinates()).await
        {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout(self.locate_timeout)),
        }
    }

    /// Like [`locate`](Self::locate) but absorbs the failure.
    pub async fn locate_or_none(&self) -> Option<Coordinates> {
        match self.locate().await {
            Ok(coordinates) => Some(coordinates),
            Err(e) => {
                tracing::warn!(error = %e, "continuing without coordinates");
                None
            }
        }
    }

    pub async fn reverse_geocode(&self, coordinates: Coordinates) -> Result<String, GeocodeError> {
        match tokio::time::timeout(
            self.geocode_timeout,
            self.provider.reverse_geocode(coordinates),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GeocodeError::Timeout(self.geocode_timeout)),
        }
    }

    /// Address for `coordinates`, or the coordinate string when geocoding
    /// fails or returns nothing.
    pub async fn label_for(&self, coordinates: Coordinates) -> String {
        match self.reverse_geocode(coordinates).await {
            Ok(address) if !address.trim().is_empty() => address.trim().to_string(),
            Ok(_) => coordinate_label(coordinates),
            Err(e) => {
                tracing::warn!(error = %e, "using coordinates as location label");
                coordinate_label(coordinates)
            }
        }
    }
}

/// Provider reporting a fixed position, for devices (and the CLI) without
/// a live fix. It has no geocoder, so labels fall back to coordinates.
pub struct FixedLocation {
    coordinates: Option<Coordinates>,
}

impl FixedLocation {
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl GeoProvider for FixedLocation {
    async fn current_coordinates(&self) -> Result<Coordinates, LocationError> {
        self.coordinates
            .ok_or_else(|| LocationError::Unavailable("no fixed position configured".to_string()))
    }

    async fn reverse_geocode(&self, _coordinates: Coordinates) -> Result<String, GeocodeError> {
        Err(GeocodeError::Failed("no geocoder configured".to_string()))
    }
}
