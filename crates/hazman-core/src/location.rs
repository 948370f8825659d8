//! Where the dashboard is looking: geolocation, search and the saved fallback.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LocationPreferences;
use crate::error::{DashboardError, GeolocationError};
use crate::locale::{Locale, Text};
use crate::services::Services;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DashboardError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(DashboardError::unexpected(format!(
                "coordinates out of range: {latitude}, {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Reverse-geocoded names for a position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
    pub city: Option<String>,
    pub district: Option<String>,
    pub country: Option<String>,
}

impl Place {
    /// `City, District`, or the localized "unknown" placeholder.
    pub fn label(&self, locale: Locale) -> String {
        let city = self
            .city
            .as_deref()
            .unwrap_or_else(|| locale.text(Text::UnknownLocation));
        match self.district.as_deref() {
            Some(district) if district != city => format!("{city}, {district}"),
            _ => city.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub coordinates: Coordinates,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Gps,
    Search,
    Saved,
    Default,
}

impl LocationSource {
    pub fn label(self, locale: Locale) -> &'static str {
        let key = match self {
            LocationSource::Gps => Text::SourceGps,
            LocationSource::Search => Text::SourceSearch,
            LocationSource::Saved => Text::SourceSaved,
            LocationSource::Default => Text::SourceDefault,
        };
        locale.text(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub coordinates: Coordinates,
    pub source: LocationSource,
    pub name: Option<String>,
    /// Why geolocation was not used, when the position came from a fallback.
    pub fallback_reason: Option<GeolocationError>,
}

/// A device position capability.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError>;
}

/// Position supplied up front, e.g. from `--lat/--lon`.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinates);

#[async_trait]
impl GeolocationProvider for FixedPosition {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        Ok(self.0)
    }
}

/// A host without any position source.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeolocation;

#[async_trait]
impl GeolocationProvider for NoGeolocation {
    async fn current_position(&self) -> Result<Coordinates, GeolocationError> {
        Err(GeolocationError::PositionUnavailable)
    }
}

pub async fn locate_with_timeout(
    provider: &dyn GeolocationProvider,
    limit: Duration,
) -> Result<Coordinates, GeolocationError> {
    match tokio::time::timeout(limit, provider.current_position()).await {
        Ok(result) => result,
        Err(_) => Err(GeolocationError::Timeout),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl StoredLocation {
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::new(self.latitude, self.longitude).ok()
    }
}

/// Last-known coordinates kept in a small JSON file.
#[derive(Debug, Clone)]
pub struct CoordinateStore {
    path: PathBuf,
}

impl CoordinateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file counts as "nothing saved".
    pub fn load(&self) -> Option<StoredLocation> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Failed to read saved location");
                return None;
            }
        };
        match serde_json::from_str::<StoredLocation>(&raw) {
            Ok(stored) if stored.coordinates().is_some() => Some(stored),
            Ok(_) => {
                warn!(path = %self.path.display(), "Saved location is out of range");
                None
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Saved location is corrupt");
                None
            }
        }
    }

    pub fn save(&self, coordinates: Coordinates, name: Option<&str>) -> Result<(), DashboardError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredLocation {
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            name: name.map(str::to_string),
            saved_at: Utc::now(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }

    /// Returns `true` when a file was removed.
    pub fn clear(&self) -> Result<bool, DashboardError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

/// Geolocation first, then the saved position, then the configured default.
///
/// Never fails: a missing position degrades to the next source.
pub async fn resolve_startup_location(
    provider: &dyn GeolocationProvider,
    limit: Duration,
    store: &CoordinateStore,
    preferences: &LocationPreferences,
) -> ResolvedLocation {
    let reason = match locate_with_timeout(provider, limit).await {
        Ok(coordinates) => {
            info!(%coordinates, "Using device position");
            if preferences.remember_last {
                remember(store, coordinates, None);
            }
            return ResolvedLocation {
                coordinates,
                source: LocationSource::Gps,
                name: None,
                fallback_reason: None,
            };
        }
        Err(err) => err,
    };
    warn!(reason = %reason, "Geolocation failed, falling back");

    if let Some(stored) = store.load() {
        if let Some(coordinates) = stored.coordinates() {
            info!(%coordinates, "Using saved location");
            return ResolvedLocation {
                coordinates,
                source: LocationSource::Saved,
                name: stored.name,
                fallback_reason: Some(reason),
            };
        }
    }

    let coordinates = Coordinates {
        latitude: preferences.default_latitude,
        longitude: preferences.default_longitude,
    };
    info!(%coordinates, name = %preferences.default_name, "Using default location");
    ResolvedLocation {
        coordinates,
        source: LocationSource::Default,
        name: Some(preferences.default_name.clone()),
        fallback_reason: Some(reason),
    }
}

/// Looks a place up by name and remembers the hit.
pub async fn search_location(
    services: &Services,
    query: &str,
    store: &CoordinateStore,
    preferences: &LocationPreferences,
) -> Result<ResolvedLocation, DashboardError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(DashboardError::EmptyQuery);
    }

    let hit = services
        .search(query)
        .await?
        .ok_or_else(|| DashboardError::NotFound(query.to_string()))?;
    info!(query, coordinates = %hit.coordinates, "Search matched");

    if preferences.remember_last {
        remember(store, hit.coordinates, hit.name.as_deref());
    }
    Ok(ResolvedLocation {
        coordinates: hit.coordinates,
        source: LocationSource::Search,
        name: hit.name,
        fallback_reason: None,
    })
}

fn remember(store: &CoordinateStore, coordinates: Coordinates, name: Option<&str>) {
    if let Err(err) = store.save(coordinates, name) {
        warn!(path = %store.path().display(), error = %err, "Failed to save location");
    }
}
