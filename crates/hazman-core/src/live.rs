//! State behind the live (`watch`) dashboard.
//!
//! [`LiveDashboard`] owns the location, the latest snapshot and the running
//! countdowns. Callers feed it countdown frames and user commands; a
//! `RefreshDue` frame re-resolves the position (unless it came from a search)
//! and refreshes everything.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{FileConfig, LocationPreferences, store_path};
use crate::countdown::{Clock, CountdownFrame, Countdowns};
use crate::dashboard::{DashboardSession, DashboardSnapshot, RefreshOutcome, sync_countdowns};
use crate::error::DashboardError;
use crate::location::{
    CoordinateStore, GeolocationProvider, LocationSource, ResolvedLocation,
    resolve_startup_location, search_location,
};
use crate::render::CountdownDisplay;

/// What a countdown frame did to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    /// The frame belongs to a cancelled or replaced countdown.
    Stale,
    /// Countdown text changed.
    Redraw,
    /// The countdown finished and a full refresh ran.
    Refreshed,
}

pub struct LiveDashboard {
    session: DashboardSession,
    provider: Arc<dyn GeolocationProvider>,
    store: CoordinateStore,
    preferences: LocationPreferences,
    geolocation_timeout: Duration,
    clock: Arc<dyn Clock>,
    countdowns: Countdowns,
    display: CountdownDisplay,
    location: Option<ResolvedLocation>,
    snapshot: Option<Box<DashboardSnapshot>>,
}

impl LiveDashboard {
    pub fn new(
        session: DashboardSession,
        config: &FileConfig,
        provider: Arc<dyn GeolocationProvider>,
        clock: Arc<dyn Clock>,
        countdowns: Countdowns,
    ) -> Self {
        Self {
            session,
            provider,
            store: CoordinateStore::new(store_path(config)),
            preferences: config.location.clone(),
            geolocation_timeout: Duration::from_secs(config.services.geolocation_timeout_secs),
            clock,
            countdowns,
            display: CountdownDisplay::default(),
            location: None,
            snapshot: None,
        }
    }

    pub fn session(&self) -> &DashboardSession {
        &self.session
    }

    pub fn location(&self) -> Option<&ResolvedLocation> {
        self.location.as_ref()
    }

    pub fn snapshot(&self) -> Option<&DashboardSnapshot> {
        self.snapshot.as_deref()
    }

    pub fn display(&self) -> &CountdownDisplay {
        &self.display
    }

    pub fn countdowns(&self) -> &Countdowns {
        &self.countdowns
    }

    /// Resolves the device position (with the saved and default fallbacks) and refreshes.
    pub async fn relocate(&mut self) -> Result<(), DashboardError> {
        let location = resolve_startup_location(
            self.provider.as_ref(),
            self.geolocation_timeout,
            &self.store,
            &self.preferences,
        )
        .await;
        self.show(location).await
    }

    /// Looks a city up and refreshes for it. A failed search clears the dashboard.
    pub async fn search(&mut self, query: &str) -> Result<(), DashboardError> {
        match search_location(self.session.services(), query, &self.store, &self.preferences).await {
            Ok(location) => self.show(location).await,
            Err(err) => {
                warn!(query, error = %err, "Search failed");
                self.clear();
                Err(err)
            }
        }
    }

    pub async fn show(&mut self, location: ResolvedLocation) -> Result<(), DashboardError> {
        self.location = Some(location);
        self.refresh().await
    }

    /// Re-fetches for the current location. Errors cancel every countdown.
    pub async fn refresh(&mut self) -> Result<(), DashboardError> {
        let Some(coordinates) = self.location.as_ref().map(|location| location.coordinates) else {
            return Ok(());
        };
        match self.session.refresh(coordinates, self.clock.now()).await {
            Ok(RefreshOutcome::Fresh(snapshot)) => {
                self.display.clear();
                sync_countdowns(&snapshot, &mut self.countdowns, self.clock.now());
                self.snapshot = Some(snapshot);
                Ok(())
            }
            Ok(RefreshOutcome::Superseded { .. }) => Ok(()),
            Err(err) => {
                warn!(error = %err, "Refresh failed");
                self.clear();
                Err(err)
            }
        }
    }

    pub async fn on_frame(&mut self, frame: &CountdownFrame) -> Result<FrameStep, DashboardError> {
        if !self.countdowns.is_current(frame) {
            return Ok(FrameStep::Stale);
        }
        if !self.display.apply(frame, self.session.settings().locale) {
            return Ok(FrameStep::Redraw);
        }

        info!(kind = ?frame.kind, "Countdown finished; refreshing");
        let searched = self
            .location
            .as_ref()
            .is_some_and(|location| location.source == LocationSource::Search);
        if self.location.is_none() || searched {
            self.refresh().await?;
        } else {
            self.relocate().await?;
        }
        Ok(FrameStep::Refreshed)
    }

    /// Stops every countdown and drops the snapshot.
    pub fn clear(&mut self) {
        self.countdowns.cancel_all();
        self.display.clear();
        self.snapshot = None;
    }
}
