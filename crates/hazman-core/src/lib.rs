//! Core library for the Or HaZman dashboard: Jewish calendar data for a
//! location, resolved against the local sunset.

pub mod calendar;
pub mod config;
pub mod countdown;
pub mod dashboard;
pub mod error;
pub mod leyning;
pub mod live;
pub mod locale;
pub mod location;
pub mod logging;
pub mod render;
pub mod resolver;
pub mod selector;
pub mod services;

pub use config::{
    ConfigError, ConfigLoadResult, ConfigSource, FileConfig, RuntimeOverrides,
    apply_runtime_overrides, config_directory, config_path, load_config, overrides_from_env,
    save_config, store_path,
};
pub use countdown::{Clock, CountdownFrame, CountdownKind, CountdownTick, Countdowns, SystemClock};
pub use dashboard::{
    DashboardSession, DashboardSettings, DashboardSnapshot, RefreshOutcome, sync_countdowns,
};
pub use error::{DashboardError, ErrorKind, GeolocationError};
pub use live::{FrameStep, LiveDashboard};
pub use locale::Locale;
pub use location::{
    Coordinates, CoordinateStore, FixedPosition, GeolocationProvider, LocationSource,
    NoGeolocation, ResolvedLocation, resolve_startup_location, search_location,
};
pub use logging::{LoggingDestination, init_logging};
pub use render::{CountdownDisplay, render_dashboard, render_error};
pub use resolver::DayReference;
pub use services::Services;
