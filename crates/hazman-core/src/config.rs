use crate::locale::Locale;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR_NAME: &str = "hazman";
const CONFIG_FILE_NAME: &str = "config.toml";
const STORE_FILE_NAME: &str = "last_location.json";
const CURRENT_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_LOCATION_NAME: &str = "Jerusalem";
pub const DEFAULT_LATITUDE: f64 = 31.7683;
pub const DEFAULT_LONGITUDE: f64 = 35.2137;
pub const MAX_PRE_SUNSET_MINUTES: u32 = 60;
pub const MAX_HORIZON_DAYS: u32 = 400;

/// Result returned by [`load_config`], capturing the source and any non-fatal issues.
#[derive(Debug, Clone)]
pub struct ConfigLoadResult {
    pub config: FileConfig,
    pub warnings: Vec<String>,
    pub source: ConfigSource,
}

/// Indicates where the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// No persisted configuration was found or usable; defaults were synthesized.
    Default,
    /// Configuration was read from `config.toml`.
    File,
}

/// Errors that can occur when persisting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML serialization error: {0}")]
    Ser(#[from] toml::ser::Error),
}

/// Disk-backed configuration schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "FileConfig::schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub location: LocationPreferences,
    #[serde(default)]
    pub calendar: CalendarPreferences,
    #[serde(default)]
    pub services: ServiceEndpoints,
    #[serde(default)]
    pub ui: UiPreferences,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            location: LocationPreferences::default(),
            calendar: CalendarPreferences::default(),
            services: ServiceEndpoints::default(),
            ui: UiPreferences::default(),
        }
    }
}

impl FileConfig {
    const fn schema_version() -> u32 {
        CURRENT_SCHEMA_VERSION
    }
}

/// Where to look when no position is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPreferences {
    #[serde(default = "LocationPreferences::default_name")]
    pub default_name: String,
    #[serde(default = "LocationPreferences::default_latitude")]
    pub default_latitude: f64,
    #[serde(default = "LocationPreferences::default_longitude")]
    pub default_longitude: f64,
    /// Persist the last GPS fix or search result for the next run.
    #[serde(default = "LocationPreferences::default_remember_last")]
    pub remember_last: bool,
    /// Overrides the location store file; `~` is expanded.
    #[serde(default)]
    pub store_path: Option<String>,
}

impl Default for LocationPreferences {
    fn default() -> Self {
        Self {
            default_name: Self::default_name(),
            default_latitude: DEFAULT_LATITUDE,
            default_longitude: DEFAULT_LONGITUDE,
            remember_last: true,
            store_path: None,
        }
    }
}

impl LocationPreferences {
    fn default_name() -> String {
        DEFAULT_LOCATION_NAME.to_string()
    }

    const fn default_latitude() -> f64 {
        DEFAULT_LATITUDE
    }

    const fn default_longitude() -> f64 {
        DEFAULT_LONGITUDE
    }

    const fn default_remember_last() -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarPreferences {
    /// Minutes before sunset at which the next day (and Shabbat) begins.
    #[serde(default)]
    pub pre_sunset_minutes: u32,
    /// How many days of events to request.
    #[serde(default = "CalendarPreferences::default_horizon_days")]
    pub horizon_days: u32,
    /// Request the Israeli holiday and Torah reading schedule.
    #[serde(default = "CalendarPreferences::default_israel_schedule")]
    pub israel_schedule: bool,
    #[serde(default = "CalendarPreferences::default_transliterate_books")]
    pub transliterate_books: bool,
    /// Pause between a countdown reaching zero and the full refresh.
    #[serde(default = "CalendarPreferences::default_refresh_delay_secs")]
    pub refresh_delay_secs: u64,
}

impl Default for CalendarPreferences {
    fn default() -> Self {
        Self {
            pre_sunset_minutes: 0,
            horizon_days: Self::default_horizon_days(),
            israel_schedule: true,
            transliterate_books: true,
            refresh_delay_secs: Self::default_refresh_delay_secs(),
        }
    }
}

impl CalendarPreferences {
    const fn default_horizon_days() -> u32 {
        180
    }

    const fn default_israel_schedule() -> bool {
        true
    }

    const fn default_transliterate_books() -> bool {
        true
    }

    const fn default_refresh_delay_secs() -> u64 {
        3
    }

    pub fn pre_sunset(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.pre_sunset_minutes))
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_secs(self.refresh_delay_secs)
    }
}

/// Base URLs and HTTP settings for the upstream services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    #[serde(default = "ServiceEndpoints::default_hebcal_url")]
    pub hebcal_url: String,
    #[serde(default = "ServiceEndpoints::default_nominatim_url")]
    pub nominatim_url: String,
    #[serde(default = "ServiceEndpoints::default_bigdatacloud_url")]
    pub bigdatacloud_url: String,
    #[serde(default = "ServiceEndpoints::default_user_agent")]
    pub user_agent: String,
    #[serde(default = "ServiceEndpoints::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "ServiceEndpoints::default_geolocation_timeout_secs")]
    pub geolocation_timeout_secs: u64,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            hebcal_url: Self::default_hebcal_url(),
            nominatim_url: Self::default_nominatim_url(),
            bigdatacloud_url: Self::default_bigdatacloud_url(),
            user_agent: Self::default_user_agent(),
            timeout_secs: Self::default_timeout_secs(),
            geolocation_timeout_secs: Self::default_geolocation_timeout_secs(),
        }
    }
}

impl ServiceEndpoints {
    fn default_hebcal_url() -> String {
        "https://www.hebcal.com".to_string()
    }

    fn default_nominatim_url() -> String {
        "https://nominatim.openstreetmap.org".to_string()
    }

    fn default_bigdatacloud_url() -> String {
        "https://api.bigdatacloud.net".to_string()
    }

    fn default_user_agent() -> String {
        format!("hazman/{}", env!("CARGO_PKG_VERSION"))
    }

    const fn default_timeout_secs() -> u64 {
        10
    }

    const fn default_geolocation_timeout_secs() -> u64 {
        10
    }

    /// Points every service at one base URL (used with local mock servers).
    pub fn all_at(base: &str) -> Self {
        Self {
            hebcal_url: base.to_string(),
            nominatim_url: base.to_string(),
            bigdatacloud_url: base.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UiPreferences {
    #[serde(default)]
    pub locale: Locale,
}

/// Represents overrides sourced from runtime inputs (CLI flags, environment).
#[derive(Debug, Default, Clone)]
pub struct RuntimeOverrides {
    pub locale: Option<Locale>,
    pub pre_sunset_minutes: Option<u32>,
    pub hebcal_url: Option<String>,
    pub nominatim_url: Option<String>,
    pub bigdatacloud_url: Option<String>,
}

impl RuntimeOverrides {
    pub fn is_empty(&self) -> bool {
        self.locale.is_none()
            && self.pre_sunset_minutes.is_none()
            && self.hebcal_url.is_none()
            && self.nominatim_url.is_none()
            && self.bigdatacloud_url.is_none()
    }

    /// Fields from `other` win over the ones already set.
    pub fn merge(mut self, other: RuntimeOverrides) -> Self {
        self.locale = other.locale.or(self.locale);
        self.pre_sunset_minutes = other.pre_sunset_minutes.or(self.pre_sunset_minutes);
        self.hebcal_url = other.hebcal_url.or(self.hebcal_url);
        self.nominatim_url = other.nominatim_url.or(self.nominatim_url);
        self.bigdatacloud_url = other.bigdatacloud_url.or(self.bigdatacloud_url);
        self
    }
}

/// Overrides read from `HAZMAN_*` environment variables.
pub fn overrides_from_env() -> (RuntimeOverrides, Vec<String>) {
    let mut warnings = Vec::new();
    let mut overrides = RuntimeOverrides {
        hebcal_url: non_empty_env("HAZMAN_HEBCAL_URL"),
        nominatim_url: non_empty_env("HAZMAN_NOMINATIM_URL"),
        bigdatacloud_url: non_empty_env("HAZMAN_BIGDATACLOUD_URL"),
        ..RuntimeOverrides::default()
    };

    if let Some(raw) = non_empty_env("HAZMAN_LOCALE") {
        match raw.parse::<Locale>() {
            Ok(locale) => overrides.locale = Some(locale),
            Err(err) => warnings.push(format!("Ignoring HAZMAN_LOCALE: {err}")),
        }
    }
    if let Some(raw) = non_empty_env("HAZMAN_PRE_SUNSET_MINUTES") {
        match raw.trim().parse::<u32>() {
            Ok(minutes) => overrides.pre_sunset_minutes = Some(minutes),
            Err(err) => warnings.push(format!(
                "Ignoring HAZMAN_PRE_SUNSET_MINUTES '{raw}': {err}"
            )),
        }
    }

    (overrides, warnings)
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn apply_runtime_overrides(
    config: &mut FileConfig,
    overrides: &RuntimeOverrides,
    warnings: &mut Vec<String>,
) {
    if let Some(locale) = overrides.locale {
        config.ui.locale = locale;
    }
    if let Some(minutes) = overrides.pre_sunset_minutes {
        if minutes > MAX_PRE_SUNSET_MINUTES {
            warnings.push(format!(
                "Pre-sunset offset of {minutes} minutes exceeds {MAX_PRE_SUNSET_MINUTES}. Using {MAX_PRE_SUNSET_MINUTES}."
            ));
            config.calendar.pre_sunset_minutes = MAX_PRE_SUNSET_MINUTES;
        } else {
            config.calendar.pre_sunset_minutes = minutes;
        }
    }
    if let Some(url) = overrides.hebcal_url.as_ref() {
        config.services.hebcal_url = url.clone();
    }
    if let Some(url) = overrides.nominatim_url.as_ref() {
        config.services.nominatim_url = url.clone();
    }
    if let Some(url) = overrides.bigdatacloud_url.as_ref() {
        config.services.bigdatacloud_url = url.clone();
    }
}

/// Path to the configuration directory.
pub fn config_directory() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Path to `config.toml`.
pub fn config_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Path of the last-known location file.
pub fn store_path(config: &FileConfig) -> PathBuf {
    match config.location.store_path.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        _ => config_directory().join(STORE_FILE_NAME),
    }
}

/// Load the configuration, falling back to defaults.
pub fn load_config() -> ConfigLoadResult {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> ConfigLoadResult {
    let mut warnings = Vec::new();

    if path.exists() {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<FileConfig>(&raw) {
                Ok(cfg) => {
                    let (cfg, mut sanitize_warnings) = sanitize_config(cfg);
                    warnings.append(&mut sanitize_warnings);
                    return ConfigLoadResult {
                        config: cfg,
                        warnings,
                        source: ConfigSource::File,
                    };
                }
                Err(err) => {
                    warnings.push(format!(
                        "Failed to parse {} as TOML: {}. Falling back to defaults.",
                        path.display(),
                        err
                    ));
                }
            },
            Err(err) => {
                warnings.push(format!(
                    "Failed to read {}: {}. Falling back to defaults.",
                    path.display(),
                    err
                ));
            }
        }
    }

    ConfigLoadResult {
        config: FileConfig::default(),
        warnings,
        source: ConfigSource::Default,
    }
}

/// Persist the configuration to disk.
pub fn save_config(config: &FileConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &FileConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

fn sanitize_config(mut config: FileConfig) -> (FileConfig, Vec<String>) {
    let mut warnings = Vec::new();

    if config.schema_version != CURRENT_SCHEMA_VERSION {
        warnings.push(format!(
            "Unknown config schema version {}. Resetting to {}.",
            config.schema_version, CURRENT_SCHEMA_VERSION
        ));
        return (FileConfig::default(), warnings);
    }

    let location = &mut config.location;
    if !(-90.0..=90.0).contains(&location.default_latitude)
        || !(-180.0..=180.0).contains(&location.default_longitude)
    {
        warnings.push(format!(
            "Default coordinates ({}, {}) are out of range. Resetting to {}.",
            location.default_latitude, location.default_longitude, DEFAULT_LOCATION_NAME
        ));
        *location = LocationPreferences {
            remember_last: location.remember_last,
            store_path: location.store_path.take(),
            ..LocationPreferences::default()
        };
    }
    if location.default_name.trim().is_empty() {
        location.default_name = DEFAULT_LOCATION_NAME.to_string();
    }

    let calendar = &mut config.calendar;
    if calendar.pre_sunset_minutes > MAX_PRE_SUNSET_MINUTES {
        warnings.push(format!(
            "pre_sunset_minutes ({}) exceeds {}. Clamping.",
            calendar.pre_sunset_minutes, MAX_PRE_SUNSET_MINUTES
        ));
        calendar.pre_sunset_minutes = MAX_PRE_SUNSET_MINUTES;
    }
    if calendar.horizon_days == 0 || calendar.horizon_days > MAX_HORIZON_DAYS {
        warnings.push(format!(
            "horizon_days ({}) must be between 1 and {}. Resetting to {}.",
            calendar.horizon_days,
            MAX_HORIZON_DAYS,
            CalendarPreferences::default_horizon_days()
        ));
        calendar.horizon_days = CalendarPreferences::default_horizon_days();
    }
    if calendar.refresh_delay_secs == 0 {
        warnings.push("refresh_delay_secs must be at least 1. Resetting to 3.".to_string());
        calendar.refresh_delay_secs = CalendarPreferences::default_refresh_delay_secs();
    }

    let services = &mut config.services;
    let defaults = ServiceEndpoints::default();
    for (name, value, default) in [
        ("hebcal_url", &mut services.hebcal_url, &defaults.hebcal_url),
        (
            "nominatim_url",
            &mut services.nominatim_url,
            &defaults.nominatim_url,
        ),
        (
            "bigdatacloud_url",
            &mut services.bigdatacloud_url,
            &defaults.bigdatacloud_url,
        ),
    ] {
        if value.trim().is_empty() {
            warnings.push(format!("{name} is empty. Using {default}."));
            *value = default.clone();
        } else {
            *value = value.trim().trim_end_matches('/').to_string();
        }
    }
    if services.timeout_secs == 0 {
        warnings.push("timeout_secs must be at least 1. Resetting to 10.".to_string());
        services.timeout_secs = defaults.timeout_secs;
    }
    if services.geolocation_timeout_secs == 0 {
        services.geolocation_timeout_secs = defaults.geolocation_timeout_secs;
    }
    if services.user_agent.trim().is_empty() {
        services.user_agent = defaults.user_agent;
    }

    (config, warnings)
}
