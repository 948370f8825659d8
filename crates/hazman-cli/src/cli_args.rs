use clap::{ArgAction, Args, Parser, Subcommand};
use hazman_core::config::{MAX_PRE_SUNSET_MINUTES, RuntimeOverrides};
use hazman_core::{Coordinates, Locale};

/// Jewish calendar dashboard for your location.
#[derive(Parser, Debug, Clone)]
#[command(name = "hazman", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub dashboard: DashboardArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Keep the dashboard open with live countdowns.
    Watch,
    /// Inspect or forget the saved location.
    #[command(subcommand)]
    Location(LocationCommand),
    /// Configuration file helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum LocationCommand {
    /// Print the saved location.
    Show,
    /// Delete the saved location.
    #[command(alias = "forget")]
    Clear,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    /// Print the path of config.toml.
    Path,
    /// Write a config.toml with the default settings.
    Init {
        /// Overwrite an existing file.
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

/// Options for rendering the dashboard (default command and `watch`).
#[derive(Debug, Clone, Args, Default)]
pub struct DashboardArgs {
    /// Latitude of the position to use instead of the saved one.
    #[arg(long, requires = "lon", allow_negative_numbers = true, value_name = "DEGREES")]
    pub lat: Option<f64>,

    /// Longitude of the position to use instead of the saved one.
    #[arg(long, requires = "lat", allow_negative_numbers = true, value_name = "DEGREES")]
    pub lon: Option<f64>,

    /// Look a city up by name.
    #[arg(short, long, value_name = "CITY", conflicts_with_all = ["lat", "lon"])]
    pub search: Option<String>,

    /// Display language (pt or en).
    #[arg(long, value_name = "LOCALE")]
    pub locale: Option<Locale>,

    /// Start the evening this many minutes before sunset.
    #[arg(
        long = "pre-sunset",
        value_name = "MINUTES",
        value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_PRE_SUNSET_MINUTES))
    )]
    pub pre_sunset: Option<u32>,

    /// Also print logs to stderr.
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

impl DashboardArgs {
    /// Returns true when no dashboard option was given.
    pub fn is_empty(&self) -> bool {
        self.lat.is_none()
            && self.lon.is_none()
            && self.search.is_none()
            && self.locale.is_none()
            && self.pre_sunset.is_none()
    }

    pub fn to_runtime_overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            locale: self.locale,
            pre_sunset_minutes: self.pre_sunset,
            ..RuntimeOverrides::default()
        }
    }

    /// Position given with `--lat/--lon`, validated.
    pub fn coordinates(&self) -> Result<Option<Coordinates>, String> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Coordinates::new(lat, lon)
                .map(Some)
                .map_err(|err| err.to_string()),
            (None, None) => Ok(None),
            _ => Err("--lat and --lon must be given together.".into()),
        }
    }
}
