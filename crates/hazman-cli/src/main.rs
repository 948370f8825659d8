use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use hazman_cli::cli_args::{Cli, Command, ConfigCommand, DashboardArgs, LocationCommand};
use hazman_core::config::{FileConfig, config_path, save_config, store_path};
use hazman_core::dashboard::DashboardSnapshot;
use hazman_core::locale::Text;
use hazman_core::{
    Clock, CoordinateStore, CountdownDisplay, Countdowns, DashboardError, DashboardSession,
    DashboardSettings, FixedPosition, FrameStep, GeolocationProvider, LiveDashboard, Locale,
    LoggingDestination, NoGeolocation, RefreshOutcome, ResolvedLocation, Services, SystemClock,
    apply_runtime_overrides, init_logging, load_config, overrides_from_env, render_dashboard,
    render_error, resolve_startup_location, search_location,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = dispatch(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<(), String> {
    let destination = if cli.dashboard.verbose {
        LoggingDestination::FileAndStderr
    } else {
        LoggingDestination::FileOnly
    };
    if let Err(err) = init_logging(destination) {
        eprintln!("Warning: logging disabled: {err}");
    }

    let load = load_config();
    let mut warnings = load.warnings;
    let file_config = load.config;

    match cli.command {
        Some(Command::Config(cmd)) => {
            reject_dashboard_flags(&cli.dashboard, "configuration")?;
            print_warnings(warnings);
            handle_config_command(cmd, &file_config)
        }
        Some(Command::Location(cmd)) => {
            reject_dashboard_flags(&cli.dashboard, "location")?;
            print_warnings(warnings);
            handle_location_command(cmd, &file_config)
        }
        command => {
            let (env_overrides, mut env_warnings) = overrides_from_env();
            warnings.append(&mut env_warnings);
            let overrides = env_overrides.merge(cli.dashboard.to_runtime_overrides());
            let mut config = file_config;
            apply_runtime_overrides(&mut config, &overrides, &mut warnings);
            print_warnings(warnings);

            match command {
                Some(Command::Watch) => watch(config, &cli.dashboard)
                    .await
                    .map_err(|err| format!("{err:#}")),
                _ => {
                    let app = App::new(config).map_err(|err| err.to_string())?;
                    show_once(&app, &cli.dashboard).await
                }
            }
        }
    }
}

fn reject_dashboard_flags(args: &DashboardArgs, what: &str) -> Result<(), String> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "Dashboard flags cannot be combined with {what} commands."
        ))
    }
}

fn print_warnings(warnings: Vec<String>) {
    for warning in warnings {
        eprintln!("Warning: {warning}");
    }
}

struct App {
    config: FileConfig,
    session: DashboardSession,
    store: CoordinateStore,
    locale: Locale,
}

impl App {
    fn new(config: FileConfig) -> Result<Self, DashboardError> {
        let services = Services::new(config.services.clone())?;
        let session = DashboardSession::new(services, DashboardSettings::from(&config));
        let store = CoordinateStore::new(store_path(&config));
        Ok(Self {
            locale: config.ui.locale,
            config,
            session,
            store,
        })
    }

    fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.config.services.geolocation_timeout_secs)
    }

    /// `--search` first, then the device position chain.
    async fn initial_location(&self, args: &DashboardArgs) -> Result<ResolvedLocation, DashboardError> {
        if let Some(query) = args.search.as_deref() {
            return search_location(
                self.session.services(),
                query,
                &self.store,
                &self.config.location,
            )
            .await;
        }
        let fixed = args
            .coordinates()
            .map_err(DashboardError::Config)?
            .map(FixedPosition);
        Ok(self.locate(fixed.as_ref().map(|p| p as &dyn GeolocationProvider)).await)
    }

    async fn locate(&self, provider: Option<&dyn GeolocationProvider>) -> ResolvedLocation {
        resolve_startup_location(
            provider.unwrap_or(&NoGeolocation),
            self.geolocation_timeout(),
            &self.store,
            &self.config.location,
        )
        .await
    }

    async fn snapshot(&self, location: &ResolvedLocation) -> Result<Option<Box<DashboardSnapshot>>, DashboardError> {
        match self.session.refresh(location.coordinates, Utc::now()).await? {
            RefreshOutcome::Fresh(snapshot) => Ok(Some(snapshot)),
            RefreshOutcome::Superseded { .. } => Ok(None),
        }
    }
}

async fn show_once(app: &App, args: &DashboardArgs) -> Result<(), String> {
    let outcome = async {
        let location = app.initial_location(args).await?;
        let snapshot = app.snapshot(&location).await?;
        Ok::<_, DashboardError>((location, snapshot))
    }
    .await;

    match outcome {
        Ok((location, Some(snapshot))) => {
            let display = CountdownDisplay::at(&snapshot, Utc::now());
            print!("{}", render_dashboard(&snapshot, &location, &display, app.locale));
            Ok(())
        }
        Ok((_, None)) => Ok(()),
        Err(err) => Err(err.user_message(app.locale).to_string()),
    }
}

/// Live dashboard: redraws on every countdown frame and reads commands from stdin.
///
/// An empty line or `gps` re-resolves the position, any other text searches
/// for a city, `q` quits.
async fn watch(config: FileConfig, args: &DashboardArgs) -> anyhow::Result<()> {
    let locale = config.ui.locale;
    let services = Services::new(config.services.clone()).context("failed to build HTTP client")?;
    let session = DashboardSession::new(services, DashboardSettings::from(&config));
    let provider: Arc<dyn GeolocationProvider> =
        match args.coordinates().map_err(anyhow::Error::msg)? {
            Some(coordinates) => Arc::new(FixedPosition(coordinates)),
            None => Arc::new(NoGeolocation),
        };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (tx, mut frames) = mpsc::unbounded_channel();
    let countdowns = Countdowns::new(clock.clone(), tx, config.calendar.refresh_delay());
    let mut live = LiveDashboard::new(session, &config, provider, clock, countdowns);
    info!(delay = ?config.calendar.refresh_delay(), "Starting live dashboard");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let started = match args.search.as_deref() {
        Some(query) => live.search(query).await,
        None => live.relocate().await,
    };
    report(&live, started, locale);

    loop {
        tokio::select! {
            Some(frame) = frames.recv() => {
                match live.on_frame(&frame).await {
                    Ok(FrameStep::Stale) => {}
                    outcome => report(&live, outcome.map(drop), locale),
                }
            }
            line = lines.next_line() => {
                let Some(input) = line.context("failed to read stdin")? else {
                    break;
                };
                let outcome = match input.trim() {
                    "q" | "quit" | "exit" => break,
                    "" | "gps" => live.relocate().await,
                    query => live.search(query).await,
                };
                report(&live, outcome, locale);
            }
        }
    }

    live.clear();
    Ok(())
}

fn report(live: &LiveDashboard, outcome: Result<(), DashboardError>, locale: Locale) {
    match outcome {
        Ok(()) => {
            if let (Some(location), Some(snapshot)) = (live.location(), live.snapshot()) {
                print!(
                    "{CLEAR_SCREEN}{}\n{}\n",
                    render_dashboard(snapshot, location, live.display(), locale),
                    locale.text(Text::RetryHint)
                );
            }
        }
        Err(err) => print!("{CLEAR_SCREEN}{}", render_error(&err, locale)),
    }
}

fn handle_config_command(command: ConfigCommand, config: &FileConfig) -> Result<(), String> {
    match command {
        ConfigCommand::Path => {
            println!("{}", config_path().display());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            let path = config_path();
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists. Use --force to overwrite.",
                    path.display()
                ));
            }
            let to_write = if force { FileConfig::default() } else { config.clone() };
            let path = save_config(&to_write).map_err(|err| err.to_string())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn handle_location_command(command: LocationCommand, config: &FileConfig) -> Result<(), String> {
    let store = CoordinateStore::new(store_path(config));
    match command {
        LocationCommand::Show => {
            match store.load() {
                Some(stored) => {
                    let name = stored.name.as_deref().unwrap_or("-");
                    println!(
                        "{:.4}, {:.4}  {name}  (saved {})",
                        stored.latitude,
                        stored.longitude,
                        stored.saved_at.format("%Y-%m-%d %H:%M UTC")
                    );
                }
                None => println!("No saved location."),
            }
            println!("{}", store.path().display());
            Ok(())
        }
        LocationCommand::Clear => {
            let removed = store.clear().map_err(|err| err.to_string())?;
            if removed {
                println!("Forgot the saved location.");
            } else {
                println!("No saved location.");
            }
            Ok(())
        }
    }
}
