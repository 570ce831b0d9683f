use clap::{Parser, Subcommand};
use location_tracker::source::ChannelLocationSource;
use location_tracker::{
    ConfigError, DataDir, FilterKind, LocationTracker, Platform, TrackerConfig, TrackerError,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot use {0:?} as a {1} filter parameter")]
    Parameter(String, FilterKind),
}

#[derive(Parser)]
#[command(name = "location-tracker")]
#[command(about = "Inspect and configure on-device location tracking state")]
struct Cli {
    /// Directory holding the queue and preferences
    #[arg(long, global = true, default_value = ".location-tracker")]
    data_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a tracker configuration file
    Validate { config: PathBuf },
    /// Cache a tracker configuration in the data directory
    Init { config: PathBuf },
    /// Show tracking flags, filters and queue size
    Status,
    /// List queued samples, oldest first
    Queue {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the device id, optionally replacing it
    DeviceId {
        #[arg(long)]
        reset: bool,
    },
    /// Change upload filters
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },
}

#[derive(Subcommand)]
enum FilterAction {
    Enable { kind: FilterKind },
    Disable { kind: FilterKind },
    /// Set a filter parameter: a duration such as `45s` for time, meters
    /// for distance
    Set { kind: FilterKind, value: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let data_dir = DataDir::new(cli.data_dir);

    let result = match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Init { config } => init(&data_dir, &config).await,
        Commands::Status => status(&data_dir),
        Commands::Queue { limit } => queue(&data_dir, limit),
        Commands::DeviceId { reset } => device_id(&data_dir, reset).await,
        Commands::Filter { action } => filter(&data_dir, action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn platform(data_dir: &DataDir) -> Result<Platform, TrackerError> {
    Ok(Platform::from_data_dir(
        data_dir,
        Arc::new(ChannelLocationSource::new()),
        None,
    )?)
}

fn open_tracker(data_dir: &DataDir) -> Result<LocationTracker, TrackerError> {
    let tracker = LocationTracker::from_preferences(platform(data_dir)?)?;
    apply_log_level(&tracker.config());
    Ok(tracker)
}

fn apply_log_level(config: &TrackerConfig) {
    log::set_max_level(config.log_level.level_filter().min(log::max_level()));
}

fn validate(path: &Path) -> Result<(), CliError> {
    let config = TrackerConfig::from_file(path)?;
    println!("Configuration is valid for tracker {}", config.tracker_name);
    println!(
        "  updates every {}ms (min {}ms, max delay {}ms), {:?}",
        config.frequency, config.min_update_interval, config.latency, config.accuracy
    );
    println!(
        "  background interval {}",
        humantime::format_duration(config.background_interval)
    );
    for filter in &config.location_filters {
        println!("  filter {}: {}", filter.kind(), filter);
    }
    Ok(())
}

async fn init(data_dir: &DataDir, path: &Path) -> Result<(), CliError> {
    let config = TrackerConfig::from_file(path)?;
    apply_log_level(&config);
    let tracker = LocationTracker::new(config, platform(data_dir)?)?;
    println!(
        "Initialized tracker {} in {}",
        tracker.tracker_name(),
        data_dir.root().display()
    );
    println!("Device id: {}", tracker.device_id().await?);
    Ok(())
}

fn status(data_dir: &DataDir) -> Result<(), CliError> {
    let tracker = open_tracker(data_dir)?;
    let queued = tracker.queued_samples()?;

    println!("Tracker: {}", tracker.tracker_name());
    let device_id = tracker.current_device_id()?;
    println!("Device id: {}", device_id.as_deref().unwrap_or("unset"));
    println!("Tracking: {}", tracker.tracking_state()?);
    println!("Queued samples: {}", queued.len());
    match tracker.last_uploaded() {
        Some(last) => println!(
            "Last uploaded: {} ({}, {})",
            last.sample_time().to_rfc3339(),
            last.latitude,
            last.longitude
        ),
        None => println!("Last uploaded: never"),
    }
    for filter in tracker.filters() {
        let state = if tracker.is_filter_enabled(filter.kind()) {
            "enabled"
        } else {
            "disabled"
        };
        println!("  filter {} ({}): {}", filter.kind(), state, filter);
    }
    Ok(())
}

fn queue(data_dir: &DataDir, limit: Option<usize>) -> Result<(), CliError> {
    let tracker = open_tracker(data_dir)?;
    let queued = tracker.queued_samples()?;
    let shown = limit.unwrap_or(queued.len());

    for sample in queued.iter().take(shown) {
        println!(
            "{:>8}  {}  {:>11.6} {:>11.6}  ±{}m",
            sample.id,
            sample.sample_time().to_rfc3339(),
            sample.latitude,
            sample.longitude,
            sample.accuracy
        );
    }
    if queued.len() > shown {
        println!("... {} more", queued.len() - shown);
    }
    Ok(())
}

async fn device_id(data_dir: &DataDir, reset: bool) -> Result<(), CliError> {
    let tracker = open_tracker(data_dir)?;
    if reset {
        tracker.reset_device_id().await?;
    }
    println!("{}", tracker.device_id().await?);
    Ok(())
}

fn filter(data_dir: &DataDir, action: FilterAction) -> Result<(), CliError> {
    let tracker = open_tracker(data_dir)?;
    match action {
        FilterAction::Enable { kind } => tracker.enable_filter(kind)?,
        FilterAction::Disable { kind } => tracker.disable_filter(kind)?,
        FilterAction::Set { kind, value } => {
            let parameter = parse_parameter(kind, &value)
                .ok_or_else(|| CliError::Parameter(value.clone(), kind))?;
            tracker.update_filter_parameter(kind, parameter)?;
        }
    }
    for filter in tracker.filters() {
        println!("{}: {}", filter.kind(), filter);
    }
    Ok(())
}

/// Time accepts a humantime duration or plain milliseconds.
fn parse_parameter(kind: FilterKind, value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(number) = value.parse::<f64>() {
        return Some(number);
    }
    match kind {
        FilterKind::Time => humantime::parse_duration(value)
            .ok()
            .map(|d: Duration| d.as_millis() as f64),
        FilterKind::Distance | FilterKind::Accuracy => None,
    }
}
