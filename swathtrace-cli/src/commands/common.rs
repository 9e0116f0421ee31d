//! Common types and utilities shared across CLI commands.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use swathtrace::config::{ConfigFile, DEFAULT_LOG_FILE};
use swathtrace::logging::{init_logging as init_library_logging, LoggingGuard};
use swathtrace::planner::{plan_tiles, CoverageArea, TileDescriptor};
use swathtrace::provider::{ReqwestClient, SentinelHubProvider};
use swathtrace::track::{read_track, GroundPoint};

use crate::error::CliError;

/// The provider every remote command uses.
pub type Provider = SentinelHubProvider<ReqwestClient>;

/// Load the configuration file, falling back to defaults if it is missing.
pub fn load_config(path: &Path) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_from(path)?)
}

/// Start file and stderr logging in the configured log directory.
pub fn init_logging(config: &ConfigFile) -> Result<LoggingGuard, CliError> {
    init_library_logging(&config.paths.log_dir, DEFAULT_LOG_FILE)
        .map_err(|e| CliError::LoggingInit(e.to_string()))
}

/// Build the Sentinel Hub provider, requiring credentials up front.
pub fn build_provider(config: &ConfigFile) -> Result<Provider, CliError> {
    let hub = &config.sentinelhub;
    if hub.client_id.is_none() || hub.client_secret.is_none() {
        return Err(CliError::Config(
            "Sentinel Hub credentials are not set. \
             Set client_id and client_secret in [sentinelhub] of config.ini \
             or export SWATHTRACE_CLIENT_ID and SWATHTRACE_CLIENT_SECRET"
                .to_string(),
        ));
    }
    let client = ReqwestClient::with_timeout(hub.timeout_secs)?;
    Ok(SentinelHubProvider::new(client, config.sentinel_hub_config()))
}

/// Read the configured ground track up to the configured horizon.
pub fn load_track(config: &ConfigFile) -> Result<Vec<GroundPoint>, CliError> {
    println!("Reading ground track: {}", config.paths.trace.display());
    let points = read_track(&config.paths.trace, config.pipeline.max_elapsed_s)?;
    println!("  Points: {}", points.len());
    Ok(points)
}

/// Plan the tiles covering the configured ocean reference area.
pub fn plan_ocean(config: &ConfigFile) -> Result<Vec<TileDescriptor>, CliError> {
    let area = CoverageArea::from_bbox(config.ocean.bbox)?;
    Ok(plan_tiles(&area, &config.planner_config())?)
}

/// Progress bar in the CLI's common style.
pub fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("##-"));
    }
    bar.set_message(message);
    bar
}

/// Human readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
