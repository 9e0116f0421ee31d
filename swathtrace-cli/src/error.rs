//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use swathtrace::cache::CacheError;
use swathtrace::compositor::CompositorError;
use swathtrace::config::ConfigFileError;
use swathtrace::pipeline::PipelineError;
use swathtrace::planner::PlanError;
use swathtrace::provider::ProviderError;
use swathtrace::resolver::ResolveError;
use swathtrace::synth::SynthError;
use swathtrace::track::TrackError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Could not read the ground track
    Track(TrackError),
    /// Tile planning failed
    Plan(PlanError),
    /// Provider client could not be created
    Provider(ProviderError),
    /// Staging tiles failed
    Resolve(ResolveError),
    /// Night raster or ocean pool could not be loaded
    Synth(SynthError),
    /// Compositor could not be created
    Compositor(CompositorError),
    /// Trace run stopped
    Pipeline(PipelineError),
    /// Cache or output store error
    Cache(CacheError),
    /// Failed to read an input image
    ImageRead { path: PathBuf, reason: String },
    /// Some outputs failed verification
    VerifyFailed(usize),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Provider(ProviderError::Auth(_))
            | CliError::Resolve(ResolveError::Provider(ProviderError::Auth(_))) => {
                eprintln!();
                eprintln!("Check the Sentinel Hub credentials:");
                eprintln!("  1. Set client_id and client_secret in [sentinelhub] of config.ini");
                eprintln!("  2. Or export SWATHTRACE_CLIENT_ID and SWATHTRACE_CLIENT_SECRET");
            }
            CliError::Synth(SynthError::NoOceanTiles) => {
                eprintln!();
                eprintln!("The ocean tile pool is empty. Run 'swathtrace ocean' first.");
            }
            CliError::Synth(SynthError::Raster(_)) => {
                eprintln!();
                eprintln!("The night raster is missing or unreadable.");
                eprintln!("Import one with 'swathtrace night --m10 <tif> --m11 <tif> --cloud-mask <tif>'.");
            }
            CliError::Pipeline(_) => {
                eprintln!();
                eprintln!("Everything written so far is kept. Rerun the same command to resume.");
            }
            CliError::VerifyFailed(_) => {
                eprintln!();
                eprintln!("Rerun with --delete to remove broken outputs, then rerun 'swathtrace trace'.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Track(e) => write!(f, "Failed to read ground track: {}", e),
            CliError::Plan(e) => write!(f, "Tile planning failed: {}", e),
            CliError::Provider(e) => write!(f, "Provider error: {}", e),
            CliError::Resolve(e) => write!(f, "Tile staging failed: {}", e),
            CliError::Synth(e) => write!(f, "Failed to load synthetic sources: {}", e),
            CliError::Compositor(e) => write!(f, "Compositor error: {}", e),
            CliError::Pipeline(e) => write!(f, "Trace stopped: {}", e),
            CliError::Cache(e) => write!(f, "Cache error: {}", e),
            CliError::ImageRead { path, reason } => {
                write!(f, "Failed to read image '{}': {}", path.display(), reason)
            }
            CliError::VerifyFailed(count) => write!(f, "{} output(s) failed verification", count),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Track(e) => Some(e),
            CliError::Plan(e) => Some(e),
            CliError::Provider(e) => Some(e),
            CliError::Resolve(e) => Some(e),
            CliError::Synth(e) => Some(e),
            CliError::Compositor(e) => Some(e),
            CliError::Pipeline(e) => Some(e),
            CliError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<TrackError> for CliError {
    fn from(e: TrackError) -> Self {
        CliError::Track(e)
    }
}

impl From<PlanError> for CliError {
    fn from(e: PlanError) -> Self {
        CliError::Plan(e)
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        CliError::Provider(e)
    }
}

impl From<ResolveError> for CliError {
    fn from(e: ResolveError) -> Self {
        CliError::Resolve(e)
    }
}

impl From<SynthError> for CliError {
    fn from(e: SynthError) -> Self {
        CliError::Synth(e)
    }
}

impl From<CompositorError> for CliError {
    fn from(e: CompositorError) -> Self {
        CliError::Compositor(e)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        CliError::Pipeline(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}
