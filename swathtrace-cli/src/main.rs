//! SwathTrace CLI - Command-line interface
//!
//! Plans, stages and synthesizes satellite capture traces using the
//! swathtrace library.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::trace::ModeArg;
use error::CliError;

#[derive(Parser)]
#[command(name = "swathtrace")]
#[command(version = swathtrace::VERSION)]
#[command(about = "Synthesize satellite swath image traces along a ground track", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.swathtrace/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file if none exists
    Init,
    /// Plan provider-legal tiles for the sunlit part of the ground track
    Plan,
    /// Download every planned tile into the tile cache
    Survey {
        /// Plan again even if a saved plan exists
        #[arg(long)]
        replan: bool,
    },
    /// Composite one image per emitted ground-track sample
    Trace {
        /// Read tiles from the staged cache or resolve them per footprint
        #[arg(long, value_enum, default_value = "staged")]
        mode: ModeArg,
    },
    /// Ingest the open-ocean reference tile pool
    Ocean,
    /// Build the night raster from radiance and cloud mask TIFFs
    Night {
        /// 16-bit radiance TIFF for band index 10
        #[arg(long)]
        m10: PathBuf,
        /// 16-bit radiance TIFF for band index 11
        #[arg(long)]
        m11: PathBuf,
        /// 8-bit cloud mask TIFF
        #[arg(long)]
        cloud_mask: PathBuf,
    },
    /// Check that every output listed in the trace log decodes
    Verify {
        /// Delete outputs that fail so the next trace regenerates them
        #[arg(long)]
        delete: bool,
    },
    /// Tile cache management
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli
        .config
        .unwrap_or_else(swathtrace::config::config_file_path);

    if let Commands::Init = cli.command {
        return commands::init::run(&config_path);
    }

    let config = commands::common::load_config(&config_path)?;
    let _logging = commands::common::init_logging(&config)?;
    tracing::info!(version = swathtrace::VERSION, config = %config_path.display(), "SwathTrace starting");

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Plan => commands::plan::run(&config),
        Commands::Survey { replan } => commands::survey::run(&config, replan),
        Commands::Trace { mode } => commands::trace::run(&config, mode.into()),
        Commands::Ocean => commands::ocean::run(&config),
        Commands::Night {
            m10,
            m11,
            cloud_mask,
        } => commands::night::run(&config, &m10, &m11, &cloud_mask),
        Commands::Verify { delete } => commands::verify::run(&config, delete),
        Commands::Cache { action } => commands::cache::run(&config, action),
    }
}
