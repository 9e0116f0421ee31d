//! Cache management commands.

use clap::Subcommand;
use swathtrace::cache::TileCache;
use swathtrace::config::ConfigFile;

use super::common::format_bytes;
use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show tile and ocean cache statistics
    Stats,
}

pub fn run(config: &ConfigFile, action: CacheAction) -> Result<(), CliError> {
    match action {
        CacheAction::Stats => {
            print_stats("Tile cache", &TileCache::open(&config.paths.tile_dir)?)?;
            print_stats("Ocean pool", &TileCache::open(&config.paths.ocean_dir)?)
        }
    }
}

fn print_stats(label: &str, cache: &TileCache) -> Result<(), CliError> {
    let stats = cache.stats()?;
    println!("{} ({})", label, cache.dir().display());
    println!("  Tiles:        {}", stats.present);
    println!("  Placeholders: {}", stats.placeholders);
    println!("  Size:         {}", format_bytes(stats.bytes));
    Ok(())
}
