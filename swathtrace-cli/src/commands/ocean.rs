//! Ocean pool ingest command.

use swathtrace::cache::TileCache;
use swathtrace::config::ConfigFile;
use swathtrace::planner::save_plan;

use super::common::plan_ocean;
use super::{plan, survey};
use crate::error::CliError;

/// Download the open-ocean reference area into the ocean tile cache.
///
/// This is the only way the ocean pool grows.
pub fn run(config: &ConfigFile) -> Result<(), CliError> {
    println!("Ocean reference area: {}", config.ocean.bbox);
    let tiles = plan_ocean(config)?;
    save_plan(&config.paths.ocean_plan_file(), &tiles)?;
    plan::print_stats(&tiles, config.imagery.resolution_m);

    let cache = TileCache::open(&config.paths.ocean_dir)?;
    let summary = survey::stage(config, cache.clone(), &tiles)?;
    survey::print_summary(&summary);
    println!("  Pool size:       {}", cache.present_ids()?.len());
    Ok(())
}
