//! Tile staging command.

use console::style;
use swathtrace::cache::TileCache;
use swathtrace::config::ConfigFile;
use swathtrace::pipeline::{stage_tiles, SurveySummary};
use swathtrace::planner::{load_plan, save_plan, TileDescriptor};
use swathtrace::resolver::TileResolver;

use super::common::{build_provider, progress_bar};
use super::plan;
use crate::error::CliError;

/// Stage every planned tile into the tile cache.
pub fn run(config: &ConfigFile, replan: bool) -> Result<(), CliError> {
    let plan_path = config.paths.plan_file();
    let tiles = if !replan && plan_path.exists() {
        println!("Using saved plan: {}", plan_path.display());
        load_plan(&plan_path)?
    } else {
        let tiles = plan::plan(config)?;
        save_plan(&plan_path, &tiles)?;
        tiles
    };
    plan::print_stats(&tiles, config.imagery.resolution_m);

    let cache = TileCache::open(&config.paths.tile_dir)?;
    let summary = stage(config, cache, &tiles)?;
    print_summary(&summary);
    Ok(())
}

/// Resolve `tiles` into `cache` with a progress bar.
pub fn stage(config: &ConfigFile, cache: TileCache, tiles: &[TileDescriptor]) -> Result<SurveySummary, CliError> {
    let provider = build_provider(config)?;
    println!("{} into {}", style("Staging tiles").bold(), cache.dir().display());
    let mut resolver = TileResolver::new(provider, cache, config.resolver_config());

    let bar = progress_bar(tiles.len() as u64, "tiles");
    let result = stage_tiles(tiles, &mut resolver, |done| bar.set_position(done as u64));
    bar.finish_and_clear();
    println!("  Remote calls: {}", resolver.remote_calls());
    Ok(result?)
}

pub fn print_summary(summary: &SurveySummary) {
    println!("  Cached:          {}", summary.cached);
    println!("  Downloaded:      {}", summary.downloaded);
    println!("  Confirmed empty: {}", summary.confirmed_empty);
    if summary.unavailable > 0 {
        println!(
            "  {} {} (rerun to retry)",
            style("Unavailable:").yellow(),
            summary.unavailable
        );
    }
}
