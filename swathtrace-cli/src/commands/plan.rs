//! Tile planning command.

use console::style;
use swathtrace::config::ConfigFile;
use swathtrace::pipeline::plan_survey;
use swathtrace::planner::{save_plan, PlanStats, TileDescriptor};

use super::common::load_track;
use crate::error::CliError;

/// Plan tiles for the sunlit track and save the plan.
pub fn run(config: &ConfigFile) -> Result<(), CliError> {
    let tiles = plan(config)?;
    let path = config.paths.plan_file();
    save_plan(&path, &tiles)?;
    print_stats(&tiles, config.imagery.resolution_m);
    println!("Plan saved to {}", path.display());
    Ok(())
}

/// Plan tiles for the sunlit track without saving.
pub fn plan(config: &ConfigFile) -> Result<Vec<TileDescriptor>, CliError> {
    let points = load_track(config)?;
    let sunlit = points.iter().filter(|p| p.sunlit).count();
    println!("  Sunlit: {}", sunlit);
    println!("{}", style("Planning tiles...").bold());
    Ok(plan_survey(
        &points,
        config.imagery.swath_width_m,
        config.pipeline.points_per_area,
        &config.planner_config(),
    )?)
}

pub fn print_stats(tiles: &[TileDescriptor], resolution_m: f64) {
    let stats = PlanStats::of(tiles, resolution_m);
    println!("  Tiles:        {}", stats.tiles);
    println!("  Pixels:       {}", stats.total_pixels);
    println!("  Largest tile: {}x{} px", stats.max_width_px, stats.max_height_px);
}
