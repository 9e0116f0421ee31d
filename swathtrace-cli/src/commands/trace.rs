//! Trace compositing command.

use std::sync::Arc;

use clap::ValueEnum;
use console::style;
use swathtrace::cache::{OutputStore, TileCache, TraceLog};
use swathtrace::compositor::{SwathCompositor, TraceMode};
use swathtrace::config::ConfigFile;
use swathtrace::pipeline::{run_trace, TraceSummary};
use swathtrace::resolver::TileResolver;
use swathtrace::synth::{NightImageSynthesizer, OceanTileSynthesizer};
use tracing::info;

use super::common::{build_provider, load_track, progress_bar, Provider};
use crate::error::CliError;

/// Where sunlit footprints get their tiles from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Tiles already staged by `survey`; no network access
    Staged,
    /// Resolve and download tiles per footprint
    OnDemand,
}

impl From<ModeArg> for TraceMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Staged => TraceMode::Staged,
            ModeArg::OnDemand => TraceMode::OnDemand,
        }
    }
}

pub fn run(config: &ConfigFile, mode: TraceMode) -> Result<(), CliError> {
    let points = load_track(config)?;

    println!("Loading night raster: {}", config.paths.night_raster.display());
    let night = NightImageSynthesizer::load(
        &config.paths.night_raster,
        config.imagery.night_resolution_m,
        config.imagery.resolution_m,
        config.pipeline.night_offset,
    )?;
    let ocean_cache = TileCache::open(&config.paths.ocean_dir)?;
    let ocean = OceanTileSynthesizer::from_cache(&ocean_cache, config.pipeline.ocean_selection)?;
    println!("  Ocean pool: {} tiles", ocean.pool_size());

    let mut compositor: SwathCompositor<Provider> = match mode {
        TraceMode::Staged => SwathCompositor::staged(
            TileCache::open(&config.paths.tile_dir)?,
            night,
            ocean,
            config.compositor_config(),
        )?,
        TraceMode::OnDemand => {
            let resolver = TileResolver::new(
                build_provider(config)?,
                TileCache::open(&config.paths.tile_dir)?,
                config.resolver_config(),
            );
            SwathCompositor::on_demand(resolver, night, ocean, config.compositor_config())
        }
    };

    let store = Arc::new(OutputStore::open(&config.paths.output_dir, config.pipeline.output_format)?);
    let mut trace_log = TraceLog::create(&config.paths.trace_log)?;

    println!(
        "{} ({} mode, {} output)",
        style("Compositing trace").bold(),
        mode,
        store.format()
    );
    info!(points = points.len(), mode = %mode, "Starting trace");

    let bar = progress_bar(points.len() as u64, "points");
    let result = run_trace(
        &points,
        &mut compositor,
        Arc::clone(&store),
        &mut trace_log,
        config.trace_options(),
        |done| bar.set_position(done as u64),
    );
    bar.finish_and_clear();

    let summary = result?;
    print_summary(&summary);
    println!("Images: {}", store.dir().display());
    println!("Trace log: {}", config.paths.trace_log.display());
    Ok(())
}

fn print_summary(summary: &TraceSummary) {
    println!("  Emitted:      {}", summary.emitted());
    println!("  Skipped:      {}", summary.skipped);
    println!("  Existing:     {}", summary.existing);
    println!("  Night:        {}", summary.night);
    println!("  Ocean:        {}", summary.ocean);
    println!("  Stitched:     {}", summary.stitched);
    println!("  Written:      {}", summary.written);
    println!("  Remote calls: {}", summary.remote_calls);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_arg_maps_to_trace_mode() {
        assert_eq!(TraceMode::from(ModeArg::Staged), TraceMode::Staged);
        assert_eq!(TraceMode::from(ModeArg::OnDemand), TraceMode::OnDemand);
    }

    #[test]
    fn test_mode_arg_value_names() {
        let names: Vec<String> = ModeArg::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value().map(|p| p.get_name().to_string()))
            .collect();
        assert_eq!(names, vec!["staged", "on-demand"]);
    }
}
