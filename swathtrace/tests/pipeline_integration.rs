//! End-to-end tests for the trace pipeline.
//!
//! These tests drive tracks through planning, staging and compositing
//! against a regional mock provider:
//! - Night samples come from the night raster without remote calls
//! - Samples over open ocean are filled from the ocean pool
//! - Staged traces read only the tile cache
//! - Reruns reuse existing outputs byte for byte
//!
//! Run with: `cargo test --test pipeline_integration`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use swathtrace::cache::{read_trace_log, OutputFormat, OutputStore, TileCache, TraceLog};
use swathtrace::compositor::{CompositorConfig, SwathCompositor};
use swathtrace::geo::BBox;
use swathtrace::pipeline::{plan_survey, run_trace, stage_tiles, TraceOptions, TraceSummary};
use swathtrace::planner::{PlannerConfig, TileDescriptor};
use swathtrace::provider::{
    CoverageMask, CoverageRequest, DownloadRequest, ImageryProvider, ProviderError,
};
use swathtrace::raster::BandRaster;
use swathtrace::resolver::{ResolverConfig, TileResolver};
use swathtrace::synth::{NightImageSynthesizer, NightOffset, OceanSelection, OceanTileSynthesizer};
use swathtrace::track::GroundPoint;

// ============================================================================
// Helpers
// ============================================================================

const LAND_VALUE: u8 = 5;
const OCEAN_VALUE: u8 = 200;
const NIGHT_VALUE: u8 = 7;

/// Serves imagery only between 0°E and 20°E, counting every call.
#[derive(Default)]
struct RegionalProvider {
    coverage_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl RegionalProvider {
    fn calls(&self) -> usize {
        self.coverage_calls.load(Ordering::SeqCst) + self.download_calls.load(Ordering::SeqCst)
    }

    fn has_data(bbox: &BBox) -> bool {
        let lon = bbox.center().lon;
        (0.0..20.0).contains(&lon)
    }
}

impl ImageryProvider for RegionalProvider {
    fn coverage(&self, request: &CoverageRequest) -> Result<CoverageMask, ProviderError> {
        self.coverage_calls.fetch_add(1, Ordering::SeqCst);
        let value = u8::from(Self::has_data(&request.bbox));
        Ok(CoverageMask {
            width: request.width_px,
            height: request.height_px,
            data: vec![value; (request.width_px * request.height_px) as usize],
        })
    }

    fn download(&self, request: &DownloadRequest) -> Result<BandRaster, ProviderError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let mut raster = BandRaster::zeros(request.height_px as usize, request.width_px as usize);
        raster.array_mut().fill(LAND_VALUE);
        Ok(raster)
    }

    fn name(&self) -> &str {
        "regional"
    }
}

fn filled(height: usize, width: usize, value: u8) -> BandRaster {
    let mut raster = BandRaster::zeros(height, width);
    raster.array_mut().fill(value);
    raster
}

fn resolver_config() -> ResolverConfig {
    ResolverConfig {
        request_interval: Duration::ZERO,
        ..ResolverConfig::default()
    }
}

fn night() -> NightImageSynthesizer {
    NightImageSynthesizer::new(filled(40, 40, NIGHT_VALUE), 500.0, 10.0, NightOffset::Seeded)
}

/// Ocean pool of two uniform tiles.
fn ocean_pool(dir: &TempDir) -> TileCache {
    let cache = TileCache::open(dir.path().join("ocean")).unwrap();
    for west in [-30.0, -29.99] {
        let tile = TileDescriptor::new(BBox::new(west, 37.0, west + 0.01, 37.01).unwrap());
        cache.put(&tile, &filled(64, 64, OCEAN_VALUE)).unwrap();
    }
    cache
}

fn ocean(cache: &TileCache) -> OceanTileSynthesizer {
    OceanTileSynthesizer::from_cache(cache, OceanSelection::Seeded).unwrap()
}

/// One night sample, one over the Atlantic, one over land.
fn track() -> Vec<GroundPoint> {
    [
        "0,-170.0,85.0,500.0,0.0,0",
        "1000,-27.80,37.80,500.0,0.0,1",
        "2000,10.00,45.00,500.0,0.0,1",
    ]
    .iter()
    .map(|line| GroundPoint::parse(line).unwrap())
    .collect()
}

fn fraction_equal(raster: &BandRaster, value: u8) -> f64 {
    let matching = raster.array().iter().filter(|&&v| v == value).count();
    matching as f64 / raster.array().len() as f64
}

fn trace_once<P: ImageryProvider>(
    compositor: &mut SwathCompositor<P>,
    store: &Arc<OutputStore>,
    log_path: &std::path::Path,
) -> TraceSummary {
    let mut log = TraceLog::create(log_path).unwrap();
    run_trace(&track(), compositor, Arc::clone(store), &mut log, TraceOptions::default(), |_| {}).unwrap()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Every sample class is composited in on-demand mode with 13-band
/// 256x256 output, and the ocean pool is never written to.
#[test]
fn test_on_demand_trace_covers_every_sample_class() {
    let dir = TempDir::new().unwrap();
    let pool = ocean_pool(&dir);
    let resolver = TileResolver::new(
        RegionalProvider::default(),
        TileCache::open(dir.path().join("tiles")).unwrap(),
        resolver_config(),
    );
    let mut compositor =
        SwathCompositor::on_demand(resolver, night(), ocean(&pool), CompositorConfig::default());
    let store = Arc::new(OutputStore::open(dir.path().join("out"), OutputFormat::Packed).unwrap());

    let summary = trace_once(&mut compositor, &store, &dir.path().join("trace.csv"));
    assert_eq!(summary.emitted(), 3);
    assert_eq!((summary.night, summary.ocean, summary.stitched), (1, 1, 1));
    assert_eq!(summary.written, 3);

    for id in ["0", "1000", "2000"] {
        let image = store.read(id).unwrap();
        assert_eq!(image.array().shape(), &[256, 256, 13]);
    }
    assert!(store.read("0").unwrap().array().iter().all(|&v| v == NIGHT_VALUE));
    assert!(store.read("1000").unwrap().array().iter().all(|&v| v == OCEAN_VALUE));
    assert!(fraction_equal(&store.read("2000").unwrap(), LAND_VALUE) > 0.95);

    let provider = compositor.resolver().unwrap().provider();
    assert!(provider.download_calls.load(Ordering::SeqCst) > 0);
    assert_eq!(summary.remote_calls as usize, provider.calls());
    assert_eq!(pool.present_ids().unwrap().len(), 2);
}

/// A night sample alone never reaches the provider.
#[test]
fn test_night_sample_needs_no_provider() {
    let dir = TempDir::new().unwrap();
    let pool = ocean_pool(&dir);
    let resolver = TileResolver::new(
        RegionalProvider::default(),
        TileCache::open(dir.path().join("tiles")).unwrap(),
        resolver_config(),
    );
    let mut compositor =
        SwathCompositor::on_demand(resolver, night(), ocean(&pool), CompositorConfig::default());

    let image = compositor.composite(&track()[0]).unwrap();
    assert_eq!(image.raster.array().shape(), &[256, 256, 13]);
    assert_eq!(compositor.resolver().unwrap().provider().calls(), 0);
}

/// Survey then staged trace: the trace itself makes no remote calls and
/// reproduces the land and ocean content.
#[test]
fn test_staged_trace_reads_survey_cache_only() {
    let dir = TempDir::new().unwrap();
    let pool = ocean_pool(&dir);
    let tile_dir = dir.path().join("tiles");

    let tiles = plan_survey(&track(), 2560.0, 1, &PlannerConfig::default()).unwrap();
    let mut survey = TileResolver::new(
        RegionalProvider::default(),
        TileCache::open(&tile_dir).unwrap(),
        resolver_config(),
    );
    let staged = stage_tiles(&tiles, &mut survey, |_| {}).unwrap();
    assert_eq!(staged.tiles, tiles.len());
    assert!(staged.downloaded > 0);
    assert!(staged.confirmed_empty > 0);
    assert_eq!(staged.unavailable, 0);
    let survey_calls = survey.provider().calls();

    let mut compositor: SwathCompositor<RegionalProvider> = SwathCompositor::staged(
        TileCache::open(&tile_dir).unwrap(),
        night(),
        ocean(&pool),
        CompositorConfig::default(),
    )
    .unwrap();
    let store = Arc::new(OutputStore::open(dir.path().join("out"), OutputFormat::BandTiffs).unwrap());
    let summary = trace_once(&mut compositor, &store, &dir.path().join("trace.csv"));

    assert_eq!(summary.remote_calls, 0);
    assert_eq!(survey.provider().calls(), survey_calls);
    // the Atlantic sample only touches confirmed-empty tiles
    assert_eq!((summary.night, summary.ocean, summary.stitched), (1, 1, 1));
    assert!(fraction_equal(&store.read("1000").unwrap(), OCEAN_VALUE) > 0.95);
    assert!(fraction_equal(&store.read("2000").unwrap(), LAND_VALUE) > 0.95);
    assert_eq!(pool.present_ids().unwrap().len(), 2);
}

/// A second survey over the same plan is served from the cache.
#[test]
fn test_second_survey_is_cached() {
    let dir = TempDir::new().unwrap();
    let tiles = plan_survey(&track(), 2560.0, 1, &PlannerConfig::default()).unwrap();
    let cache = TileCache::open(dir.path().join("tiles")).unwrap();

    let mut first = TileResolver::new(RegionalProvider::default(), cache.clone(), resolver_config());
    let a = stage_tiles(&tiles, &mut first, |_| {}).unwrap();

    let mut second = TileResolver::new(RegionalProvider::default(), cache, resolver_config());
    let b = stage_tiles(&tiles, &mut second, |_| {}).unwrap();
    assert_eq!(b.cached, a.downloaded);
    // placeholders are queried again, downloads are not
    assert_eq!(second.provider().download_calls.load(Ordering::SeqCst), 0);
}

/// Rerunning an on-demand trace reuses outputs byte for byte and makes no
/// remote calls.
#[test]
fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let pool = ocean_pool(&dir);
    let store = Arc::new(OutputStore::open(dir.path().join("out"), OutputFormat::Packed).unwrap());
    let log_path = dir.path().join("trace.csv");

    let build = || {
        let resolver = TileResolver::new(
            RegionalProvider::default(),
            TileCache::open(dir.path().join("tiles")).unwrap(),
            resolver_config(),
        );
        SwathCompositor::on_demand(resolver, night(), ocean(&pool), CompositorConfig::default())
    };

    let mut first = build();
    trace_once(&mut first, &store, &log_path);
    let before: Vec<Vec<u8>> = ["0", "1000", "2000"]
        .iter()
        .map(|id| std::fs::read(store.path_for(id)).unwrap())
        .collect();
    let log_before = std::fs::read_to_string(&log_path).unwrap();

    let mut second = build();
    let summary = trace_once(&mut second, &store, &log_path);
    assert_eq!(summary.existing, 3);
    assert_eq!(summary.remote_calls, 0);

    for (id, bytes) in ["0", "1000", "2000"].iter().zip(&before) {
        assert_eq!(&std::fs::read(store.path_for(id)).unwrap(), bytes);
    }
    assert_eq!(std::fs::read_to_string(&log_path).unwrap(), log_before);
    let ids: Vec<_> = read_trace_log(&log_path).unwrap().into_iter().map(|e| e.sample_id).collect();
    assert_eq!(ids, vec!["0", "1000", "2000"]);
}
