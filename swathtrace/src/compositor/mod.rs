//! Swath compositing.
//!
//! Turns a stream of ground points into one 13-band raster per emitted
//! sample. Points closer than one swath width to the previously emitted
//! point are skipped. Night-side samples come from the night synthesizer;
//! sunlit samples are stitched from tiles or, where no window has enough
//! coverage, filled from the ocean pool.
//!
//! Two sources of tiles are supported:
//!
//! - **Staged**: tiles were resolved ahead of time by a survey and are read
//!   from the tile cache through an R-tree. No remote calls are made.
//! - **On-demand**: each footprint is checked for coverage, planned, and
//!   its tiles are resolved through a [`TileResolver`].

mod footprint;
mod stitch;

pub use footprint::Footprint;
pub use stitch::{stitch_tile, IndexedTile, TileIndex};

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::cache::{CacheError, TileCache};
use crate::geo::{haversine_m, BBox, LonLat};
use crate::planner::{plan_tiles, CoverageArea, PlanError, PlannerConfig, TileDescriptor, TileId};
use crate::provider::{ImageryProvider, WindowKind};
use crate::raster::BandRaster;
use crate::resolver::{ResolveError, TileResolver};
use crate::synth::{sample_rng, NightImageSynthesizer, OceanTileSynthesizer, SynthError};
use crate::track::GroundPoint;

/// Staged tiles kept in memory between consecutive footprints.
const RECENT_TILES: usize = 8;

/// Errors from compositing a sample. All of them stop the trace.
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Synthesis error: {0}")]
    Synth(#[from] SynthError),

    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Staged tile {0} is indexed but no longer cached")]
    MissingTile(TileId),
}

/// Where sunlit tiles come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceMode {
    #[default]
    Staged,
    OnDemand,
}

impl fmt::Display for TraceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceMode::Staged => write!(f, "staged"),
            TraceMode::OnDemand => write!(f, "on-demand"),
        }
    }
}

impl FromStr for TraceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "staged" => Ok(TraceMode::Staged),
            "on-demand" | "ondemand" => Ok(TraceMode::OnDemand),
            _ => Err(format!("Unknown trace mode '{}', expected staged or on-demand", s)),
        }
    }
}

/// How an image was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Night,
    Ocean,
    /// Stitched from tiles found in the primary window.
    Primary,
    /// Stitched from tiles found in the extended window.
    Extended,
    /// Stitched from the staged tile cache.
    Staged,
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageKind::Night => "night",
            ImageKind::Ocean => "ocean",
            ImageKind::Primary => "primary",
            ImageKind::Extended => "extended",
            ImageKind::Staged => "staged",
        };
        f.write_str(name)
    }
}

/// One composited sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SwathImage {
    pub sample_id: String,
    pub kind: ImageKind,
    pub raster: BandRaster,
}

/// Compositor parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorConfig {
    /// Side of the square footprint in metres.
    pub swath_width_m: f64,
    /// Output ground resolution, metres per pixel.
    pub resolution_m: f64,
    /// Coverage fraction a window needs over the footprint.
    pub footprint_coverage: f64,
    /// Seed mixed into every per-sample RNG.
    pub seed: u64,
    /// Used to plan tiles for on-demand footprints.
    pub planner: PlannerConfig,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            swath_width_m: 2560.0,
            resolution_m: 10.0,
            footprint_coverage: 0.8,
            seed: 42,
            planner: PlannerConfig::default(),
        }
    }
}

enum TileFeed<P: ImageryProvider> {
    OnDemand(TileResolver<P>),
    Staged {
        cache: TileCache,
        index: TileIndex,
        recent: VecDeque<(TileId, Arc<BandRaster>)>,
    },
}

/// Produces one image per sufficiently separated ground point.
pub struct SwathCompositor<P: ImageryProvider> {
    config: CompositorConfig,
    tiles: TileFeed<P>,
    night: NightImageSynthesizer,
    ocean: OceanTileSynthesizer,
    last_emitted: Option<LonLat>,
}

impl<P: ImageryProvider> SwathCompositor<P> {
    /// Compositor that resolves tiles per footprint.
    pub fn on_demand(
        resolver: TileResolver<P>,
        night: NightImageSynthesizer,
        ocean: OceanTileSynthesizer,
        config: CompositorConfig,
    ) -> Self {
        Self {
            config,
            tiles: TileFeed::OnDemand(resolver),
            night,
            ocean,
            last_emitted: None,
        }
    }

    /// Compositor over tiles already staged in `cache`.
    pub fn staged(
        cache: TileCache,
        night: NightImageSynthesizer,
        ocean: OceanTileSynthesizer,
        config: CompositorConfig,
    ) -> Result<Self, CompositorError> {
        let index = TileIndex::from_records(cache.records()?);
        debug!(dir = %cache.dir().display(), tiles = index.len(), "Indexed staged tiles");
        Ok(Self {
            config,
            tiles: TileFeed::Staged {
                cache,
                index,
                recent: VecDeque::with_capacity(RECENT_TILES),
            },
            night,
            ocean,
            last_emitted: None,
        })
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn mode(&self) -> TraceMode {
        match self.tiles {
            TileFeed::OnDemand(_) => TraceMode::OnDemand,
            TileFeed::Staged { .. } => TraceMode::Staged,
        }
    }

    /// The resolver, in on-demand mode.
    pub fn resolver(&self) -> Option<&TileResolver<P>> {
        match &self.tiles {
            TileFeed::OnDemand(resolver) => Some(resolver),
            TileFeed::Staged { .. } => None,
        }
    }

    /// Remote calls issued through this compositor.
    pub fn remote_calls(&self) -> u64 {
        self.resolver().map_or(0, |r| r.remote_calls())
    }

    pub fn last_emitted(&self) -> Option<LonLat> {
        self.last_emitted
    }

    /// Whether `point` is at least one swath width from the last emitted
    /// point.
    pub fn should_emit(&self, point: &GroundPoint) -> bool {
        match self.last_emitted {
            None => true,
            Some(last) => haversine_m(last, point.position()) >= self.config.swath_width_m,
        }
    }

    /// Records `point` as the most recently emitted sample.
    pub fn mark_emitted(&mut self, point: &GroundPoint) {
        self.last_emitted = Some(point.position());
    }

    /// Builds the image for `point`.
    ///
    /// Does not consult or update the emission state.
    pub fn composite(&mut self, point: &GroundPoint) -> Result<SwathImage, CompositorError> {
        let footprint = Footprint::around(point.position(), self.config.swath_width_m, self.config.resolution_m);
        let (height, width) = (footprint.height_px, footprint.width_px);
        let mut rng = sample_rng(self.config.seed, point.sample_id());

        let (kind, raster) = if !point.sunlit {
            (ImageKind::Night, self.night.synthesize(point, height, width, &mut rng)?)
        } else {
            match &mut self.tiles {
                TileFeed::Staged { cache, index, recent } => {
                    stitch_staged(&footprint, cache, index, recent, &self.ocean, &self.config, &mut rng)?
                }
                TileFeed::OnDemand(resolver) => {
                    stitch_on_demand(&footprint, resolver, &self.ocean, &self.config, &mut rng)?
                }
            }
        };

        info!(sample_id = point.sample_id(), kind = %kind, "Composited sample");
        Ok(SwathImage {
            sample_id: point.sample_id().to_string(),
            kind,
            raster,
        })
    }
}

fn stitch_on_demand<P: ImageryProvider>(
    footprint: &Footprint,
    resolver: &mut TileResolver<P>,
    ocean: &OceanTileSynthesizer,
    config: &CompositorConfig,
    rng: &mut StdRng,
) -> Result<(ImageKind, BandRaster), CompositorError> {
    let (height, width) = (footprint.height_px, footprint.width_px);
    let window = resolver.window_with_coverage(
        &footprint.bbox,
        width as u32,
        height as u32,
        config.footprint_coverage,
    )?;
    let Some(window) = window else {
        return Ok((ImageKind::Ocean, ocean.fill(height, width, rng)?));
    };

    let area = CoverageArea::from_bbox(footprint.bbox)?;
    let mut out = BandRaster::zeros(height, width);
    for tile in plan_tiles(&area, &config.planner)? {
        let resolved = resolver.resolve_in_window(&tile, window)?;
        if resolved.present {
            stitch_tile(&mut out, &footprint.bbox, &tile.bbox, &resolved.raster);
        } else {
            let fill = ocean_substitute(&tile.bbox, ocean, config, rng)?;
            stitch_tile(&mut out, &footprint.bbox, &tile.bbox, &fill);
        }
    }

    let kind = match window.kind {
        WindowKind::Primary => ImageKind::Primary,
        WindowKind::Extended => ImageKind::Extended,
    };
    Ok((kind, out))
}

fn stitch_staged(
    footprint: &Footprint,
    cache: &TileCache,
    index: &TileIndex,
    recent: &mut VecDeque<(TileId, Arc<BandRaster>)>,
    ocean: &OceanTileSynthesizer,
    config: &CompositorConfig,
    rng: &mut StdRng,
) -> Result<(ImageKind, BandRaster), CompositorError> {
    let mut out = BandRaster::zeros(footprint.height_px, footprint.width_px);
    let hits = index.intersecting(&footprint.bbox);
    // only placeholders under the footprint: the image is pure ocean fill
    let kind = if !hits.is_empty() && hits.iter().all(|hit| !hit.present) {
        ImageKind::Ocean
    } else {
        ImageKind::Staged
    };
    for hit in hits {
        if hit.present {
            let raster = staged_tile(&hit.tile, cache, recent)?;
            stitch_tile(&mut out, &footprint.bbox, &hit.tile.bbox, &raster);
        } else {
            let fill = ocean_substitute(&hit.tile.bbox, ocean, config, rng)?;
            stitch_tile(&mut out, &footprint.bbox, &hit.tile.bbox, &fill);
        }
    }
    Ok((kind, out))
}

fn staged_tile(
    tile: &TileDescriptor,
    cache: &TileCache,
    recent: &mut VecDeque<(TileId, Arc<BandRaster>)>,
) -> Result<Arc<BandRaster>, CompositorError> {
    if let Some((_, raster)) = recent.iter().find(|(id, _)| *id == tile.id) {
        trace!(tile_id = %tile.id, "Staged tile already loaded");
        return Ok(Arc::clone(raster));
    }
    let cached = cache
        .get(&tile.id)?
        .filter(|c| c.record.present)
        .ok_or_else(|| CompositorError::MissingTile(tile.id.clone()))?;
    let raster = Arc::new(cached.raster);
    if recent.len() == RECENT_TILES {
        recent.pop_front();
    }
    recent.push_back((tile.id.clone(), Arc::clone(&raster)));
    Ok(raster)
}

/// Ocean fill standing in for a confirmed-empty tile, shaped like the tile
/// would have been at the output resolution.
fn ocean_substitute(
    bbox: &BBox,
    ocean: &OceanTileSynthesizer,
    config: &CompositorConfig,
    rng: &mut StdRng,
) -> Result<BandRaster, CompositorError> {
    let (width, height) = bbox.dimensions_px(config.resolution_m);
    Ok(ocean.fill(height as usize, width as usize, rng)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::resolver::tests::ScriptedProvider;
    use crate::resolver::ResolverConfig;
    use crate::synth::NightOffset;
    use std::time::Duration;
    use tempfile::TempDir;

    fn filled(height: usize, width: usize, value: u8) -> BandRaster {
        let mut r = BandRaster::zeros(height, width);
        r.array_mut().fill(value);
        r
    }

    fn night() -> NightImageSynthesizer {
        NightImageSynthesizer::new(filled(40, 40, 7), 500.0, 10.0, NightOffset::Seeded)
    }

    fn ocean() -> OceanTileSynthesizer {
        OceanTileSynthesizer::from_rasters(vec![filled(64, 64, 200)], Default::default()).unwrap()
    }

    fn point(line: &str) -> GroundPoint {
        GroundPoint::parse(line).unwrap()
    }

    fn on_demand(dir: &TempDir, provider: ScriptedProvider) -> SwathCompositor<ScriptedProvider> {
        let resolver = TileResolver::new(
            provider,
            TileCache::open(dir.path()).unwrap(),
            ResolverConfig {
                request_interval: Duration::ZERO,
                ..ResolverConfig::default()
            },
        );
        SwathCompositor::on_demand(resolver, night(), ocean(), CompositorConfig::default())
    }

    #[test]
    fn test_trace_mode_parse() {
        assert_eq!("staged".parse::<TraceMode>().unwrap(), TraceMode::Staged);
        assert_eq!("On-Demand".parse::<TraceMode>().unwrap(), TraceMode::OnDemand);
        assert!("lazy".parse::<TraceMode>().is_err());
        assert_eq!(TraceMode::OnDemand.to_string(), "on-demand");
    }

    #[test]
    fn test_should_emit_spacing() {
        let dir = TempDir::new().unwrap();
        let mut c = on_demand(&dir, ScriptedProvider::new(vec![], vec![]));
        let first = point("0,10.0,45.0,500.0,0.0,1");
        let near = point("1000,10.01,45.0,500.0,0.0,1");
        let far = point("2000,10.05,45.0,500.0,0.0,1");

        assert!(c.should_emit(&first));
        c.mark_emitted(&first);
        // ~790 m east
        assert!(!c.should_emit(&near));
        // ~3.9 km east
        assert!(c.should_emit(&far));
        assert_eq!(c.last_emitted(), Some(first.position()));
    }

    #[test]
    fn test_night_sample_makes_no_remote_calls() {
        let dir = TempDir::new().unwrap();
        let mut c = on_demand(&dir, ScriptedProvider::new(vec![], vec![]));
        let image = c.composite(&point("0,-170.0,85.0,500.0,0.0,0")).unwrap();
        assert_eq!(image.kind, ImageKind::Night);
        assert_eq!((image.raster.height(), image.raster.width()), (256, 256));
        assert_eq!(image.raster.array().shape()[2], 13);
        assert_eq!(c.remote_calls(), 0);
    }

    #[test]
    fn test_no_footprint_coverage_fills_from_ocean() {
        let dir = TempDir::new().unwrap();
        let mut c = on_demand(&dir, ScriptedProvider::new(vec![Ok(0.5)], vec![Ok(0.8)]));
        let image = c.composite(&point("0,-27.8,37.8,500.0,0.0,1")).unwrap();
        assert_eq!(image.kind, ImageKind::Ocean);
        assert!(image.raster.array().iter().all(|&v| v == 200));
        assert_eq!(c.remote_calls(), 2);
        assert!(c.resolver().unwrap().provider().downloads.lock().is_empty());
    }

    #[test]
    fn test_resolution_limit_routes_to_ocean() {
        let dir = TempDir::new().unwrap();
        let limit = || Err(ProviderError::ResolutionLimit { limit_m: 1500.0 });
        let mut c = on_demand(&dir, ScriptedProvider::new(vec![limit()], vec![limit()]));
        let image = c.composite(&point("0,179.995,0.0,500.0,0.0,1")).unwrap();
        assert_eq!(image.kind, ImageKind::Ocean);
        assert_eq!(c.resolver().unwrap().stats().recovered_errors, 2);
    }

    #[test]
    fn test_covered_footprint_is_stitched_from_downloads() {
        let dir = TempDir::new().unwrap();
        let mut c = on_demand(&dir, ScriptedProvider::new(vec![Ok(0.2)], vec![Ok(1.0)]));
        let image = c.composite(&point("0,10.0,45.0,500.0,0.0,1")).unwrap();
        assert_eq!(image.kind, ImageKind::Extended);
        // scripted downloads are filled with 3
        let covered = image.raster.array().iter().filter(|&&v| v == 3).count();
        assert!(covered as f64 > 0.95 * image.raster.array().len() as f64);
        let provider = c.resolver().unwrap().provider();
        assert!(provider.downloads.lock().iter().all(|k| *k == WindowKind::Extended));
    }

    #[test]
    fn test_same_sample_same_bytes() {
        let a_dir = TempDir::new().unwrap();
        let b_dir = TempDir::new().unwrap();
        let mut a = on_demand(&a_dir, ScriptedProvider::new(vec![], vec![]));
        let mut b = on_demand(&b_dir, ScriptedProvider::new(vec![], vec![]));
        let p = point("5000,-27.8,37.8,500.0,0.0,0");
        assert_eq!(a.composite(&p).unwrap(), b.composite(&p).unwrap());
    }

    #[test]
    fn test_staged_reads_cache_only() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let center = LonLat::new(10.0, 45.0);
        let fp = Footprint::around(center, 2560.0, 10.0);

        // west half has data, east half is confirmed empty
        let west = TileDescriptor::new(BBox::new(fp.bbox.min_lon - 0.01, 44.9, 10.0, 45.1).unwrap());
        let east = TileDescriptor::new(BBox::new(10.0, 44.9, fp.bbox.max_lon + 0.01, 45.1).unwrap());
        let (w, h) = west.bbox.dimensions_px(10.0);
        cache.put(&west, &filled(h as usize, w as usize, 9)).unwrap();
        cache.put_placeholder(&east).unwrap();

        let mut c: SwathCompositor<ScriptedProvider> =
            SwathCompositor::staged(cache, night(), ocean(), CompositorConfig::default()).unwrap();
        assert_eq!(c.mode(), TraceMode::Staged);
        let image = c.composite(&point("0,10.0,45.0,500.0,0.0,1")).unwrap();
        assert_eq!(image.kind, ImageKind::Staged);
        assert_eq!(image.raster.array()[[128, 10, 0]], 9);
        assert_eq!(image.raster.array()[[128, 245, 0]], 200);
        assert_eq!(c.remote_calls(), 0);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_sample_kind_is_logged_at_info() {
        let dir = TempDir::new().unwrap();
        let mut c = on_demand(&dir, ScriptedProvider::new(vec![], vec![]));
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            c.composite(&point("0,-170.0,85.0,500.0,0.0,0")).unwrap();
            c.composite(&point("4000,-27.8,37.8,500.0,0.0,1")).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        let lines: Vec<_> = output.lines().filter(|l| l.contains("Composited sample")).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("sample_id=\"0\"") && lines[0].contains("kind=night"));
        assert!(lines[1].contains("sample_id=\"4000\"") && lines[1].contains("kind=ocean"));
    }

    #[test]
    fn test_staged_placeholders_only_count_as_ocean() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let fp = Footprint::around(LonLat::new(-27.8, 37.8), 2560.0, 10.0);
        let empty = TileDescriptor::new(
            BBox::new(fp.bbox.min_lon - 0.01, fp.bbox.min_lat - 0.01, fp.bbox.max_lon + 0.01, fp.bbox.max_lat + 0.01)
                .unwrap(),
        );
        cache.put_placeholder(&empty).unwrap();

        let mut c: SwathCompositor<ScriptedProvider> =
            SwathCompositor::staged(cache, night(), ocean(), CompositorConfig::default()).unwrap();
        let image = c.composite(&point("0,-27.8,37.8,500.0,0.0,1")).unwrap();
        assert_eq!(image.kind, ImageKind::Ocean);
        assert!(image.raster.array().iter().all(|&v| v == 200));
    }

    #[test]
    fn test_staged_without_tiles_leaves_zeros() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let mut c: SwathCompositor<ScriptedProvider> =
            SwathCompositor::staged(cache, night(), ocean(), CompositorConfig::default()).unwrap();
        let image = c.composite(&point("0,10.0,45.0,500.0,0.0,1")).unwrap();
        assert!(image.raster.array().iter().all(|&v| v == 0));
    }
}
