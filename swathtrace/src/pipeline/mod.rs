//! End-to-end drivers.
//!
//! [`run_trace`] walks a ground track through a [`SwathCompositor`] and
//! persists one image per emitted sample. [`plan_survey`] and
//! [`stage_tiles`] pre-stage the tiles a staged trace needs.
//!
//! The remote side is strictly sequential: one thread drives the track and
//! every provider call. Only image persistence runs in the background, on an
//! [`ImageWriterPool`].

mod writer;

pub use writer::ImageWriterPool;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{CacheError, OutputStore, TraceLog};
use crate::compositor::{CompositorError, ImageKind, SwathCompositor};
use crate::planner::{plan_tiles, CoverageArea, PlanError, PlannerConfig, TileDescriptor};
use crate::provider::ImageryProvider;
use crate::resolver::{ResolveError, TileResolver, TileSource};
use crate::track::{GroundPoint, TrackError};

/// Errors that stop a pipeline run. Everything persisted so far stays
/// valid, so the run can be repeated to resume.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Track error: {0}")]
    Track(#[from] TrackError),

    #[error("Compositing failed: {0}")]
    Compositor(#[from] CompositorError),

    #[error("Tile resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Image writer failed: {0}")]
    Writer(#[source] CacheError),

    #[error("Image writer stopped unexpectedly")]
    WriterClosed,
}

/// Writer pool sizing for a trace run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    pub writer_threads: usize,
    pub queue_capacity: usize,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            writer_threads: 4,
            queue_capacity: 16,
        }
    }
}

/// Counts from one trace run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub points: usize,
    /// Points too close to the previously emitted sample.
    pub skipped: usize,
    /// Emitted samples whose output was already on disk.
    pub existing: usize,
    pub night: usize,
    pub ocean: usize,
    pub stitched: usize,
    /// Images persisted by the writer pool.
    pub written: usize,
    pub remote_calls: u64,
}

impl TraceSummary {
    /// Samples recorded in the trace log.
    pub fn emitted(&self) -> usize {
        self.existing + self.night + self.ocean + self.stitched
    }

    fn count(&mut self, kind: ImageKind) {
        match kind {
            ImageKind::Night => self.night += 1,
            ImageKind::Ocean => self.ocean += 1,
            ImageKind::Primary | ImageKind::Extended | ImageKind::Staged => self.stitched += 1,
        }
    }
}

/// Runs the compositor over `points`, writing images to `store` and one
/// trace log row per emitted sample.
///
/// Samples whose output already exists are logged but not recomposited, so
/// a second run over the same inputs makes no remote calls. `progress` is
/// called with the number of points processed so far.
pub fn run_trace<P: ImageryProvider>(
    points: &[GroundPoint],
    compositor: &mut SwathCompositor<P>,
    store: Arc<OutputStore>,
    trace_log: &mut TraceLog,
    options: TraceOptions,
    mut progress: impl FnMut(usize),
) -> Result<TraceSummary, PipelineError> {
    let calls_before = compositor.remote_calls();
    let pool = ImageWriterPool::spawn(Arc::clone(&store), options.writer_threads, options.queue_capacity);
    let mut summary = TraceSummary::default();

    let mut driven = Ok(());
    for (index, point) in points.iter().enumerate() {
        if pool.has_failed() {
            warn!(sample_id = point.sample_id(), "Stopping trace after a failed image write");
            break;
        }
        driven = trace_point(point, compositor, &store, &pool, trace_log, &mut summary);
        if driven.is_err() {
            break;
        }
        progress(index + 1);
    }

    let written = pool.finish();
    let flushed = trace_log.flush();
    driven?;
    summary.written = written?;
    flushed?;

    summary.remote_calls = compositor.remote_calls() - calls_before;
    info!(
        points = summary.points,
        emitted = summary.emitted(),
        skipped = summary.skipped,
        existing = summary.existing,
        night = summary.night,
        ocean = summary.ocean,
        stitched = summary.stitched,
        remote_calls = summary.remote_calls,
        "Trace complete"
    );
    Ok(summary)
}

fn trace_point<P: ImageryProvider>(
    point: &GroundPoint,
    compositor: &mut SwathCompositor<P>,
    store: &OutputStore,
    pool: &ImageWriterPool,
    trace_log: &mut TraceLog,
    summary: &mut TraceSummary,
) -> Result<(), PipelineError> {
    summary.points += 1;
    if !compositor.should_emit(point) {
        summary.skipped += 1;
        return Ok(());
    }

    if store.exists(point.sample_id()) {
        summary.existing += 1;
    } else {
        let image = compositor.composite(point)?;
        summary.count(image.kind);
        pool.submit(image)?;
    }

    trace_log.append(point)?;
    compositor.mark_emitted(point);
    Ok(())
}

/// Plans the tiles covering every sunlit point of a track.
///
/// Sunlit points are grouped in chunks of `points_per_area`; each chunk's
/// footprints form one coverage area. Tiles repeated across chunks are kept
/// once, in first-seen order.
pub fn plan_survey(
    points: &[GroundPoint],
    swath_width_m: f64,
    points_per_area: usize,
    planner: &PlannerConfig,
) -> Result<Vec<TileDescriptor>, PlanError> {
    let sunlit: Vec<_> = points.iter().filter(|p| p.sunlit).map(|p| p.position()).collect();
    let mut seen = HashSet::new();
    let mut tiles = Vec::new();

    for (chunk_index, chunk) in sunlit.chunks(points_per_area.max(1)).enumerate() {
        let area = CoverageArea::from_track(chunk, swath_width_m)?;
        let planned = plan_tiles(&area, planner)?;
        let before = tiles.len();
        tiles.extend(planned.into_iter().filter(|t| seen.insert(t.id.clone())));
        info!(
            chunk = chunk_index,
            points = chunk.len(),
            new_tiles = tiles.len() - before,
            "Planned survey chunk"
        );
    }
    Ok(tiles)
}

/// Counts from staging tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurveySummary {
    pub tiles: usize,
    pub cached: usize,
    pub downloaded: usize,
    pub confirmed_empty: usize,
    /// Tiles left for a later run because the provider declined.
    pub unavailable: usize,
}

/// Resolves every tile into the resolver's cache.
pub fn stage_tiles<P: ImageryProvider>(
    tiles: &[TileDescriptor],
    resolver: &mut TileResolver<P>,
    mut progress: impl FnMut(usize),
) -> Result<SurveySummary, ResolveError> {
    let mut summary = SurveySummary {
        tiles: tiles.len(),
        ..SurveySummary::default()
    };
    for (index, tile) in tiles.iter().enumerate() {
        match resolver.resolve(tile)?.source {
            TileSource::Cache => summary.cached += 1,
            TileSource::Downloaded => summary.downloaded += 1,
            TileSource::ConfirmedEmpty => summary.confirmed_empty += 1,
            TileSource::Unavailable => summary.unavailable += 1,
        }
        progress(index + 1);
    }
    info!(
        tiles = summary.tiles,
        cached = summary.cached,
        downloaded = summary.downloaded,
        confirmed_empty = summary.confirmed_empty,
        unavailable = summary.unavailable,
        "Staging complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{read_trace_log, OutputFormat, TileCache};
    use crate::compositor::CompositorConfig;
    use crate::raster::BandRaster;
    use crate::resolver::tests::ScriptedProvider;
    use crate::resolver::ResolverConfig;
    use crate::synth::{NightImageSynthesizer, NightOffset, OceanSelection, OceanTileSynthesizer};
    use std::time::Duration;
    use tempfile::TempDir;

    fn filled(height: usize, width: usize, value: u8) -> BandRaster {
        let mut r = BandRaster::zeros(height, width);
        r.array_mut().fill(value);
        r
    }

    fn compositor(dir: &TempDir, provider: ScriptedProvider) -> SwathCompositor<ScriptedProvider> {
        let resolver = TileResolver::new(
            provider,
            TileCache::open(dir.path().join("tiles")).unwrap(),
            ResolverConfig {
                request_interval: Duration::ZERO,
                ..ResolverConfig::default()
            },
        );
        SwathCompositor::on_demand(
            resolver,
            NightImageSynthesizer::new(filled(40, 40, 7), 500.0, 10.0, NightOffset::Seeded),
            OceanTileSynthesizer::from_rasters(vec![filled(32, 32, 200)], OceanSelection::Seeded).unwrap(),
            CompositorConfig::default(),
        )
    }

    fn track() -> Vec<GroundPoint> {
        [
            "0,-27.80,37.80,500.0,0.0,0",
            "1000,-27.805,37.80,500.0,0.0,0",
            "2000,-27.75,37.80,500.0,0.0,1",
            "3000,-27.70,37.80,500.0,0.0,1",
        ]
        .iter()
        .map(|l| GroundPoint::parse(l).unwrap())
        .collect()
    }

    #[test]
    fn test_trace_logs_emitted_samples() {
        let dir = TempDir::new().unwrap();
        let mut c = compositor(&dir, ScriptedProvider::new(vec![], vec![]));
        let store = Arc::new(OutputStore::open(dir.path().join("out"), OutputFormat::Packed).unwrap());
        let log_path = dir.path().join("trace.csv");
        let mut log = TraceLog::create(&log_path).unwrap();

        let mut seen = 0;
        let summary = run_trace(&track(), &mut c, Arc::clone(&store), &mut log, TraceOptions::default(), |n| seen = n).unwrap();
        assert_eq!(seen, 4);
        assert_eq!(summary.points, 4);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.night, 1);
        assert_eq!(summary.ocean, 2);
        assert_eq!(summary.written, 3);

        let ids: Vec<_> = read_trace_log(&log_path).unwrap().into_iter().map(|e| e.sample_id).collect();
        assert_eq!(ids, vec!["0", "2000", "3000"]);
        assert!(store.exists("2000"));
        assert!(!store.exists("1000"));
    }

    #[test]
    fn test_rerun_skips_existing_outputs() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(OutputStore::open(dir.path().join("out"), OutputFormat::Packed).unwrap());
        let log_path = dir.path().join("trace.csv");

        let mut first = compositor(&dir, ScriptedProvider::new(vec![], vec![]));
        let mut log = TraceLog::create(&log_path).unwrap();
        let a = run_trace(&track(), &mut first, Arc::clone(&store), &mut log, TraceOptions::default(), |_| {}).unwrap();
        assert_eq!(a.remote_calls, 4);
        drop(log);
        let before = std::fs::read(store.path_for("2000")).unwrap();

        let mut second = compositor(&dir, ScriptedProvider::new(vec![], vec![]));
        let mut log = TraceLog::create(&log_path).unwrap();
        let b = run_trace(&track(), &mut second, Arc::clone(&store), &mut log, TraceOptions::default(), |_| {}).unwrap();
        assert_eq!(b.remote_calls, 0);
        assert_eq!(b.existing, 3);
        assert_eq!(b.written, 0);
        assert_eq!(read_trace_log(&log_path).unwrap().len(), 3);
        assert_eq!(std::fs::read(store.path_for("2000")).unwrap(), before);
    }

    #[test]
    fn test_fatal_provider_error_stops_trace() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(
            vec![Err(crate::provider::ProviderError::Auth("expired".into()))],
            vec![],
        );
        let mut c = compositor(&dir, provider);
        let store = Arc::new(OutputStore::open(dir.path().join("out"), OutputFormat::Packed).unwrap());
        let log_path = dir.path().join("trace.csv");
        let mut log = TraceLog::create(&log_path).unwrap();

        let result = run_trace(&track(), &mut c, Arc::clone(&store), &mut log, TraceOptions::default(), |_| {});
        assert!(matches!(result, Err(PipelineError::Compositor(_))));
        // night sample before the failure is persisted and logged
        assert!(store.exists("0"));
        assert!(!store.exists("2000"));
        assert_eq!(read_trace_log(&log_path).unwrap().len(), 1);
    }

    #[test]
    fn test_plan_survey_dedupes_chunks() {
        let points = track();
        let planner = PlannerConfig::default();
        let whole = plan_survey(&points, 2560.0, 100, &planner).unwrap();
        let chunked = plan_survey(&points, 2560.0, 1, &planner).unwrap();
        assert!(!whole.is_empty());
        let ids: HashSet<_> = chunked.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids.len(), chunked.len());
    }

    #[test]
    fn test_plan_survey_ignores_night_points() {
        let points: Vec<_> = track().into_iter().filter(|p| !p.sunlit).collect();
        assert!(matches!(
            plan_survey(&points, 2560.0, 10, &PlannerConfig::default()),
            Ok(tiles) if tiles.is_empty()
        ));
    }

    #[test]
    fn test_stage_tiles_counts_sources() {
        let dir = TempDir::new().unwrap();
        let mut resolver = TileResolver::new(
            ScriptedProvider::new(vec![Ok(1.0), Ok(0.0)], vec![Ok(0.0)]),
            TileCache::open(dir.path()).unwrap(),
            ResolverConfig {
                request_interval: Duration::ZERO,
                ..ResolverConfig::default()
            },
        );
        let tiles = vec![
            TileDescriptor::new(crate::geo::BBox::new(10.0, 45.0, 10.01, 45.01).unwrap()),
            TileDescriptor::new(crate::geo::BBox::new(10.01, 45.0, 10.02, 45.01).unwrap()),
        ];
        let summary = stage_tiles(&tiles, &mut resolver, |_| {}).unwrap();
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.confirmed_empty, 1);

        let again = stage_tiles(&tiles, &mut resolver, |_| {}).unwrap();
        assert_eq!(again.cached, 1);
    }
}
