//! Tile resolution.
//!
//! Turns planned tiles into cached pixel data. For each tile the resolver
//! tries, in order:
//!
//! 1. the tile cache (entries with data are returned untouched);
//! 2. a coverage query in the primary acquisition window;
//! 3. a coverage query in the extended window;
//! 4. a confirmed-empty placeholder.
//!
//! When a window reports coverage the full tile is downloaded from that
//! window and cached. Every remote call goes through one [`RateLimiter`].
//!
//! Resolution-limit and quota errors are treated as "no data in this
//! window". A placeholder is only written when every window affirmatively
//! had no data, so quota-induced gaps are queried again on the next run.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, TileCache};
use crate::geo::BBox;
use crate::planner::TileDescriptor;
use crate::provider::{
    CoverageRequest, DownloadRequest, ImageryProvider, ProviderError, TimeWindow, TimeWindows,
};
use crate::ratelimit::RateLimiter;
use crate::raster::BandRaster;

/// Errors from resolving tiles. All of them are fatal to the caller's loop.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Resolver parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// Resolution of full downloads, metres per pixel.
    pub resolution_m: f64,
    /// Resolution of per-tile coverage queries, metres per pixel.
    pub check_resolution_m: f64,
    pub windows: TimeWindows,
    /// Minimum spacing of remote calls.
    pub request_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolution_m: 10.0,
            check_resolution_m: 100.0,
            windows: TimeWindows::default(),
            request_interval: Duration::from_millis(100),
        }
    }
}

/// Where a resolved tile's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileSource {
    Cache,
    Downloaded,
    /// Every window affirmed there is no data; a placeholder was cached.
    ConfirmedEmpty,
    /// No data could be obtained, but emptiness was not confirmed.
    Unavailable,
}

/// A tile with its pixels.
#[derive(Debug, Clone)]
pub struct ResolvedTile {
    pub tile: TileDescriptor,
    pub raster: BandRaster,
    pub present: bool,
    pub source: TileSource,
}

/// Counters for one resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub cache_hits: usize,
    pub downloaded: usize,
    pub confirmed_empty: usize,
    pub unavailable: usize,
    pub recovered_errors: usize,
}

/// Outcome of a coverage query.
enum Coverage {
    Yes,
    No,
    /// The provider declined to answer (quota).
    Unknown,
}

/// Resolves tiles through the cache and a rate-limited provider.
pub struct TileResolver<P: ImageryProvider> {
    provider: P,
    cache: TileCache,
    limiter: RateLimiter,
    config: ResolverConfig,
    stats: ResolverStats,
}

impl<P: ImageryProvider> TileResolver<P> {
    pub fn new(provider: P, cache: TileCache, config: ResolverConfig) -> Self {
        Self {
            provider,
            cache,
            limiter: RateLimiter::new(config.request_interval),
            config,
            stats: ResolverStats::default(),
        }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Remote calls issued so far.
    pub fn remote_calls(&self) -> u64 {
        self.limiter.calls()
    }

    /// Resolves a tile, querying both windows if it is not cached.
    pub fn resolve(&mut self, tile: &TileDescriptor) -> Result<ResolvedTile, ResolveError> {
        if let Some(hit) = self.cached(tile)? {
            return Ok(hit);
        }

        let (width, height) = tile.bbox.dimensions_px(self.config.check_resolution_m);
        let mut affirmed = true;
        for window in self.config.windows.in_order() {
            match self.query(&tile.bbox, width, height, window)? {
                Coverage::Yes => {
                    if let Some(resolved) = self.download(tile, window)? {
                        return Ok(resolved);
                    }
                    affirmed = false;
                }
                Coverage::No => {}
                Coverage::Unknown => affirmed = false,
            }
        }

        self.unresolved(tile, affirmed)
    }

    /// Resolves a tile in a window already known to have coverage.
    pub fn resolve_in_window(&mut self, tile: &TileDescriptor, window: TimeWindow) -> Result<ResolvedTile, ResolveError> {
        if let Some(hit) = self.cached(tile)? {
            return Ok(hit);
        }
        if let Some(resolved) = self.download(tile, window)? {
            return Ok(resolved);
        }
        self.unresolved(tile, false)
    }

    /// First window whose coverage fraction over `bbox` at the given pixel
    /// size exceeds `threshold`.
    pub fn window_with_coverage(
        &mut self,
        bbox: &BBox,
        width_px: u32,
        height_px: u32,
        threshold: f64,
    ) -> Result<Option<TimeWindow>, ResolveError> {
        for window in self.config.windows.in_order() {
            let request = CoverageRequest {
                bbox: *bbox,
                width_px,
                height_px,
                window,
            };
            let provider = &self.provider;
            match self.limiter.call(|| provider.coverage(&request)) {
                Ok(mask) if mask.fraction() > threshold => return Ok(Some(window)),
                Ok(mask) => {
                    debug!(window = %window.kind, fraction = mask.fraction(), "Insufficient footprint coverage");
                }
                Err(e) if e.is_recoverable() => {
                    self.stats.recovered_errors += 1;
                    debug!(window = %window.kind, error = %e, "Footprint coverage query declined");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    fn cached(&mut self, tile: &TileDescriptor) -> Result<Option<ResolvedTile>, ResolveError> {
        match self.cache.get(&tile.id)? {
            Some(hit) if hit.record.present => {
                self.stats.cache_hits += 1;
                Ok(Some(ResolvedTile {
                    tile: tile.clone(),
                    raster: hit.raster,
                    present: true,
                    source: TileSource::Cache,
                }))
            }
            _ => Ok(None),
        }
    }

    fn query(&mut self, bbox: &BBox, width_px: u32, height_px: u32, window: TimeWindow) -> Result<Coverage, ResolveError> {
        if width_px == 0 || height_px == 0 {
            debug!(bbox = %bbox, "Tile too small for a coverage query");
            return Ok(Coverage::No);
        }
        let request = CoverageRequest {
            bbox: *bbox,
            width_px,
            height_px,
            window,
        };
        let provider = &self.provider;
        match self.limiter.call(|| provider.coverage(&request)) {
            Ok(mask) if mask.any() => Ok(Coverage::Yes),
            Ok(_) => Ok(Coverage::No),
            Err(ProviderError::ResolutionLimit { limit_m }) => {
                self.stats.recovered_errors += 1;
                debug!(bbox = %bbox, limit_m, "Coverage query over resolution limit");
                Ok(Coverage::No)
            }
            Err(e) if e.is_recoverable() => {
                self.stats.recovered_errors += 1;
                warn!(bbox = %bbox, window = %window.kind, error = %e, "Coverage query declined");
                Ok(Coverage::Unknown)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Downloads and caches a tile. `None` means the provider declined.
    fn download(&mut self, tile: &TileDescriptor, window: TimeWindow) -> Result<Option<ResolvedTile>, ResolveError> {
        let (width_px, height_px) = tile.bbox.dimensions_px(self.config.resolution_m);
        if width_px == 0 || height_px == 0 {
            return Ok(None);
        }
        let request = DownloadRequest {
            bbox: tile.bbox,
            width_px,
            height_px,
            window,
        };
        let provider = &self.provider;
        match self.limiter.call(|| provider.download(&request)) {
            Ok(raster) => {
                self.cache.put(tile, &raster)?;
                self.stats.downloaded += 1;
                info!(
                    tile_id = %tile.id,
                    window = %window.kind,
                    width_px,
                    height_px,
                    "Downloaded tile"
                );
                Ok(Some(ResolvedTile {
                    tile: tile.clone(),
                    raster,
                    present: true,
                    source: TileSource::Downloaded,
                }))
            }
            Err(e) if e.is_recoverable() => {
                self.stats.recovered_errors += 1;
                warn!(tile_id = %tile.id, window = %window.kind, error = %e, "Tile download declined");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn unresolved(&mut self, tile: &TileDescriptor, affirmed: bool) -> Result<ResolvedTile, ResolveError> {
        let source = if affirmed {
            self.cache.put_placeholder(tile)?;
            self.stats.confirmed_empty += 1;
            debug!(tile_id = %tile.id, "No coverage in any window");
            TileSource::ConfirmedEmpty
        } else {
            self.stats.unavailable += 1;
            warn!(tile_id = %tile.id, "Tile unavailable, will retry on the next run");
            TileSource::Unavailable
        };
        Ok(ResolvedTile {
            tile: tile.clone(),
            raster: BandRaster::placeholder(),
            present: false,
            source,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::{CoverageMask, WindowKind};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Scripted provider: coverage answers are popped per window kind,
    /// downloads return a constant raster.
    pub struct ScriptedProvider {
        pub primary: Mutex<VecDeque<Result<f64, ProviderError>>>,
        pub extended: Mutex<VecDeque<Result<f64, ProviderError>>>,
        pub download: Mutex<VecDeque<Result<u8, ProviderError>>>,
        pub downloads: Mutex<Vec<WindowKind>>,
    }

    impl ScriptedProvider {
        pub fn new(
            primary: Vec<Result<f64, ProviderError>>,
            extended: Vec<Result<f64, ProviderError>>,
        ) -> Self {
            Self {
                primary: Mutex::new(primary.into()),
                extended: Mutex::new(extended.into()),
                download: Mutex::new(VecDeque::new()),
                downloads: Mutex::new(Vec::new()),
            }
        }
    }

    impl ImageryProvider for ScriptedProvider {
        fn coverage(&self, request: &CoverageRequest) -> Result<CoverageMask, ProviderError> {
            let queue = match request.window.kind {
                WindowKind::Primary => &self.primary,
                WindowKind::Extended => &self.extended,
            };
            let fraction = queue.lock().pop_front().unwrap_or(Ok(0.0))?;
            let total = (request.width_px * request.height_px) as usize;
            let set = (fraction * total as f64).round() as usize;
            let mut data = vec![0u8; total];
            data[..set].fill(1);
            Ok(CoverageMask {
                width: request.width_px,
                height: request.height_px,
                data,
            })
        }

        fn download(&self, request: &DownloadRequest) -> Result<BandRaster, ProviderError> {
            self.downloads.lock().push(request.window.kind);
            let value = self.download.lock().pop_front().unwrap_or(Ok(3))?;
            let mut raster = BandRaster::zeros(request.height_px as usize, request.width_px as usize);
            raster.array_mut().fill(value);
            Ok(raster)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn config() -> ResolverConfig {
        ResolverConfig {
            request_interval: Duration::ZERO,
            ..ResolverConfig::default()
        }
    }

    fn tile() -> TileDescriptor {
        TileDescriptor::new(BBox::new(10.0, 45.0, 10.01, 45.01).unwrap())
    }

    fn resolver(dir: &TempDir, provider: ScriptedProvider) -> TileResolver<ScriptedProvider> {
        TileResolver::new(provider, TileCache::open(dir.path()).unwrap(), config())
    }

    #[test]
    fn test_primary_coverage_downloads() {
        let dir = TempDir::new().unwrap();
        let mut r = resolver(&dir, ScriptedProvider::new(vec![Ok(0.1)], vec![]));
        let resolved = r.resolve(&tile()).unwrap();
        assert!(resolved.present);
        assert_eq!(resolved.source, TileSource::Downloaded);
        assert_eq!(*r.provider().downloads.lock(), vec![WindowKind::Primary]);
        assert_eq!(r.remote_calls(), 2);
        assert!(r.cache().has_data(&tile().id).unwrap());
    }

    #[test]
    fn test_extended_fallback() {
        let dir = TempDir::new().unwrap();
        let mut r = resolver(&dir, ScriptedProvider::new(vec![Ok(0.0)], vec![Ok(1.0)]));
        let resolved = r.resolve(&tile()).unwrap();
        assert!(resolved.present);
        assert_eq!(*r.provider().downloads.lock(), vec![WindowKind::Extended]);
    }

    #[test]
    fn test_no_coverage_caches_placeholder() {
        let dir = TempDir::new().unwrap();
        let mut r = resolver(&dir, ScriptedProvider::new(vec![Ok(0.0)], vec![Ok(0.0)]));
        let resolved = r.resolve(&tile()).unwrap();
        assert!(!resolved.present);
        assert_eq!(resolved.source, TileSource::ConfirmedEmpty);
        let cached = r.cache().get(&tile().id).unwrap().unwrap();
        assert!(!cached.record.present);
        assert!(cached.raster.is_placeholder());
    }

    #[test]
    fn test_cache_hit_makes_no_remote_calls() {
        let dir = TempDir::new().unwrap();
        let mut r = resolver(&dir, ScriptedProvider::new(vec![Ok(1.0)], vec![]));
        let first = r.resolve(&tile()).unwrap();
        let calls = r.remote_calls();
        let second = r.resolve(&tile()).unwrap();
        assert_eq!(r.remote_calls(), calls);
        assert_eq!(second.source, TileSource::Cache);
        assert_eq!(first.raster, second.raster);
        assert_eq!(r.stats().cache_hits, 1);
    }

    #[test]
    fn test_placeholder_is_queried_again() {
        let dir = TempDir::new().unwrap();
        let mut r = resolver(
            &dir,
            ScriptedProvider::new(vec![Ok(0.0), Ok(1.0)], vec![Ok(0.0)]),
        );
        assert!(!r.resolve(&tile()).unwrap().present);
        let resolved = r.resolve(&tile()).unwrap();
        assert!(resolved.present);
        assert_eq!(resolved.source, TileSource::Downloaded);
    }

    #[test]
    fn test_resolution_limit_means_no_data() {
        let dir = TempDir::new().unwrap();
        let limit = || Err(ProviderError::ResolutionLimit { limit_m: 1500.0 });
        let mut r = resolver(&dir, ScriptedProvider::new(vec![limit()], vec![limit()]));
        let resolved = r.resolve(&tile()).unwrap();
        assert_eq!(resolved.source, TileSource::ConfirmedEmpty);
        assert_eq!(r.stats().recovered_errors, 2);
    }

    #[test]
    fn test_quota_does_not_persist_placeholder() {
        let dir = TempDir::new().unwrap();
        let quota = || Err(ProviderError::QuotaExceeded("429".into()));
        let mut r = resolver(&dir, ScriptedProvider::new(vec![quota()], vec![Ok(0.0)]));
        let resolved = r.resolve(&tile()).unwrap();
        assert_eq!(resolved.source, TileSource::Unavailable);
        assert!(r.cache().record(&tile().id).unwrap().is_none());
    }

    #[test]
    fn test_download_quota_falls_through_to_extended() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![Ok(1.0)], vec![Ok(1.0)]);
        provider
            .download
            .lock()
            .push_back(Err(ProviderError::QuotaExceeded("429".into())));
        let mut r = resolver(&dir, provider);
        let resolved = r.resolve(&tile()).unwrap();
        assert!(resolved.present);
        assert_eq!(
            *r.provider().downloads.lock(),
            vec![WindowKind::Primary, WindowKind::Extended]
        );
    }

    #[test]
    fn test_fatal_provider_error_propagates() {
        let dir = TempDir::new().unwrap();
        let mut r = resolver(
            &dir,
            ScriptedProvider::new(vec![Err(ProviderError::EmptyResponse)], vec![]),
        );
        assert!(matches!(
            r.resolve(&tile()),
            Err(ResolveError::Provider(ProviderError::EmptyResponse))
        ));
    }

    #[test]
    fn test_window_with_coverage_threshold() {
        let dir = TempDir::new().unwrap();
        let mut r = resolver(&dir, ScriptedProvider::new(vec![Ok(0.5)], vec![Ok(0.9)]));
        let bbox = tile().bbox;
        let window = r.window_with_coverage(&bbox, 10, 10, 0.8).unwrap();
        assert_eq!(window.map(|w| w.kind), Some(WindowKind::Extended));

        let window = r.window_with_coverage(&bbox, 10, 10, 0.8).unwrap();
        assert_eq!(window, None);
    }

    #[test]
    fn test_resolve_in_window_skips_query() {
        let dir = TempDir::new().unwrap();
        let mut r = resolver(&dir, ScriptedProvider::new(vec![], vec![]));
        let window = config().windows.extended;
        let resolved = r.resolve_in_window(&tile(), window).unwrap();
        assert!(resolved.present);
        assert_eq!(r.remote_calls(), 1);
        assert_eq!(*r.provider().downloads.lock(), vec![WindowKind::Extended]);
    }
}
