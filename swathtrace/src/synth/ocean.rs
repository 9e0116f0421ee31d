//! Ocean fill synthesis.

use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, trace};

use super::SynthError;
use crate::cache::TileCache;
use crate::raster::{self, BandRaster};

/// How the next pool tile is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OceanSelection {
    /// Uniformly random, from the per-sample RNG.
    #[default]
    Seeded,
    /// Cycles through the pool based on the fill position.
    RoundRobin,
}

#[derive(Debug, Clone)]
enum PoolEntry {
    Disk(PathBuf),
    Memory(BandRaster),
}

/// Fills rasters from a fixed pool of open-ocean reference tiles.
///
/// The pool is fixed at construction; synthesized images are never added
/// back to it.
#[derive(Debug, Clone)]
pub struct OceanTileSynthesizer {
    pool: Vec<PoolEntry>,
    selection: OceanSelection,
}

impl OceanTileSynthesizer {
    /// Uses every tile with data in an ocean tile cache, in tile id order.
    /// Tiles are read from disk when placed.
    pub fn from_cache(cache: &TileCache, selection: OceanSelection) -> Result<Self, SynthError> {
        let pool: Vec<PoolEntry> = cache
            .present_ids()?
            .iter()
            .map(|id| PoolEntry::Disk(cache.data_path(id)))
            .collect();
        debug!(dir = %cache.dir().display(), tiles = pool.len(), "Loaded ocean tile pool");
        Self::with_pool(pool, selection)
    }

    /// Uses in-memory rasters as the pool.
    pub fn from_rasters(rasters: Vec<BandRaster>, selection: OceanSelection) -> Result<Self, SynthError> {
        Self::with_pool(rasters.into_iter().map(PoolEntry::Memory).collect(), selection)
    }

    fn with_pool(pool: Vec<PoolEntry>, selection: OceanSelection) -> Result<Self, SynthError> {
        if pool.is_empty() {
            return Err(SynthError::NoOceanTiles);
        }
        Ok(Self { pool, selection })
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    fn load(&self, index: usize) -> Result<BandRaster, SynthError> {
        let tile = match &self.pool[index] {
            PoolEntry::Memory(raster) => raster.clone(),
            PoolEntry::Disk(path) => read_pool_tile(path)?,
        };
        if tile.height() == 0 || tile.width() == 0 {
            return Err(SynthError::EmptyOceanTile(index));
        }
        Ok(tile)
    }

    fn select(&self, height: usize, width: usize, x: usize, y: usize, rng: &mut impl Rng) -> usize {
        match self.selection {
            OceanSelection::Seeded => rng.random_range(0..self.pool.len()),
            OceanSelection::RoundRobin => (height + width + x + y) % self.pool.len(),
        }
    }

    /// Produces a `height × width` raster tiled from the pool.
    ///
    /// Tiles are placed left to right in row bands, each truncated at the
    /// right and bottom edges. A band is as tall as its shortest tile.
    pub fn fill(&self, height: usize, width: usize, rng: &mut impl Rng) -> Result<BandRaster, SynthError> {
        let mut out = BandRaster::zeros(height, width);
        let mut y = 0;
        while y < height {
            let mut x = 0;
            let mut band_height = usize::MAX;
            while x < width {
                let index = self.select(height, width, x, y, rng);
                let tile = self.load(index)?;
                let w = tile.width().min(width - x);
                let h = tile.height().min(height - y);
                trace!(index, x, y, w, h, "Placing ocean tile");
                out.blit(&tile, (0, 0), (y, x), (h, w));
                x += w;
                band_height = band_height.min(h);
            }
            y += band_height;
        }
        Ok(out)
    }
}

fn read_pool_tile(path: &Path) -> Result<BandRaster, SynthError> {
    Ok(raster::read_file(path)?)
}
