//! On-disk tile cache.
//!
//! Each resolved tile is stored as two files keyed by its id:
//!
//! - `data-<id>.swr` - the raster (a 1×1 zero raster for confirmed-empty tiles)
//! - `tile-<id>.bbox` - a bincode [`TileRecord`] with the geometry and presence
//!
//! The raster is written before the record, so a record on disk always has
//! its data next to it. Entries are write-once, except that a confirmed-empty
//! placeholder may later be replaced by real data.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CacheError;
use crate::geo::BBox;
use crate::planner::{TileDescriptor, TileId};
use crate::raster::{self, BandRaster};

const DATA_PREFIX: &str = "data-";
const DATA_EXT: &str = "swr";
const RECORD_PREFIX: &str = "tile-";
const RECORD_EXT: &str = "bbox";

/// Geometry and presence of a cached tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub id: TileId,
    pub bbox: BBox,
    pub present: bool,
}

impl TileRecord {
    pub fn descriptor(&self) -> TileDescriptor {
        TileDescriptor {
            id: self.id.clone(),
            bbox: self.bbox,
        }
    }
}

/// A tile read back from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTile {
    pub record: TileRecord,
    pub raster: BandRaster,
}

/// Cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileCacheStats {
    pub present: usize,
    pub placeholders: usize,
    pub bytes: u64,
}

/// Directory-backed tile cache.
#[derive(Debug, Clone)]
pub struct TileCache {
    dir: PathBuf,
}

impl TileCache {
    /// Opens (and creates if needed) a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn data_path(&self, id: &TileId) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", DATA_PREFIX, id, DATA_EXT))
    }

    pub fn record_path(&self, id: &TileId) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", RECORD_PREFIX, id, RECORD_EXT))
    }

    /// Reads a tile's record without loading its raster.
    pub fn record(&self, id: &TileId) -> Result<Option<TileRecord>, CacheError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path).map(Some)
    }

    /// Loads a cached tile.
    pub fn get(&self, id: &TileId) -> Result<Option<CachedTile>, CacheError> {
        let Some(record) = self.record(id)? else {
            return Ok(None);
        };
        let path = self.data_path(id);
        let raster = raster::read_file(&path).map_err(|e| CacheError::raster(&path, e))?;
        Ok(Some(CachedTile { record, raster }))
    }

    /// True if an entry exists and holds real data.
    pub fn has_data(&self, id: &TileId) -> Result<bool, CacheError> {
        Ok(self.record(id)?.map(|r| r.present).unwrap_or(false))
    }

    /// Stores resolved data for a tile.
    pub fn put(&self, tile: &TileDescriptor, raster: &BandRaster) -> Result<(), CacheError> {
        self.store(tile, raster, true)
    }

    /// Stores a confirmed-empty placeholder for a tile.
    pub fn put_placeholder(&self, tile: &TileDescriptor) -> Result<(), CacheError> {
        self.store(tile, &BandRaster::placeholder(), false)
    }

    fn store(&self, tile: &TileDescriptor, raster: &BandRaster, present: bool) -> Result<(), CacheError> {
        if let Some(existing) = self.record(&tile.id)? {
            if existing.present {
                return Err(CacheError::AlreadyResolved(tile.id.clone()));
            }
            if !present {
                return Ok(());
            }
        }

        let data_path = self.data_path(&tile.id);
        raster::write_file(&data_path, raster).map_err(|e| CacheError::raster(&data_path, e))?;

        let record = TileRecord {
            id: tile.id.clone(),
            bbox: tile.bbox,
            present,
        };
        let record_path = self.record_path(&tile.id);
        write_record(&record_path, &record)?;
        debug!(tile_id = %tile.id, present, "Cached tile");
        Ok(())
    }

    /// Every record in the cache, sorted by tile id.
    pub fn records(&self) -> Result<Vec<TileRecord>, CacheError> {
        let pattern = self
            .dir
            .join(format!("{}*.{}", RECORD_PREFIX, RECORD_EXT));
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|e| CacheError::Pattern(e.to_string()))?;

        let mut records = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => records.push(read_record(&path)?),
                Err(e) => warn!(error = %e, "Unreadable tile cache entry"),
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    /// Ids of entries holding real data, sorted.
    pub fn present_ids(&self) -> Result<Vec<TileId>, CacheError> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.present)
            .map(|r| r.id)
            .collect())
    }

    pub fn stats(&self) -> Result<TileCacheStats, CacheError> {
        let mut stats = TileCacheStats::default();
        for record in self.records()? {
            if record.present {
                stats.present += 1;
            } else {
                stats.placeholders += 1;
            }
            for path in [self.data_path(&record.id), self.record_path(&record.id)] {
                stats.bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(stats)
    }
}

fn read_record(path: &Path) -> Result<TileRecord, CacheError> {
    let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|e| CacheError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_record(path: &Path, record: &TileRecord) -> Result<(), CacheError> {
    let temp_path = path.with_extension("tmp");
    let write = || -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        bincode::serialize_into(&mut writer, record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        writer.flush()?;
        fs::rename(&temp_path, path)
    };
    write().map_err(|e| CacheError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tile(offset: f64) -> TileDescriptor {
        TileDescriptor::new(BBox::new(offset, 0.0, offset + 0.1, 0.1).unwrap())
    }

    fn raster() -> BandRaster {
        let mut r = BandRaster::zeros(4, 3);
        r.array_mut().fill(7);
        r
    }

    #[test]
    fn test_missing_entry() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        assert!(cache.get(&tile(0.0).id).unwrap().is_none());
        assert!(!cache.has_data(&tile(0.0).id).unwrap());
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let t = tile(0.0);
        cache.put(&t, &raster()).unwrap();

        let cached = cache.get(&t.id).unwrap().unwrap();
        assert!(cached.record.present);
        assert_eq!(cached.record.bbox, t.bbox);
        assert_eq!(cached.raster, raster());
        assert!(cache.data_path(&t.id).exists());
        assert!(cache
            .data_path(&t.id)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("data-"));
    }

    #[test]
    fn test_present_entry_is_write_once() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let t = tile(0.0);
        cache.put(&t, &raster()).unwrap();
        assert!(matches!(
            cache.put(&t, &BandRaster::zeros(1, 2)),
            Err(CacheError::AlreadyResolved(_))
        ));
        assert!(matches!(
            cache.put_placeholder(&t),
            Err(CacheError::AlreadyResolved(_))
        ));
    }

    #[test]
    fn test_placeholder_can_be_upgraded() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let t = tile(0.0);
        cache.put_placeholder(&t).unwrap();
        let cached = cache.get(&t.id).unwrap().unwrap();
        assert!(!cached.record.present);
        assert!(cached.raster.is_placeholder());

        cache.put(&t, &raster()).unwrap();
        assert!(cache.has_data(&t.id).unwrap());
    }

    #[test]
    fn test_records_and_stats() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        cache.put(&tile(0.0), &raster()).unwrap();
        cache.put(&tile(1.0), &raster()).unwrap();
        cache.put_placeholder(&tile(2.0)).unwrap();

        assert_eq!(cache.records().unwrap().len(), 3);
        assert_eq!(cache.present_ids().unwrap().len(), 2);
        let stats = cache.stats().unwrap();
        assert_eq!(stats.present, 2);
        assert_eq!(stats.placeholders, 1);
        assert!(stats.bytes > 0);
    }

    #[test]
    fn test_corrupt_data_reported() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path()).unwrap();
        let t = tile(0.0);
        cache.put(&t, &raster()).unwrap();
        fs::write(cache.data_path(&t.id), b"garbage").unwrap();
        assert!(matches!(cache.get(&t.id), Err(CacheError::Corrupt { .. })));
    }
}
