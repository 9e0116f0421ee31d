//! Persistence layer
//!
//! - [`TileCache`] - resolved coverage tiles, keyed by tile id
//! - [`OutputStore`] - finished swath images, keyed by sample id
//! - [`TraceLog`] - the ordered list of samples a run emitted
//!
//! Every write is atomic (temporary name, then rename), so an interrupted
//! run leaves only complete entries behind and can simply be started again.

mod outputs;
mod tiles;
mod trace_log;

pub use outputs::{OutputFormat, OutputStore};
pub use tiles::{CachedTile, TileCache, TileCacheStats, TileRecord};
pub use trace_log::{read_trace_log, TraceEntry, TraceLog};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::planner::TileId;
use crate::raster::RasterError;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt cache entry {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Image error on {path}: {reason}")]
    Image { path: PathBuf, reason: String },

    #[error("Tile {0} is already resolved")]
    AlreadyResolved(TileId),

    #[error("Missing entry {0}")]
    Missing(PathBuf),

    #[error("Invalid sample id '{0}'")]
    InvalidSampleId(String),

    #[error("Invalid cache pattern: {0}")]
    Pattern(String),
}

impl CacheError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn raster(path: &Path, error: RasterError) -> Self {
        match error {
            RasterError::Io(source) => CacheError::io(path, source),
            other => CacheError::Corrupt {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }
}
