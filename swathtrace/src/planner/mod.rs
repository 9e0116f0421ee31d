//! Area planning module
//!
//! Partitions a coverage area into tiles the imagery provider will accept in a
//! single request.
//!
//! # Algorithm
//!
//! 1. Lay a regular grid over the area's bounds. The grid step is the
//!    provider's pixel budget converted to degrees at the equator, shrunk by a
//!    safety factor.
//! 2. Reduce every cell to the bounding box of its overlap with the area and
//!    drop cells that miss it.
//! 3. Clamp cells into the provider's latitude range, dropping cells that lie
//!    entirely outside it.
//! 4. Estimate each cell's pixel dimensions. Oversized cells are split again
//!    on their own geometry, recursively, until everything fits.
//!
//! The planner is a pure function: the same area and configuration always
//! produce the same tiles in the same order.

mod area;

pub use area::CoverageArea;

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::geo::{max_tile_degrees, BBox, GeoError, MAX_TILE_LAT, MIN_TILE_LAT};

/// Maximum number of recursive re-splits of a single cell.
const MAX_SPLIT_DEPTH: u32 = 16;

/// Errors from planning a coverage area.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Coverage area is empty")]
    EmptyArea,

    #[error("Invalid coverage geometry: {0}")]
    InvalidGeometry(#[from] GeoError),

    #[error("Invalid planner configuration: {0}")]
    InvalidConfig(String),

    #[error("Tile {0} could not be reduced below the pixel budget")]
    SplitDepthExceeded(BBox),

    #[error("Plan file error: {0}")]
    Io(#[from] io::Error),
}

/// Stable identifier of a planned tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(String);

impl TileId {
    pub fn for_bbox(bbox: &BBox) -> Self {
        Self(bbox.digest())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A provider-legal rectangle awaiting resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub id: TileId,
    pub bbox: BBox,
}

impl TileDescriptor {
    pub fn new(bbox: BBox) -> Self {
        Self {
            id: TileId::for_bbox(&bbox),
            bbox,
        }
    }
}

/// Planner parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerConfig {
    /// Ground resolution of downloads in metres per pixel.
    pub resolution_m: f64,
    /// Provider limit on either pixel dimension of one request.
    pub max_download_px: u32,
    /// Fraction of the budget the grid step targets.
    pub safety_factor: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            resolution_m: 10.0,
            max_download_px: 2500,
            safety_factor: 0.95,
        }
    }
}

impl PlannerConfig {
    fn validate(&self) -> Result<(), PlanError> {
        if !(self.resolution_m.is_finite() && self.resolution_m > 0.0) {
            return Err(PlanError::InvalidConfig(format!(
                "resolution_m must be positive, got {}",
                self.resolution_m
            )));
        }
        if self.max_download_px == 0 {
            return Err(PlanError::InvalidConfig(
                "max_download_px must be at least 1".to_string(),
            ));
        }
        if !(self.safety_factor > 0.0 && self.safety_factor <= 1.0) {
            return Err(PlanError::InvalidConfig(format!(
                "safety_factor must be in (0, 1], got {}",
                self.safety_factor
            )));
        }
        Ok(())
    }
}

/// Partitions `area` into tiles within the pixel budget.
pub fn plan_tiles(area: &CoverageArea, config: &PlannerConfig) -> Result<Vec<TileDescriptor>, PlanError> {
    config.validate()?;

    let bounds = area.bounds();
    let step = max_tile_degrees(config.max_download_px, config.resolution_m, config.safety_factor);
    let cols = (bounds.width_deg() / step).ceil() as usize;
    let rows = (bounds.height_deg() / step).ceil() as usize;
    debug!(
        bounds = %bounds,
        parts = area.part_count(),
        cols,
        rows,
        "Planning coverage area"
    );

    let mut tiles = Vec::new();
    let mut seen = HashSet::new();
    for cell in bounds.grid(cols, rows) {
        split_cell(area, &cell, config, 0, &mut |bbox| {
            let tile = TileDescriptor::new(bbox);
            if seen.insert(tile.id.clone()) {
                tiles.push(tile);
            }
        })?;
    }

    debug!(tiles = tiles.len(), "Planned coverage area");
    Ok(tiles)
}

fn split_cell(
    area: &CoverageArea,
    cell: &BBox,
    config: &PlannerConfig,
    depth: u32,
    emit: &mut dyn FnMut(BBox),
) -> Result<(), PlanError> {
    let Some(reduced) = area.clip(cell) else {
        return Ok(());
    };
    if reduced.max_lat < MIN_TILE_LAT || reduced.min_lat > MAX_TILE_LAT {
        trace!(cell = %reduced, "Dropping tile outside served latitudes");
        return Ok(());
    }
    let clamped = reduced.clamp_lat(MIN_TILE_LAT, MAX_TILE_LAT);
    if !clamped.has_area() {
        return Ok(());
    }

    let (width_px, height_px) = clamped.dimensions_px(config.resolution_m);
    if width_px == 0 || height_px == 0 {
        trace!(cell = %clamped, "Dropping sub-pixel tile");
        return Ok(());
    }
    if width_px <= config.max_download_px && height_px <= config.max_download_px {
        emit(clamped);
        return Ok(());
    }

    if depth >= MAX_SPLIT_DEPTH {
        return Err(PlanError::SplitDepthExceeded(clamped));
    }
    let target = (f64::from(config.max_download_px) * config.safety_factor).max(1.0);
    let cols = (f64::from(width_px) / target).ceil() as usize;
    let rows = (f64::from(height_px) / target).ceil() as usize;
    trace!(cell = %clamped, width_px, height_px, cols, rows, "Re-splitting oversized tile");
    for sub in clamped.grid(cols, rows) {
        split_cell(area, &sub, config, depth + 1, emit)?;
    }
    Ok(())
}

/// Size statistics of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub tiles: usize,
    pub total_pixels: u64,
    pub max_width_px: u32,
    pub max_height_px: u32,
}

impl PlanStats {
    pub fn of(tiles: &[TileDescriptor], resolution_m: f64) -> Self {
        tiles.iter().fold(
            Self {
                tiles: tiles.len(),
                ..Self::default()
            },
            |mut acc, tile| {
                let (w, h) = tile.bbox.dimensions_px(resolution_m);
                acc.total_pixels += u64::from(w) * u64::from(h);
                acc.max_width_px = acc.max_width_px.max(w);
                acc.max_height_px = acc.max_height_px.max(h);
                acc
            },
        )
    }
}

/// Writes a plan atomically.
pub fn save_plan(path: &Path, tiles: &[TileDescriptor]) -> Result<(), PlanError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        bincode::serialize_into(&mut writer, tiles)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Loads a plan written by [`save_plan`].
pub fn load_plan(path: &Path) -> Result<Vec<TileDescriptor>, PlanError> {
    let reader = BufReader::new(File::open(path)?);
    let tiles = bincode::deserialize_from(reader)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(tiles)
}
