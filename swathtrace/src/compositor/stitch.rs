//! Spatial tile index and footprint stitching.

use rstar::{RTree, RTreeObject, AABB};

use crate::cache::TileRecord;
use crate::geo::{world_to_pixel, BBox, LonLat};
use crate::planner::TileDescriptor;
use crate::raster::BandRaster;

/// An indexed tile and whether it holds data.
#[derive(Debug, Clone)]
pub struct IndexedTile {
    pub tile: TileDescriptor,
    pub present: bool,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedTile {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// R-tree over tile bounding boxes.
pub struct TileIndex {
    tree: RTree<IndexedTile>,
}

impl TileIndex {
    pub fn new(tiles: impl IntoIterator<Item = (TileDescriptor, bool)>) -> Self {
        let entries = tiles
            .into_iter()
            .map(|(tile, present)| IndexedTile {
                env: tile.bbox.envelope(),
                tile,
                present,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn from_records(records: Vec<TileRecord>) -> Self {
        Self::new(records.into_iter().map(|r| (r.descriptor(), r.present)))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Tiles sharing area with `bbox`, ordered by tile id.
    pub fn intersecting(&self, bbox: &BBox) -> Vec<&IndexedTile> {
        let mut hits: Vec<&IndexedTile> = self
            .tree
            .locate_in_envelope_intersecting(&bbox.envelope())
            .filter(|t| t.tile.bbox.intersection(bbox).is_some())
            .collect();
        hits.sort_by(|a, b| a.tile.id.cmp(&b.tile.id));
        hits
    }
}

/// Copies the part of `tile` that falls inside `target_bbox` into `out`.
///
/// The overlap rectangle is mapped to pixels once in tile space and once in
/// output space. When the two pixel rectangles differ in size the smaller
/// extent wins, and the copy is clipped to both rasters. Returns the number
/// of pixels written.
pub fn stitch_tile(out: &mut BandRaster, target_bbox: &BBox, tile_bbox: &BBox, tile: &BandRaster) -> usize {
    let Some(overlap) = tile_bbox.intersection(target_bbox) else {
        return 0;
    };
    let sw = LonLat::new(overlap.min_lon, overlap.min_lat);
    let ne = LonLat::new(overlap.max_lon, overlap.max_lat);

    let (t_start, t_extent) = pixel_rect(sw, ne, tile_bbox, tile.width(), tile.height());
    let (i_start, i_extent) = pixel_rect(sw, ne, target_bbox, out.width(), out.height());

    let cols = t_extent.0.min(i_extent.0);
    let rows = t_extent.1.min(i_extent.1);
    if cols == 0 || rows == 0 {
        return 0;
    }
    out.blit(tile, (t_start.1, t_start.0), (i_start.1, i_start.0), (rows, cols));

    let rows = rows
        .min(tile.height().saturating_sub(t_start.1))
        .min(out.height().saturating_sub(i_start.1));
    let cols = cols
        .min(tile.width().saturating_sub(t_start.0))
        .min(out.width().saturating_sub(i_start.0));
    rows * cols
}

/// Pixel `(col, row)` origin and `(cols, rows)` extent of a world rectangle,
/// clamped to the raster.
fn pixel_rect(sw: LonLat, ne: LonLat, bbox: &BBox, width: usize, height: usize) -> ((usize, usize), (usize, usize)) {
    let (c0, r0) = world_to_pixel(sw, bbox, width, height);
    let (c1, r1) = world_to_pixel(ne, bbox, width, height);
    let clamp_x = |v: i64| v.clamp(0, width as i64) as usize;
    let clamp_y = |v: i64| v.clamp(0, height as i64) as usize;
    let (x0, x1) = (clamp_x(c0.min(c1)), clamp_x(c0.max(c1)));
    let (y0, y1) = (clamp_y(r0.min(r1)), clamp_y(r0.max(r1)));
    ((x0, y0), (x1 - x0, y1 - y0))
}
