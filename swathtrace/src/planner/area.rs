//! Coverage areas.

use rstar::{RTree, RTreeObject, AABB};

use super::PlanError;
use crate::geo::{square_around, BBox, LonLat};

struct AreaPart {
    bbox: BBox,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for AreaPart {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// A region to cover with tiles: a union of axis-aligned rectangles.
pub struct CoverageArea {
    parts: RTree<AreaPart>,
    bounds: BBox,
}

impl CoverageArea {
    /// Builds an area from rectangles.
    pub fn from_parts(parts: Vec<BBox>) -> Result<Self, PlanError> {
        if parts.is_empty() {
            return Err(PlanError::EmptyArea);
        }
        for part in &parts {
            BBox::new(part.min_lon, part.min_lat, part.max_lon, part.max_lat)?;
        }
        let bounds = parts[1..].iter().fold(parts[0], |acc, p| acc.union(p));
        let parts = parts
            .into_iter()
            .filter(BBox::has_area)
            .map(|bbox| AreaPart {
                env: bbox.envelope(),
                bbox,
            })
            .collect::<Vec<_>>();
        if parts.is_empty() {
            return Err(PlanError::EmptyArea);
        }
        Ok(Self {
            parts: RTree::bulk_load(parts),
            bounds,
        })
    }

    /// A single rectangle.
    pub fn from_bbox(bbox: BBox) -> Result<Self, PlanError> {
        Self::from_parts(vec![bbox])
    }

    /// The bounding rectangle of a closed polygon ring.
    pub fn from_ring(ring: &[LonLat]) -> Result<Self, PlanError> {
        if ring.len() < 3 {
            return Err(PlanError::EmptyArea);
        }
        Self::from_bbox(BBox::enclosing(ring))
    }

    /// The union of squares buffered around every point of a ground track.
    ///
    /// The half extent is half the diagonal of the swath square, so the area
    /// contains the swath whatever the spacecraft heading.
    pub fn from_track(points: &[LonLat], swath_width_m: f64) -> Result<Self, PlanError> {
        let half_extent = (2.0 * swath_width_m * swath_width_m).sqrt() / 2.0;
        let parts = points
            .iter()
            .map(|p| square_around(*p, half_extent))
            .collect();
        Self::from_parts(parts)
    }

    pub fn bounds(&self) -> BBox {
        self.bounds
    }

    pub fn part_count(&self) -> usize {
        self.parts.size()
    }

    /// Bounding box of `region ∩ area`, or `None` if they do not overlap.
    pub fn clip(&self, region: &BBox) -> Option<BBox> {
        self.parts
            .locate_in_envelope_intersecting(&region.envelope())
            .filter_map(|part| part.bbox.intersection(region))
            .reduce(|acc, b| acc.union(&b))
    }
}
