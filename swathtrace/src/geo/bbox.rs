//! Axis-aligned WGS84 bounding boxes.

use std::fmt;

use rstar::AABB;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::{LonLat, EARTH_RADIUS_M};

/// Errors from constructing geometry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Non-finite coordinate in bounding box: {0:?}")]
    NonFinite([f64; 4]),

    #[error("Inverted bounding box: min ({min_lon}, {min_lat}) > max ({max_lon}, {max_lat})")]
    Inverted {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },
}

/// An axis-aligned rectangle in longitude/latitude degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BBox {
    /// Creates a validated bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, GeoError> {
        let coords = [min_lon, min_lat, max_lon, max_lat];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(GeoError::NonFinite(coords));
        }
        if min_lon > max_lon || min_lat > max_lat {
            return Err(GeoError::Inverted {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Smallest box containing every point.
    ///
    /// Callers must pass at least one point.
    pub fn enclosing(points: &[LonLat]) -> Self {
        let mut bbox = Self {
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        };
        for p in points {
            bbox.min_lon = bbox.min_lon.min(p.lon);
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.max_lon = bbox.max_lon.max(p.lon);
            bbox.max_lat = bbox.max_lat.max(p.lat);
        }
        bbox
    }

    #[inline]
    pub fn width_deg(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    #[inline]
    pub fn height_deg(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn center(&self) -> LonLat {
        LonLat::new(
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }

    /// True if the box encloses a positive area.
    #[inline]
    pub fn has_area(&self) -> bool {
        self.width_deg() > 0.0 && self.height_deg() > 0.0
    }

    /// Overlap of two boxes, or `None` when they share no area.
    ///
    /// Boxes that only touch along an edge do not intersect.
    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let out = BBox {
            min_lon: self.min_lon.max(other.min_lon),
            min_lat: self.min_lat.max(other.min_lat),
            max_lon: self.max_lon.min(other.max_lon),
            max_lat: self.max_lat.min(other.max_lat),
        };
        out.has_area().then_some(out)
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    /// Copy with latitudes clamped into `[lo, hi]`.
    pub fn clamp_lat(&self, lo: f64, hi: f64) -> BBox {
        BBox {
            min_lat: self.min_lat.clamp(lo, hi),
            max_lat: self.max_lat.clamp(lo, hi),
            ..*self
        }
    }

    /// Approximate side lengths in metres, using the centre latitude for the
    /// east-west scale.
    pub fn size_m(&self) -> (f64, f64) {
        let cos_lat = self.center().lat.to_radians().cos();
        let width = self.width_deg().to_radians() * EARTH_RADIUS_M * cos_lat;
        let height = self.height_deg().to_radians() * EARTH_RADIUS_M;
        (width.abs(), height.abs())
    }

    /// Estimated `(width_px, height_px)` of this box at `resolution_m`.
    pub fn dimensions_px(&self, resolution_m: f64) -> (u32, u32) {
        let (w, h) = self.size_m();
        (
            (w / resolution_m).round() as u32,
            (h / resolution_m).round() as u32,
        )
    }

    /// Splits into a `cols × rows` grid, ordered column-major (west to east,
    /// then south to north inside each column).
    pub fn grid(&self, cols: usize, rows: usize) -> Vec<BBox> {
        let cols = cols.max(1);
        let rows = rows.max(1);
        let dx = self.width_deg() / cols as f64;
        let dy = self.height_deg() / rows as f64;
        let mut cells = Vec::with_capacity(cols * rows);
        for i in 0..cols {
            let min_lon = self.min_lon + dx * i as f64;
            let max_lon = if i + 1 == cols {
                self.max_lon
            } else {
                self.min_lon + dx * (i + 1) as f64
            };
            for j in 0..rows {
                let min_lat = self.min_lat + dy * j as f64;
                let max_lat = if j + 1 == rows {
                    self.max_lat
                } else {
                    self.min_lat + dy * (j + 1) as f64
                };
                cells.push(BBox {
                    min_lon,
                    min_lat,
                    max_lon,
                    max_lat,
                });
            }
        }
        cells
    }

    /// Envelope for R-tree indexing.
    pub fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lon, self.min_lat], [self.max_lon, self.max_lat])
    }

    /// Stable 16-hex-digit identifier derived from the exact coordinates.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for c in [self.min_lon, self.min_lat, self.max_lon, self.max_lat] {
            hasher.update(c.to_le_bytes());
        }
        let digest = hasher.finalize();
        digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6}, {:.6}]",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted() {
        assert!(matches!(
            BBox::new(1.0, 0.0, 0.0, 1.0),
            Err(GeoError::Inverted { .. })
        ));
    }

    #[test]
    fn test_new_rejects_nan() {
        assert!(matches!(
            BBox::new(f64::NAN, 0.0, 1.0, 1.0),
            Err(GeoError::NonFinite(_))
        ));
    }

    #[test]
    fn test_intersection_touching_edges_is_none() {
        let a = BBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = BBox::new(1.0, 0.0, 2.0, 1.0).unwrap();
        assert_eq!(a.intersection(&b), None);
    }

    #[test]
    fn test_intersection_overlap() {
        let a = BBox::new(0.0, 0.0, 2.0, 2.0).unwrap();
        let b = BBox::new(1.0, 1.0, 3.0, 3.0).unwrap();
        assert_eq!(a.intersection(&b), Some(BBox::new(1.0, 1.0, 2.0, 2.0).unwrap()));
    }

    #[test]
    fn test_grid_covers_box_exactly() {
        let bbox = BBox::new(-1.0, 10.0, 2.0, 12.0).unwrap();
        let cells = bbox.grid(3, 2);
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0].min_lon, -1.0);
        assert_eq!(cells[0].min_lat, 10.0);
        assert_eq!(cells[5].max_lon, 2.0);
        assert_eq!(cells[5].max_lat, 12.0);
        // column-major: second cell is north of the first
        assert_eq!(cells[1].min_lon, -1.0);
        assert_eq!(cells[1].min_lat, 11.0);
    }

    #[test]
    fn test_dimensions_at_equator() {
        // 0.01 degrees is ~1112 m at the equator
        let bbox = BBox::new(0.0, -0.005, 0.01, 0.005).unwrap();
        let (w, h) = bbox.dimensions_px(10.0);
        assert_eq!(w, 111);
        assert_eq!(h, 111);
    }

    #[test]
    fn test_digest_is_stable_and_distinct() {
        let a = BBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = BBox::new(0.0, 0.0, 1.0, 1.000001).unwrap();
        assert_eq!(a.digest(), a.digest());
        assert_eq!(a.digest().len(), 16);
        assert_ne!(a.digest(), b.digest());
    }
}
