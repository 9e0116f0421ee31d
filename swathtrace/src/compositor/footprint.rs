//! Instantaneous ground footprints.

use crate::geo::{square_around, BBox, LonLat};

/// The square of ground the sensor sees at one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub center: LonLat,
    pub bbox: BBox,
    pub width_px: usize,
    pub height_px: usize,
}

impl Footprint {
    /// Footprint of side `swath_width_m` centred on `center`.
    ///
    /// The pixel shape is `swath_width_m / resolution_m` on both axes,
    /// rounded down.
    pub fn around(center: LonLat, swath_width_m: f64, resolution_m: f64) -> Self {
        let side_px = (swath_width_m / resolution_m).floor().max(0.0) as usize;
        Self {
            center,
            bbox: square_around(center, swath_width_m / 2.0),
            width_px: side_px,
            height_px: side_px,
        }
    }
}
