//! Geographic helpers module
//!
//! Small-angle conversions between metres and WGS84 degrees, great-circle
//! distance, and pixel mapping inside a bounding box.
//!
//! All conversions here are flat-Earth approximations around a single
//! reference latitude. They degrade near the poles and the antimeridian.

mod bbox;

pub use bbox::{BBox, GeoError};

/// Mean Earth radius used for distances and metre offsets.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Equatorial circumference used to derive the planner's grid step.
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_075_000.0;

/// Southernmost latitude the imagery provider will serve.
pub const MIN_TILE_LAT: f64 = -80.0;

/// Northernmost latitude the imagery provider will serve.
pub const MAX_TILE_LAT: f64 = 84.0;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Great-circle distance in metres between two positions.
///
/// Uses the haversine formula on a sphere of radius [`EARTH_RADIUS_M`].
#[inline]
pub fn haversine_m(a: LonLat, b: LonLat) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Offsets a position by `dx_m` metres east and `dy_m` metres north.
///
/// The longitude scale uses the cosine of the *original* latitude, so every
/// corner of a square built around one centre shares the same scale. The
/// result longitude is wrapped once by ±360° and the latitude is clamped into
/// [-90°, 90°].
///
/// # Arguments
///
/// * `origin` - Position to offset from
/// * `dx_m` - Eastward offset in metres
/// * `dy_m` - Northward offset in metres
#[inline]
pub fn offset_m(origin: LonLat, dx_m: f64, dy_m: f64) -> LonLat {
    let deg_per_rad = 180.0 / std::f64::consts::PI;
    let mut lat = origin.lat + (dy_m / EARTH_RADIUS_M) * deg_per_rad;
    let mut lon =
        origin.lon + (dx_m / EARTH_RADIUS_M) * deg_per_rad / origin.lat.to_radians().cos();

    if lon > 180.0 {
        lon -= 360.0;
    } else if lon < -180.0 {
        lon += 360.0;
    }
    lat = lat.clamp(-90.0, 90.0);

    LonLat { lon, lat }
}

/// Bounding box of the square with half side `half_extent_m` around `center`.
pub fn square_around(center: LonLat, half_extent_m: f64) -> BBox {
    let corners = [
        offset_m(center, -half_extent_m, -half_extent_m),
        offset_m(center, half_extent_m, -half_extent_m),
        offset_m(center, half_extent_m, half_extent_m),
        offset_m(center, -half_extent_m, half_extent_m),
    ];
    BBox::enclosing(&corners)
}

/// Grid step in degrees for tiles of at most `max_px` pixels at `resolution_m`.
#[inline]
pub fn max_tile_degrees(max_px: u32, resolution_m: f64, safety_factor: f64) -> f64 {
    let deg_per_m = 360.0 / EARTH_CIRCUMFERENCE_M;
    f64::from(max_px) * resolution_m * deg_per_m * safety_factor
}

/// Maps a world position to a (column, row) pixel index inside `bbox`.
///
/// Row 0 is the northern edge. Values are rounded half-to-even and are not
/// clamped, so positions outside the box map outside `[0, width] × [0, height]`.
#[inline]
pub fn world_to_pixel(point: LonLat, bbox: &BBox, width: usize, height: usize) -> (i64, i64) {
    let col = (point.lon - bbox.min_lon) / bbox.width_deg() * width as f64;
    let row = (bbox.max_lat - point.lat) / bbox.height_deg() * height as f64;
    (col.round_ties_even() as i64, row.round_ties_even() as i64)
}
