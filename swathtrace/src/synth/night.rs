//! Night-side image synthesis.

use std::path::Path;

use rand::Rng;
use tracing::debug;

use super::SynthError;
use crate::raster::{self, BandRaster, CLOUD_BAND};
use crate::track::GroundPoint;

/// Band indices that carry night radiance.
const RADIANCE_BANDS: [usize; 2] = [10, 11];

/// Where in the night raster a sample's window starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NightOffset {
    /// Uniformly random, from the per-sample RNG.
    #[default]
    Seeded,
    /// Derived from the sample's own coordinates.
    PointDerived,
}

/// Cuts night images out of one preloaded low-resolution raster.
#[derive(Debug, Clone)]
pub struct NightImageSynthesizer {
    raster: BandRaster,
    ratio: usize,
    offset: NightOffset,
}

impl NightImageSynthesizer {
    /// # Arguments
    ///
    /// * `raster` - 13-band night raster
    /// * `night_resolution_m` - Ground resolution of `raster`
    /// * `resolution_m` - Ground resolution of the images to produce
    /// * `offset` - Window placement strategy
    pub fn new(raster: BandRaster, night_resolution_m: f64, resolution_m: f64, offset: NightOffset) -> Self {
        let ratio = ((night_resolution_m / resolution_m) as usize).max(1);
        Self {
            raster,
            ratio,
            offset,
        }
    }

    /// Loads the night raster from a raster file.
    pub fn load(path: &Path, night_resolution_m: f64, resolution_m: f64, offset: NightOffset) -> Result<Self, SynthError> {
        let raster = raster::read_file(path)?;
        debug!(
            path = %path.display(),
            width = raster.width(),
            height = raster.height(),
            "Loaded night raster"
        );
        Ok(Self::new(raster, night_resolution_m, resolution_m, offset))
    }

    /// Upsampling factor between the night raster and output images.
    pub fn ratio(&self) -> usize {
        self.ratio
    }

    /// Produces a `height × width` night image for `point`.
    pub fn synthesize(
        &self,
        point: &GroundPoint,
        height: usize,
        width: usize,
        rng: &mut impl Rng,
    ) -> Result<BandRaster, SynthError> {
        let window_h = height.div_ceil(self.ratio);
        let window_w = width.div_ceil(self.ratio);
        let (src_h, src_w) = (self.raster.height(), self.raster.width());
        if src_h < window_h || src_w < window_w {
            return Err(SynthError::NightRasterTooSmall {
                width: src_w,
                height: src_h,
                need_width: window_w,
                need_height: window_h,
            });
        }

        let max_x = src_w - window_w;
        let max_y = src_h - window_h;
        let (x, y) = match self.offset {
            NightOffset::Seeded => (rng.random_range(0..=max_x), rng.random_range(0..=max_y)),
            NightOffset::PointDerived => (
                derived_offset(point.lon * point.lat, max_x),
                derived_offset(point.lat * point.altitude_km, max_y),
            ),
        };

        let window = self.raster.crop(y, x, window_h, window_w);
        Ok(window.repeat(self.ratio).crop(0, 0, height, width))
    }
}

fn derived_offset(value: f64, max: usize) -> usize {
    (value.trunc() as i64).rem_euclid(max as i64 + 1) as usize
}

/// Inputs for building a night raster.
#[derive(Debug, Clone)]
pub struct NightBands {
    pub width: usize,
    pub height: usize,
    /// 16-bit radiance, first channel.
    pub m10: Vec<u16>,
    /// 16-bit radiance, second channel.
    pub m11: Vec<u16>,
    /// 8-bit cloud mask; the top two bits hold the confidence class.
    pub cloud_mask: Vec<u8>,
}

/// Builds a 13-band night raster: radiance in bands 10 and 11, cloud
/// probability in the cloud band, zeros elsewhere.
pub fn import_night_bands(bands: &NightBands) -> Result<BandRaster, SynthError> {
    let expected = bands.width * bands.height;
    for (name, len) in [
        ("m10", bands.m10.len()),
        ("m11", bands.m11.len()),
        ("cloud_mask", bands.cloud_mask.len()),
    ] {
        if len != expected {
            return Err(SynthError::NightBandMismatch(format!(
                "{} has {} pixels, expected {}",
                name, len, expected
            )));
        }
    }

    let mut out = BandRaster::zeros(bands.height, bands.width);
    let data = out.array_mut();
    for i in 0..expected {
        let (row, col) = (i / bands.width, i % bands.width);
        data[[row, col, RADIANCE_BANDS[0]]] = scale_radiance(bands.m10[i]);
        data[[row, col, RADIANCE_BANDS[1]]] = scale_radiance(bands.m11[i]);
        data[[row, col, CLOUD_BAND]] = cloud_probability(bands.cloud_mask[i]);
    }
    Ok(out)
}

#[inline]
fn scale_radiance(value: u16) -> u8 {
    (value / 255).min(255) as u8
}

/// Maps the two confidence bits to 0, 33, 66 or 100.
#[inline]
fn cloud_probability(mask: u8) -> u8 {
    (u32::from(mask & 0b1100_0000) * 100 / 192) as u8
}
