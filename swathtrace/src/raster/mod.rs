//! Multi-band 8-bit rasters.
//!
//! Every raster in the crate (downloaded tiles, synthetic fills, night data
//! and outputs) is a [`BandRaster`]: an `H × W × 13` array of `u8` in the
//! canonical band order given by [`BANDS`].

mod codec;

pub use codec::{decode, encode, read_file, write_file, RasterError};

use ndarray::{s, Array3, ArrayView2};

/// Canonical band order shared by tiles, synthetic rasters and outputs.
pub const BANDS: [&str; 13] = [
    "B01", "B02", "B03", "B04", "B05", "B06", "B07", "B08", "B8A", "B09", "B11", "B12", "CLD",
];

/// Number of bands in every raster.
pub const BAND_COUNT: usize = BANDS.len();

/// Index of the cloud-probability band.
pub const CLOUD_BAND: usize = 12;

/// A 13-band `u8` raster laid out row-major as `(row, col, band)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandRaster {
    data: Array3<u8>,
}

impl BandRaster {
    /// All-zero raster.
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: Array3::zeros((height, width, BAND_COUNT)),
        }
    }

    /// The 1×1 all-zero raster stored for confirmed-empty tiles.
    pub fn placeholder() -> Self {
        Self::zeros(1, 1)
    }

    /// Wraps interleaved `(row, col, band)` bytes.
    pub fn from_interleaved(height: usize, width: usize, bytes: Vec<u8>) -> Result<Self, RasterError> {
        let expected = height * width * BAND_COUNT;
        if bytes.len() != expected {
            return Err(RasterError::Length {
                expected,
                actual: bytes.len(),
            });
        }
        let data = Array3::from_shape_vec((height, width, BAND_COUNT), bytes)
            .map_err(|e| RasterError::Shape(e.to_string()))?;
        Ok(Self { data })
    }

    pub fn from_array(data: Array3<u8>) -> Result<Self, RasterError> {
        let bands = data.dim().2;
        if bands != BAND_COUNT {
            return Err(RasterError::BandCount(bands));
        }
        Ok(Self { data })
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    /// True for the 1×1 confirmed-empty form.
    pub fn is_placeholder(&self) -> bool {
        self.height() == 1 && self.width() == 1
    }

    pub fn array(&self) -> &Array3<u8> {
        &self.data
    }

    pub fn array_mut(&mut self) -> &mut Array3<u8> {
        &mut self.data
    }

    /// One band as a 2-D view.
    pub fn band(&self, index: usize) -> ArrayView2<'_, u8> {
        self.data.slice(s![.., .., index])
    }

    /// Interleaved bytes in standard layout.
    pub fn to_interleaved(&self) -> Vec<u8> {
        self.data.iter().copied().collect()
    }

    /// Copies `rows × cols` pixels from `src` at `(src_row, src_col)` into
    /// this raster at `(dst_row, dst_col)`.
    ///
    /// The block is clipped to both rasters; nothing is written out of bounds.
    pub fn blit(
        &mut self,
        src: &BandRaster,
        (src_row, src_col): (usize, usize),
        (dst_row, dst_col): (usize, usize),
        (rows, cols): (usize, usize),
    ) {
        let rows = rows
            .min(src.height().saturating_sub(src_row))
            .min(self.height().saturating_sub(dst_row));
        let cols = cols
            .min(src.width().saturating_sub(src_col))
            .min(self.width().saturating_sub(dst_col));
        if rows == 0 || cols == 0 {
            return;
        }
        let block = src
            .data
            .slice(s![src_row..src_row + rows, src_col..src_col + cols, ..]);
        self.data
            .slice_mut(s![dst_row..dst_row + rows, dst_col..dst_col + cols, ..])
            .assign(&block);
    }

    /// Sub-raster starting at `(row, col)`, clipped to the source bounds.
    pub fn crop(&self, row: usize, col: usize, height: usize, width: usize) -> BandRaster {
        let row = row.min(self.height());
        let col = col.min(self.width());
        let height = height.min(self.height() - row);
        let width = width.min(self.width() - col);
        Self {
            data: self
                .data
                .slice(s![row..row + height, col..col + width, ..])
                .to_owned(),
        }
    }

    /// Nearest-neighbour upsampling by repeating each pixel `factor` times
    /// along both axes.
    pub fn repeat(&self, factor: usize) -> BandRaster {
        let factor = factor.max(1);
        let (h, w, b) = self.data.dim();
        let mut out = Array3::zeros((h * factor, w * factor, b));
        for ((row, col, band), value) in out.indexed_iter_mut() {
            *value = self.data[[row / factor, col / factor, band]];
        }
        Self { data: out }
    }
}
