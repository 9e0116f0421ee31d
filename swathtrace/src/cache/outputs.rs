//! Output image store keyed by sample id.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{GrayImage, ImageFormat};
use rayon::prelude::*;
use tracing::debug;

use super::CacheError;
use crate::raster::{self, BandRaster, BANDS};

/// How finished swath images are laid out on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// A directory `<id>/` with one 8-bit grayscale `<id>_<BAND>.tiff` per band.
    #[default]
    BandTiffs,
    /// A single compressed 13-band raster `<id>.swr`.
    Packed,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tiffs" | "tiff" | "band-tiffs" => Ok(OutputFormat::BandTiffs),
            "packed" | "swr" => Ok(OutputFormat::Packed),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::BandTiffs => write!(f, "tiffs"),
            OutputFormat::Packed => write!(f, "packed"),
        }
    }
}

/// Directory of finished swath images.
///
/// Writes are atomic: an image is assembled under a temporary name and
/// renamed into place, so [`OutputStore::exists`] never sees a partial image.
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
    format: OutputFormat,
}

impl OutputStore {
    pub fn open(dir: impl Into<PathBuf>, format: OutputFormat) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self { dir, format })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Final location of a sample's output.
    pub fn path_for(&self, sample_id: &str) -> PathBuf {
        match self.format {
            OutputFormat::BandTiffs => self.dir.join(sample_id),
            OutputFormat::Packed => self.dir.join(format!("{}.swr", sample_id)),
        }
    }

    fn band_path(dir: &Path, sample_id: &str, band: &str) -> PathBuf {
        dir.join(format!("{}_{}.tiff", sample_id, band))
    }

    pub fn exists(&self, sample_id: &str) -> bool {
        self.path_for(sample_id).exists()
    }

    /// Persists one image. Does nothing if the sample already exists.
    pub fn write(&self, sample_id: &str, image: &BandRaster) -> Result<PathBuf, CacheError> {
        validate_id(sample_id)?;
        let final_path = self.path_for(sample_id);
        if final_path.exists() {
            return Ok(final_path);
        }

        match self.format {
            OutputFormat::Packed => {
                raster::write_file(&final_path, image)
                    .map_err(|e| CacheError::raster(&final_path, e))?;
            }
            OutputFormat::BandTiffs => {
                let partial = self.dir.join(format!(".{}.partial", sample_id));
                if partial.exists() {
                    fs::remove_dir_all(&partial).map_err(|e| CacheError::io(&partial, e))?;
                }
                fs::create_dir_all(&partial).map_err(|e| CacheError::io(&partial, e))?;

                for (index, band) in BANDS.iter().enumerate() {
                    let path = Self::band_path(&partial, sample_id, band);
                    let pixels: Vec<u8> = image.band(index).iter().copied().collect();
                    let gray = GrayImage::from_raw(image.width() as u32, image.height() as u32, pixels)
                        .ok_or_else(|| CacheError::Corrupt {
                            path: path.clone(),
                            reason: "band buffer does not match image size".to_string(),
                        })?;
                    gray.save_with_format(&path, ImageFormat::Tiff)
                        .map_err(|e| CacheError::Image {
                            path: path.clone(),
                            reason: e.to_string(),
                        })?;
                }
                fs::rename(&partial, &final_path).map_err(|e| CacheError::io(&final_path, e))?;
            }
        }

        debug!(sample_id, path = %final_path.display(), "Wrote swath image");
        Ok(final_path)
    }

    /// Reads a stored image back.
    pub fn read(&self, sample_id: &str) -> Result<BandRaster, CacheError> {
        let path = self.path_for(sample_id);
        match self.format {
            OutputFormat::Packed => raster::read_file(&path).map_err(|e| CacheError::raster(&path, e)),
            OutputFormat::BandTiffs => {
                let mut out: Option<BandRaster> = None;
                for (index, band) in BANDS.iter().enumerate() {
                    let band_path = Self::band_path(&path, sample_id, band);
                    let gray = image::open(&band_path)
                        .map_err(|e| CacheError::Image {
                            path: band_path.clone(),
                            reason: e.to_string(),
                        })?
                        .to_luma8();
                    let (w, h) = (gray.width() as usize, gray.height() as usize);
                    let raster = out.get_or_insert_with(|| BandRaster::zeros(h, w));
                    if (raster.height(), raster.width()) != (h, w) {
                        return Err(CacheError::Corrupt {
                            path: band_path,
                            reason: format!(
                                "band is {}x{}, expected {}x{}",
                                w,
                                h,
                                raster.width(),
                                raster.height()
                            ),
                        });
                    }
                    for (x, y, pixel) in gray.enumerate_pixels() {
                        raster.array_mut()[[y as usize, x as usize, index]] = pixel.0[0];
                    }
                }
                out.ok_or_else(|| CacheError::Corrupt {
                    path,
                    reason: "no bands".to_string(),
                })
            }
        }
    }

    /// Checks that a stored image decodes completely.
    pub fn verify(&self, sample_id: &str) -> Result<(), CacheError> {
        if !self.exists(sample_id) {
            return Err(CacheError::Missing(self.path_for(sample_id)));
        }
        self.read(sample_id).map(|_| ())
    }

    /// Verifies many images in parallel, returning the failures in input
    /// order.
    pub fn verify_all(&self, sample_ids: &[String]) -> Vec<(String, CacheError)> {
        sample_ids
            .par_iter()
            .filter_map(|id| self.verify(id).err().map(|e| (id.clone(), e)))
            .collect()
    }

    /// Deletes a stored image so a later run regenerates it.
    pub fn remove(&self, sample_id: &str) -> Result<(), CacheError> {
        validate_id(sample_id)?;
        let path = self.path_for(sample_id);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }
}

fn validate_id(sample_id: &str) -> Result<(), CacheError> {
    let valid = !sample_id.is_empty()
        && !sample_id.starts_with('.')
        && sample_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidSampleId(sample_id.to_string()))
    }
}
