//! Night raster import command.

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Luma};
use swathtrace::config::ConfigFile;
use swathtrace::raster;
use swathtrace::synth::{import_night_bands, NightBands, SynthError};

use crate::error::CliError;

/// Build the night raster from two radiance images and a cloud mask.
pub fn run(config: &ConfigFile, m10: &Path, m11: &Path, cloud_mask: &Path) -> Result<(), CliError> {
    let m10_image = open_luma16(m10)?;
    let m11_image = open_luma16(m11)?;
    let mask_image = open_mask(cloud_mask)?;

    let (width, height) = m10_image.dimensions();
    for (path, dims) in [(m11, m11_image.dimensions()), (cloud_mask, mask_image.dimensions())] {
        if dims != (width, height) {
            return Err(CliError::ImageRead {
                path: path.to_path_buf(),
                reason: format!(
                    "dimensions {}x{} do not match m10 ({}x{})",
                    dims.0, dims.1, width, height
                ),
            });
        }
    }
    println!("Importing night bands: {}x{} px", width, height);

    let bands = NightBands {
        width: width as usize,
        height: height as usize,
        m10: m10_image.into_raw(),
        m11: m11_image.into_raw(),
        cloud_mask: mask_image.into_raw(),
    };
    let night = import_night_bands(&bands)?;
    raster::write_file(&config.paths.night_raster, &night).map_err(SynthError::from)?;
    println!("Night raster written to {}", config.paths.night_raster.display());
    Ok(())
}

fn open_luma16(path: &Path) -> Result<ImageBuffer<Luma<u16>, Vec<u16>>, CliError> {
    Ok(image::open(path).map_err(|e| image_error(path, e))?.to_luma16())
}

/// Reads the cloud mask without rescaling: the confidence class lives in
/// bits 6-7 of the raw value, so 16-bit masks keep their low byte.
fn open_mask(path: &Path) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>, CliError> {
    match image::open(path).map_err(|e| image_error(path, e))? {
        DynamicImage::ImageLuma8(mask) => Ok(mask),
        DynamicImage::ImageLuma16(mask) => {
            let (width, height) = mask.dimensions();
            let low: Vec<u8> = mask.into_raw().into_iter().map(|v| v as u8).collect();
            ImageBuffer::from_raw(width, height, low).ok_or_else(|| CliError::ImageRead {
                path: path.to_path_buf(),
                reason: "cloud mask buffer does not match its dimensions".to_string(),
            })
        }
        other => Err(CliError::ImageRead {
            path: path.to_path_buf(),
            reason: format!("cloud mask must be single-band 8 or 16 bit, got {:?}", other.color()),
        }),
    }
}

fn image_error(path: &Path, error: image::ImageError) -> CliError {
    CliError::ImageRead {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
