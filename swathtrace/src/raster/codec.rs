//! Compressed on-disk raster format.
//!
//! A raster file is a gzip stream wrapping a bincode-encoded [`RasterFile`].
//! The gzip header carries no timestamp, so encoding the same raster twice
//! yields identical bytes.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BandRaster, BAND_COUNT};

const MAGIC: [u8; 4] = *b"SWTR";
const VERSION: u16 = 1;

/// Errors from building, encoding or decoding rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Not a raster file (bad magic {0:?})")]
    BadMagic([u8; 4]),

    #[error("Unsupported raster file version {0}")]
    UnsupportedVersion(u16),

    #[error("Raster data length mismatch: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Expected 13 bands, got {0}")]
    BandCount(usize),

    #[error("Invalid raster shape: {0}")]
    Shape(String),
}

#[derive(Serialize, Deserialize)]
struct RasterFile {
    magic: [u8; 4],
    version: u16,
    height: u32,
    width: u32,
    bands: u32,
    data: Vec<u8>,
}

/// Encodes a raster to compressed bytes.
pub fn encode(raster: &BandRaster) -> Result<Vec<u8>, RasterError> {
    let file = RasterFile {
        magic: MAGIC,
        version: VERSION,
        height: raster.height() as u32,
        width: raster.width() as u32,
        bands: BAND_COUNT as u32,
        data: raster.to_interleaved(),
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    bincode::serialize_into(&mut encoder, &file)
        .map_err(|e| RasterError::Encoding(e.to_string()))?;
    Ok(encoder.finish()?)
}

/// Decodes compressed bytes produced by [`encode`].
pub fn decode<R: Read>(reader: R) -> Result<BandRaster, RasterError> {
    let file: RasterFile = bincode::deserialize_from(GzDecoder::new(reader))
        .map_err(|e| RasterError::Encoding(e.to_string()))?;
    if file.magic != MAGIC {
        return Err(RasterError::BadMagic(file.magic));
    }
    if file.version != VERSION {
        return Err(RasterError::UnsupportedVersion(file.version));
    }
    if file.bands as usize != BAND_COUNT {
        return Err(RasterError::BandCount(file.bands as usize));
    }
    BandRaster::from_interleaved(file.height as usize, file.width as usize, file.data)
}

/// Writes a raster file atomically (temp file, then rename).
pub fn write_file(path: &Path, raster: &BandRaster) -> Result<(), RasterError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = encode(raster)?;
    let temp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Reads a raster file.
pub fn read_file(path: &Path) -> Result<BandRaster, RasterError> {
    decode(BufReader::new(File::open(path)?))
}
