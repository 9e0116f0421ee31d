//! Synthetic image sources.
//!
//! Samples the remote provider cannot serve are filled from local data:
//!
//! - [`NightImageSynthesizer`] - samples taken in darkness, cut from a
//!   low-resolution night-light raster and upsampled.
//! - [`OceanTileSynthesizer`] - sunlit samples without coverage, tiled from a
//!   fixed pool of open-ocean reference tiles.
//!
//! Randomness is always drawn from a per-sample RNG (see [`sample_rng`]), so
//! rerunning a trace reproduces every synthetic image byte for byte.

mod night;
mod ocean;

pub use night::{import_night_bands, NightBands, NightImageSynthesizer, NightOffset};
pub use ocean::{OceanSelection, OceanTileSynthesizer};

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cache::CacheError;
use crate::raster::RasterError;

/// Errors from the synthetic sources. All of them are fatal.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("No ocean tiles available")]
    NoOceanTiles,

    #[error("Ocean tile {0} has no pixels")]
    EmptyOceanTile(usize),

    #[error("Night raster is {width}x{height}, window needs {need_width}x{need_height}")]
    NightRasterTooSmall {
        width: usize,
        height: usize,
        need_width: usize,
        need_height: usize,
    },

    #[error("Night band inputs disagree: {0}")]
    NightBandMismatch(String),

    #[error("Raster error: {0}")]
    Raster(#[from] RasterError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Deterministic RNG for one sample, independent of processing order.
pub fn sample_rng(seed: u64, sample_id: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(sample_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    StdRng::from_seed(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sample_rng_is_reproducible() {
        let a: u64 = sample_rng(42, "1000").random();
        let b: u64 = sample_rng(42, "1000").random();
        let c: u64 = sample_rng(42, "2000").random();
        let d: u64 = sample_rng(43, "1000").random();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }
}
