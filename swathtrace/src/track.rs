//! Ground-track input.
//!
//! The ground track is a CSV-like text file produced by an external orbit
//! propagator, one sample per line:
//!
//! ```text
//! elapsed_ms,lon,lat,alt_km,elevation,is_sunlit
//! 0,-170.0,85.0,500.0,12.3,0
//! ```
//!
//! Header lines are skipped, malformed lines are logged and skipped, and
//! reading stops at the first sample past the configured time horizon.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::geo::LonLat;

/// Errors from reading a ground track.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Failed to read ground track {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Why a single line could not be parsed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// One sample of the spacecraft ground track.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundPoint {
    /// Elapsed milliseconds, kept verbatim so sample ids match the input.
    pub timestamp_id: String,
    pub elapsed_ms: u64,
    pub lon: f64,
    pub lat: f64,
    pub altitude_km: f64,
    pub elevation: f64,
    pub sunlit: bool,
}

impl GroundPoint {
    pub fn position(&self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }

    /// Identifier used for outputs and the trace log.
    pub fn sample_id(&self) -> &str {
        &self.timestamp_id
    }

    /// Parses one data line.
    pub fn parse(line: &str) -> Result<Self, LineError> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() != 6 {
            return Err(LineError::FieldCount(fields.len()));
        }

        let elapsed_ms = fields[0]
            .parse::<u64>()
            .map_err(|_| invalid("elapsed_ms", fields[0]))?;
        let lon = parse_f64("lon", fields[1])?;
        let lat = parse_f64("lat", fields[2])?;
        let altitude_km = parse_f64("alt", fields[3])?;
        let elevation = parse_f64("elevation", fields[4])?;
        let sunlit = match fields[5] {
            "1" => true,
            "0" => false,
            other => return Err(invalid("is_sunlit", other)),
        };

        if !(-180.0..=180.0).contains(&lon) {
            return Err(invalid("lon", fields[1]));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(invalid("lat", fields[2]));
        }

        Ok(Self {
            timestamp_id: fields[0].to_string(),
            elapsed_ms,
            lon,
            lat,
            altitude_km,
            elevation,
            sunlit,
        })
    }
}

fn invalid(field: &'static str, value: &str) -> LineError {
    LineError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, LineError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(invalid(field, value)),
    }
}

fn is_header(line: &str) -> bool {
    !line
        .chars()
        .next()
        .map(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
        .unwrap_or(false)
}

/// Parses a ground track from any buffered reader.
///
/// # Arguments
///
/// * `reader` - Source of track lines
/// * `max_elapsed_s` - Samples at or beyond this many seconds end the track
pub fn parse_track<R: BufRead>(reader: R, max_elapsed_s: u64) -> io::Result<Vec<GroundPoint>> {
    let horizon_ms = max_elapsed_s.saturating_mul(1000);
    let mut points = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || is_header(trimmed) {
            continue;
        }
        match GroundPoint::parse(trimmed) {
            Ok(point) => {
                if point.elapsed_ms >= horizon_ms {
                    debug!(line = index + 1, elapsed_ms = point.elapsed_ms, "Reached time horizon");
                    break;
                }
                points.push(point);
            }
            Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed ground-track line"),
        }
    }

    Ok(points)
}

/// Reads a ground track file.
pub fn read_track(path: &Path, max_elapsed_s: u64) -> Result<Vec<GroundPoint>, TrackError> {
    let io_err = |source| TrackError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let points = parse_track(BufReader::new(file), max_elapsed_s).map_err(io_err)?;
    debug!(path = %path.display(), points = points.len(), "Loaded ground track");
    Ok(points)
}
