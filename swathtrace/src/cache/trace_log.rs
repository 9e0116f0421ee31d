//! Per-run log of emitted samples.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::CacheError;
use crate::track::GroundPoint;

const HEADER: &str = "sample_id,lon,lat,alt";

/// One row of the trace log.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub sample_id: String,
    pub lon: f64,
    pub lat: f64,
    pub altitude_km: f64,
}

/// Writer for the trace log, truncated when created.
pub struct TraceLog {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl TraceLog {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| CacheError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", HEADER).map_err(|e| CacheError::io(&path, e))?;
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    /// Appends an emitted sample.
    pub fn append(&mut self, point: &GroundPoint) -> Result<(), CacheError> {
        writeln!(
            self.writer,
            "{},{},{},{}",
            point.sample_id(),
            point.lon,
            point.lat,
            point.altitude_km
        )
        .map_err(|e| CacheError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> Result<(), CacheError> {
        self.writer.flush().map_err(|e| CacheError::io(&self.path, e))
    }
}

impl Drop for TraceLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Reads a trace log back.
pub fn read_trace_log(path: &Path) -> Result<Vec<TraceEntry>, CacheError> {
    let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| CacheError::io(path, e))?;
        if index == 0 || line.trim().is_empty() {
            continue;
        }
        let corrupt = || CacheError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("line {}: '{}'", index + 1, line),
        };
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 4 {
            return Err(corrupt());
        }
        let num = |s: &str| s.trim().parse::<f64>().map_err(|_| corrupt());
        entries.push(TraceEntry {
            sample_id: fields[0].to_string(),
            lon: num(fields[1])?,
            lat: num(fields[2])?,
            altitude_km: num(fields[3])?,
        });
    }
    Ok(entries)
}
