//! Core provider types and trait definitions.

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::geo::BBox;
use crate::raster::BandRaster;

/// Errors reported by an imagery provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The request asked for coarser pixels than the provider serves.
    #[error("Request exceeds the provider resolution limit of {limit_m:.2} m/px")]
    ResolutionLimit { limit_m: f64 },

    /// Rate or processing-unit quota exhausted.
    #[error("Provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("Provider returned {0} rasters where one was expected")]
    MultiplePayloads(usize),

    #[error("Provider returned {actual} bands, expected {expected}")]
    BandMismatch { expected: usize, actual: usize },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Errors that mean "no usable data for this request" rather than a
    /// broken provider.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProviderError::ResolutionLimit { .. } | ProviderError::QuotaExceeded(_)
        )
    }
}

/// Which acquisition window a query ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    Primary,
    Extended,
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowKind::Primary => write!(f, "primary"),
            WindowKind::Extended => write!(f, "extended"),
        }
    }
}

/// An inclusive acquisition date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub kind: WindowKind,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// The primary window and its wider fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindows {
    pub primary: TimeWindow,
    pub extended: TimeWindow,
}

impl TimeWindows {
    /// Both windows share `end`; the extended one starts earlier.
    pub fn new(primary_start: NaiveDate, extended_start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            primary: TimeWindow {
                kind: WindowKind::Primary,
                start: primary_start,
                end,
            },
            extended: TimeWindow {
                kind: WindowKind::Extended,
                start: extended_start,
                end,
            },
        }
    }

    /// Windows in query order.
    pub fn in_order(&self) -> [TimeWindow; 2] {
        [self.primary, self.extended]
    }
}

impl Default for TimeWindows {
    fn default() -> Self {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        Self::new(date(2023, 4, 20), date(2022, 11, 1), date(2023, 5, 2))
    }
}

/// Data-availability query over a box.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRequest {
    pub bbox: BBox,
    pub width_px: u32,
    pub height_px: u32,
    pub window: TimeWindow,
}

/// Full 13-band download of a box.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub bbox: BBox,
    pub width_px: u32,
    pub height_px: u32,
    pub window: TimeWindow,
}

/// A single-band data mask: non-zero where the provider has data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl CoverageMask {
    /// Fraction of pixels with data, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        let total = u64::from(self.width) * u64::from(self.height);
        if total == 0 {
            return 0.0;
        }
        let set = self.data.iter().filter(|&&v| v > 0).count() as u64;
        set as f64 / total as f64
    }

    pub fn any(&self) -> bool {
        self.data.iter().any(|&v| v > 0)
    }
}

/// A remote source of multispectral imagery.
///
/// Implementations must be safe to call repeatedly; rate limiting is the
/// caller's concern.
pub trait ImageryProvider {
    /// Returns the data mask for a box and time window.
    fn coverage(&self, request: &CoverageRequest) -> Result<CoverageMask, ProviderError>;

    /// Downloads a 13-band raster for a box and time window.
    fn download(&self, request: &DownloadRequest) -> Result<BandRaster, ProviderError>;

    /// Human-readable name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(ProviderError::ResolutionLimit { limit_m: 1500.0 }.is_recoverable());
        assert!(ProviderError::QuotaExceeded("429".into()).is_recoverable());
        assert!(!ProviderError::EmptyResponse.is_recoverable());
        assert!(!ProviderError::MultiplePayloads(2).is_recoverable());
        assert!(!ProviderError::HttpError("500".into()).is_recoverable());
    }

    #[test]
    fn test_default_windows() {
        let windows = TimeWindows::default();
        assert_eq!(windows.primary.start.to_string(), "2023-04-20");
        assert_eq!(windows.extended.start.to_string(), "2022-11-01");
        assert_eq!(windows.primary.end, windows.extended.end);
        assert_eq!(windows.in_order()[0].kind, WindowKind::Primary);
    }

    #[test]
    fn test_mask_fraction() {
        let mask = CoverageMask {
            width: 2,
            height: 2,
            data: vec![1, 0, 1, 1],
        };
        assert_eq!(mask.fraction(), 0.75);
        assert!(mask.any());

        let empty = CoverageMask {
            width: 0,
            height: 0,
            data: vec![],
        };
        assert_eq!(empty.fraction(), 0.0);
        assert!(!empty.any());
    }
}
