//! Default values for all configuration settings.

use chrono::NaiveDate;

use super::settings::*;
use crate::geo::BBox;
use crate::provider::{DEFAULT_BASE_URL, DEFAULT_COLLECTION, DEFAULT_TOKEN_URL};

/// Environment variable overriding `sentinelhub.client_id`.
pub const ENV_CLIENT_ID: &str = "SWATHTRACE_CLIENT_ID";
/// Environment variable overriding `sentinelhub.client_secret`.
pub const ENV_CLIENT_SECRET: &str = "SWATHTRACE_CLIENT_SECRET";

/// No client-side timeout; requests last as long as the provider allows.
pub const DEFAULT_TIMEOUT_SECS: u64 = 0;

pub const DEFAULT_RESOLUTION_M: f64 = 10.0;
pub const DEFAULT_CHECK_RESOLUTION_M: f64 = 100.0;
pub const DEFAULT_SWATH_WIDTH_M: f64 = 2560.0;
pub const DEFAULT_MAX_DOWNLOAD_PX: u32 = 2500;
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.95;
pub const DEFAULT_NIGHT_RESOLUTION_M: f64 = 500.0;

/// Open water west of the Azores.
pub const DEFAULT_OCEAN_BBOX: [f64; 4] = [-28.44635, 37.402892, -27.15271, 38.315801];

pub const DEFAULT_MAX_ELAPSED_S: u64 = 21_600;
pub const DEFAULT_POINTS_PER_AREA: usize = 5000;
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 100;
pub const DEFAULT_WRITER_THREADS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_FOOTPRINT_COVERAGE: f64 = 0.8;

pub const DEFAULT_LOG_FILE: &str = "swathtrace.log";

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

pub(super) fn default_ocean_bbox() -> BBox {
    let [min_lon, min_lat, max_lon, max_lat] = DEFAULT_OCEAN_BBOX;
    BBox {
        min_lon,
        min_lat,
        max_lon,
        max_lat,
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let base = super::file::config_directory();
        let data = base.join("data");

        Self {
            sentinelhub: SentinelHubSettings {
                client_id: None,
                client_secret: None,
                base_url: DEFAULT_BASE_URL.to_string(),
                token_url: DEFAULT_TOKEN_URL.to_string(),
                collection: DEFAULT_COLLECTION.to_string(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
            imagery: ImagerySettings {
                resolution_m: DEFAULT_RESOLUTION_M,
                check_resolution_m: DEFAULT_CHECK_RESOLUTION_M,
                swath_width_m: DEFAULT_SWATH_WIDTH_M,
                max_download_px: DEFAULT_MAX_DOWNLOAD_PX,
                safety_factor: DEFAULT_SAFETY_FACTOR,
                night_resolution_m: DEFAULT_NIGHT_RESOLUTION_M,
            },
            windows: WindowSettings {
                primary_start: date(2023, 4, 20),
                extended_start: date(2022, 11, 1),
                end: date(2023, 5, 2),
            },
            ocean: OceanSettings {
                bbox: default_ocean_bbox(),
            },
            paths: PathSettings {
                trace: data.join("track.csv"),
                tile_dir: data.join("tiles"),
                ocean_dir: data.join("ocean"),
                night_raster: data.join("night.swr"),
                output_dir: data.join("images"),
                trace_log: data.join("trace.csv"),
                plan_dir: data.join("plans"),
                log_dir: base.join("logs"),
            },
            pipeline: PipelineSettings {
                max_elapsed_s: DEFAULT_MAX_ELAPSED_S,
                points_per_area: DEFAULT_POINTS_PER_AREA,
                request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
                writer_threads: DEFAULT_WRITER_THREADS,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                seed: DEFAULT_SEED,
                output_format: Default::default(),
                night_offset: Default::default(),
                ocean_selection: Default::default(),
                footprint_coverage: DEFAULT_FOOTPRINT_COVERAGE,
            },
        }
    }
}
