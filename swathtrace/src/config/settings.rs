//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use crate::cache::OutputFormat;
use crate::compositor::CompositorConfig;
use crate::geo::BBox;
use crate::pipeline::TraceOptions;
use crate::planner::PlannerConfig;
use crate::provider::{SentinelHubConfig, TimeWindows};
use crate::resolver::ResolverConfig;
use crate::synth::{NightOffset, OceanSelection};

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub sentinelhub: SentinelHubSettings,
    pub imagery: ImagerySettings,
    pub windows: WindowSettings,
    pub ocean: OceanSettings,
    pub paths: PathSettings,
    pub pipeline: PipelineSettings,
}

/// Imagery provider credentials and endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelHubSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub base_url: String,
    pub token_url: String,
    pub collection: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

/// Resolutions and sensor geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagerySettings {
    pub resolution_m: f64,
    pub check_resolution_m: f64,
    pub swath_width_m: f64,
    pub max_download_px: u32,
    pub safety_factor: f64,
    pub night_resolution_m: f64,
}

/// Acquisition windows; the primary window is searched first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSettings {
    pub primary_start: NaiveDate,
    pub extended_start: NaiveDate,
    pub end: NaiveDate,
}

/// Region the open-ocean reference pool is ingested from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OceanSettings {
    pub bbox: BBox,
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSettings {
    /// Ground-track CSV
    pub trace: PathBuf,
    /// Tile cache for staged and on-demand tiles
    pub tile_dir: PathBuf,
    /// Tile cache holding the ocean pool
    pub ocean_dir: PathBuf,
    pub night_raster: PathBuf,
    pub output_dir: PathBuf,
    pub trace_log: PathBuf,
    pub plan_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl PathSettings {
    /// Saved tile plan.
    pub fn plan_file(&self) -> PathBuf {
        self.plan_dir.join("plan.bin")
    }

    /// Ocean pool plan.
    pub fn ocean_plan_file(&self) -> PathBuf {
        self.plan_dir.join("ocean-plan.bin")
    }
}

/// Run behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Track points past this many seconds are ignored
    pub max_elapsed_s: u64,
    /// Sunlit points per planned survey area
    pub points_per_area: usize,
    pub request_interval_ms: u64,
    pub writer_threads: usize,
    pub queue_capacity: usize,
    pub seed: u64,
    pub output_format: OutputFormat,
    pub night_offset: NightOffset,
    pub ocean_selection: OceanSelection,
    /// Coverage fraction a window needs over an on-demand footprint
    pub footprint_coverage: f64,
}

impl ConfigFile {
    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            resolution_m: self.imagery.resolution_m,
            max_download_px: self.imagery.max_download_px,
            safety_factor: self.imagery.safety_factor,
        }
    }

    pub fn time_windows(&self) -> TimeWindows {
        TimeWindows::new(self.windows.primary_start, self.windows.extended_start, self.windows.end)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            resolution_m: self.imagery.resolution_m,
            check_resolution_m: self.imagery.check_resolution_m,
            windows: self.time_windows(),
            request_interval: Duration::from_millis(self.pipeline.request_interval_ms),
        }
    }

    pub fn compositor_config(&self) -> CompositorConfig {
        CompositorConfig {
            swath_width_m: self.imagery.swath_width_m,
            resolution_m: self.imagery.resolution_m,
            footprint_coverage: self.pipeline.footprint_coverage,
            seed: self.pipeline.seed,
            planner: self.planner_config(),
        }
    }

    /// Provider configuration; missing credentials become empty strings and
    /// are rejected by the provider on first use.
    pub fn sentinel_hub_config(&self) -> SentinelHubConfig {
        SentinelHubConfig {
            client_id: self.sentinelhub.client_id.clone().unwrap_or_default(),
            client_secret: self.sentinelhub.client_secret.clone().unwrap_or_default(),
            base_url: self.sentinelhub.base_url.clone(),
            token_url: self.sentinelhub.token_url.clone(),
            collection: self.sentinelhub.collection.clone(),
        }
    }

    pub fn trace_options(&self) -> TraceOptions {
        TraceOptions {
            writer_threads: self.pipeline.writer_threads,
            queue_capacity: self.pipeline.queue_capacity,
        }
    }
}
