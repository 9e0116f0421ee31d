//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;
use crate::synth::{NightOffset, OceanSelection};

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let hub = &config.sentinelhub;
    let imagery = &config.imagery;
    let windows = &config.windows;
    let bbox = &config.ocean.bbox;
    let paths = &config.paths;
    let pipeline = &config.pipeline;

    let night_offset = match pipeline.night_offset {
        NightOffset::Seeded => "seeded",
        NightOffset::PointDerived => "point",
    };
    let ocean_selection = match pipeline.ocean_selection {
        OceanSelection::Seeded => "seeded",
        OceanSelection::RoundRobin => "round-robin",
    };

    format!(
        r#"[sentinelhub]
; OAuth client credentials. SWATHTRACE_CLIENT_ID and SWATHTRACE_CLIENT_SECRET
; override these when set.
client_id = {}
client_secret = {}
base_url = {}
token_url = {}
collection = {}
; HTTP request timeout in seconds, 0 for none
timeout_secs = {}

[imagery]
; Output and download resolution, metres per pixel
resolution_m = {}
; Resolution of per-tile coverage queries
check_resolution_m = {}
; Side of the square sensor footprint in metres
swath_width_m = {}
; Provider limit on either dimension of one download
max_download_px = {}
; Fraction of max_download_px the tile grid aims for
safety_factor = {}
; Resolution of the night raster
night_resolution_m = {}

[windows]
; Tiles are looked up in [primary_start, end] first, then [extended_start, end]
primary_start = {}
extended_start = {}
end = {}

[ocean]
; min_lon,min_lat,max_lon,max_lat of the open-ocean reference area
bbox = {},{},{},{}

[paths]
trace = {}
tile_dir = {}
ocean_dir = {}
night_raster = {}
output_dir = {}
trace_log = {}
plan_dir = {}
log_dir = {}

[pipeline]
; Ignore track points after this many seconds
max_elapsed_s = {}
; Sunlit points per planned survey area
points_per_area = {}
; Minimum spacing between provider requests
request_interval_ms = {}
writer_threads = {}
queue_capacity = {}
seed = {}
; tiffs (one 8-bit TIFF per band) or packed (one compressed file)
output_format = {}
; seeded or point
night_offset = {}
; seeded or round-robin
ocean_selection = {}
; Coverage fraction a window needs over an on-demand footprint
footprint_coverage = {}
"#,
        hub.client_id.as_deref().unwrap_or(""),
        hub.client_secret.as_deref().unwrap_or(""),
        hub.base_url,
        hub.token_url,
        hub.collection,
        hub.timeout_secs,
        imagery.resolution_m,
        imagery.check_resolution_m,
        imagery.swath_width_m,
        imagery.max_download_px,
        imagery.safety_factor,
        imagery.night_resolution_m,
        windows.primary_start,
        windows.extended_start,
        windows.end,
        bbox.min_lon,
        bbox.min_lat,
        bbox.max_lon,
        bbox.max_lat,
        path_to_string(&paths.trace),
        path_to_string(&paths.tile_dir),
        path_to_string(&paths.ocean_dir),
        path_to_string(&paths.night_raster),
        path_to_string(&paths.output_dir),
        path_to_string(&paths.trace_log),
        path_to_string(&paths.plan_dir),
        path_to_string(&paths.log_dir),
        pipeline.max_elapsed_s,
        pipeline.points_per_area,
        pipeline.request_interval_ms,
        pipeline.writer_threads,
        pipeline.queue_capacity,
        pipeline.seed,
        pipeline.output_format,
        night_offset,
        ocean_selection,
        pipeline.footprint_coverage,
    )
}

fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
