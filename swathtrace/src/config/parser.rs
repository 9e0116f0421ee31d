//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::geo::BBox;
use crate::synth::{NightOffset, OceanSelection};

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("sentinelhub")) {
        let s = Section::new("sentinelhub", section);
        if let Some(v) = s.non_empty("client_id") {
            config.sentinelhub.client_id = Some(v);
        }
        if let Some(v) = s.non_empty("client_secret") {
            config.sentinelhub.client_secret = Some(v);
        }
        if let Some(v) = s.non_empty("base_url") {
            config.sentinelhub.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = s.non_empty("token_url") {
            config.sentinelhub.token_url = v;
        }
        if let Some(v) = s.non_empty("collection") {
            config.sentinelhub.collection = v;
        }
        if let Some(v) = s.parse::<u64>("timeout_secs")? {
            config.sentinelhub.timeout_secs = v;
        }
    }

    if let Some(section) = ini.section(Some("imagery")) {
        let s = Section::new("imagery", section);
        let imagery = &mut config.imagery;
        if let Some(v) = s.positive("resolution_m")? {
            imagery.resolution_m = v;
        }
        if let Some(v) = s.positive("check_resolution_m")? {
            imagery.check_resolution_m = v;
        }
        if let Some(v) = s.positive("swath_width_m")? {
            imagery.swath_width_m = v;
        }
        if let Some(v) = s.parse::<u32>("max_download_px")? {
            imagery.max_download_px = s.at_least("max_download_px", v, 1)?;
        }
        if let Some(v) = s.parse::<f64>("safety_factor")? {
            if !(v > 0.0 && v <= 1.0) {
                return Err(s.invalid("safety_factor", "must be in (0, 1]"));
            }
            imagery.safety_factor = v;
        }
        if let Some(v) = s.positive("night_resolution_m")? {
            imagery.night_resolution_m = v;
        }
    }

    if let Some(section) = ini.section(Some("windows")) {
        let s = Section::new("windows", section);
        if let Some(v) = s.date("primary_start")? {
            config.windows.primary_start = v;
        }
        if let Some(v) = s.date("extended_start")? {
            config.windows.extended_start = v;
        }
        if let Some(v) = s.date("end")? {
            config.windows.end = v;
        }
        let w = config.windows;
        if w.extended_start > w.primary_start {
            return Err(s.invalid("extended_start", "must not be after primary_start"));
        }
        if w.primary_start > w.end {
            return Err(s.invalid("primary_start", "must not be after end"));
        }
    }

    if let Some(section) = ini.section(Some("ocean")) {
        let s = Section::new("ocean", section);
        if let Some(v) = s.non_empty("bbox") {
            config.ocean.bbox = parse_bbox(&v).ok_or_else(|| {
                s.invalid("bbox", "expected min_lon,min_lat,max_lon,max_lat with positive area")
            })?;
        }
    }

    if let Some(section) = ini.section(Some("paths")) {
        let s = Section::new("paths", section);
        let paths = &mut config.paths;
        for (key, field) in [
            ("trace", &mut paths.trace),
            ("tile_dir", &mut paths.tile_dir),
            ("ocean_dir", &mut paths.ocean_dir),
            ("night_raster", &mut paths.night_raster),
            ("output_dir", &mut paths.output_dir),
            ("trace_log", &mut paths.trace_log),
            ("plan_dir", &mut paths.plan_dir),
            ("log_dir", &mut paths.log_dir),
        ] {
            if let Some(v) = s.non_empty(key) {
                *field = expand_tilde(&v);
            }
        }
    }

    if let Some(section) = ini.section(Some("pipeline")) {
        let s = Section::new("pipeline", section);
        let pipeline = &mut config.pipeline;
        if let Some(v) = s.parse::<u64>("max_elapsed_s")? {
            pipeline.max_elapsed_s = v;
        }
        if let Some(v) = s.parse::<usize>("points_per_area")? {
            pipeline.points_per_area = s.at_least("points_per_area", v, 1)?;
        }
        if let Some(v) = s.parse::<u64>("request_interval_ms")? {
            pipeline.request_interval_ms = v;
        }
        if let Some(v) = s.parse::<usize>("writer_threads")? {
            pipeline.writer_threads = s.at_least("writer_threads", v, 1)?;
        }
        if let Some(v) = s.parse::<usize>("queue_capacity")? {
            pipeline.queue_capacity = s.at_least("queue_capacity", v, 1)?;
        }
        if let Some(v) = s.parse::<u64>("seed")? {
            pipeline.seed = v;
        }
        if let Some(v) = s.non_empty("output_format") {
            pipeline.output_format = v
                .parse()
                .map_err(|_| s.invalid("output_format", "must be one of: tiffs, packed"))?;
        }
        if let Some(v) = s.non_empty("night_offset") {
            pipeline.night_offset = parse_night_offset(&v)
                .ok_or_else(|| s.invalid("night_offset", "must be one of: seeded, point"))?;
        }
        if let Some(v) = s.non_empty("ocean_selection") {
            pipeline.ocean_selection = parse_ocean_selection(&v)
                .ok_or_else(|| s.invalid("ocean_selection", "must be one of: seeded, round-robin"))?;
        }
        if let Some(v) = s.parse::<f64>("footprint_coverage")? {
            if !(0.0..1.0).contains(&v) {
                return Err(s.invalid("footprint_coverage", "must be in [0, 1)"));
            }
            pipeline.footprint_coverage = v;
        }
    }

    Ok(config)
}

/// One INI section with error context.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn raw(&self, key: &str) -> Option<&'a str> {
        self.props.get(key).map(str::trim)
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.raw(key).filter(|v| !v.is_empty()).map(str::to_string)
    }

    fn invalid(&self, key: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: self.raw(key).unwrap_or_default().to_string(),
            reason: reason.to_string(),
        }
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigFileError> {
        match self.raw(key).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, "not a valid number")),
        }
    }

    fn positive(&self, key: &str) -> Result<Option<f64>, ConfigFileError> {
        match self.parse::<f64>(key)? {
            Some(v) if !(v.is_finite() && v > 0.0) => Err(self.invalid(key, "must be positive")),
            other => Ok(other),
        }
    }

    fn at_least<T: PartialOrd + Copy>(&self, key: &str, value: T, min: T) -> Result<T, ConfigFileError> {
        if value < min {
            Err(self.invalid(key, "below minimum"))
        } else {
            Ok(value)
        }
    }

    fn date(&self, key: &str) -> Result<Option<NaiveDate>, ConfigFileError> {
        match self.non_empty(key) {
            None => Ok(None),
            Some(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
                .map(Some)
                .map_err(|_| self.invalid(key, "expected a date like 2023-04-20")),
        }
    }
}

fn parse_bbox(value: &str) -> Option<BBox> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse().ok())
        .collect::<Option<_>>()?;
    let [min_lon, min_lat, max_lon, max_lat] = parts[..] else {
        return None;
    };
    BBox::new(min_lon, min_lat, max_lon, max_lat)
        .ok()
        .filter(BBox::has_area)
}

pub(super) fn parse_night_offset(value: &str) -> Option<NightOffset> {
    match value.to_lowercase().as_str() {
        "seeded" | "random" => Some(NightOffset::Seeded),
        "point" | "point-derived" => Some(NightOffset::PointDerived),
        _ => None,
    }
}

pub(super) fn parse_ocean_selection(value: &str) -> Option<OceanSelection> {
    match value.to_lowercase().as_str() {
        "seeded" | "random" => Some(OceanSelection::Seeded),
        "round-robin" | "roundrobin" => Some(OceanSelection::RoundRobin),
        _ => None,
    }
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
