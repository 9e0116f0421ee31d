//! SwathTrace - Synthetic satellite capture traces
//!
//! Synthesizes the chronological sequence of 13-band images a spacecraft
//! would capture along its ground track. Tiles are planned to fit the
//! imagery provider's per-request limits, resolved through a write-once
//! cache, and stitched into one raster per instantaneous footprint. Night
//! and open-ocean samples are synthesized locally.
//!
//! The main entry points are [`pipeline::run_trace`] for compositing a
//! track and [`pipeline::plan_survey`] / [`pipeline::stage_tiles`] for
//! staging its tiles ahead of time.

pub mod cache;
pub mod compositor;
pub mod config;
pub mod geo;
pub mod logging;
pub mod pipeline;
pub mod planner;
pub mod provider;
pub mod ratelimit;
pub mod raster;
pub mod resolver;
pub mod synth;
pub mod track;

/// Library version, for `--version` output and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
