//! CLI command implementations.
//!
//! Each subcommand has its own module with its handler.
//!
//! # Command Modules
//!
//! - [`init`] - Default configuration file
//! - [`plan`] - Tile planning for the ground track
//! - [`survey`] - Tile staging
//! - [`trace`] - Trace compositing
//! - [`ocean`] - Ocean pool ingest
//! - [`night`] - Night raster import
//! - [`verify`] - Output verification
//! - [`cache`] - Cache management (stats)

pub mod cache;
pub mod common;
pub mod init;
pub mod night;
pub mod ocean;
pub mod plan;
pub mod survey;
pub mod trace;
pub mod verify;
