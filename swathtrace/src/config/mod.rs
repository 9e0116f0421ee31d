//! User configuration.
//!
//! Settings are read from an INI file (`~/.swathtrace/config.ini` unless a
//! path is given) and overlaid on built-in defaults. Each section maps to one
//! settings struct; [`ConfigFile`] converts them into the configuration
//! types of the individual components.

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, ImagerySettings, OceanSettings, PathSettings, PipelineSettings, SentinelHubSettings,
    WindowSettings,
};
