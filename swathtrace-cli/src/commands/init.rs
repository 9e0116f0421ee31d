//! Configuration initialization command.

use std::path::Path;

use swathtrace::config::ConfigFile;

use crate::error::CliError;

pub fn run(config_path: &Path) -> Result<(), CliError> {
    let existed = config_path.exists();
    let path = ConfigFile::ensure_exists(config_path)?;
    if existed {
        println!("Configuration already exists: {}", path.display());
    } else {
        println!("Wrote default configuration: {}", path.display());
        println!("Add Sentinel Hub credentials under [sentinelhub] before running survey.");
    }
    Ok(())
}
