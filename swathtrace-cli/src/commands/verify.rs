//! Output verification command.

use console::style;
use swathtrace::cache::{read_trace_log, OutputStore};
use swathtrace::config::ConfigFile;
use tracing::warn;

use crate::error::CliError;

/// Check every output named in the trace log, optionally deleting the
/// broken ones so the next trace regenerates them.
pub fn run(config: &ConfigFile, delete: bool) -> Result<(), CliError> {
    let entries = read_trace_log(&config.paths.trace_log)?;
    let ids: Vec<String> = entries.into_iter().map(|e| e.sample_id).collect();
    let store = OutputStore::open(&config.paths.output_dir, config.pipeline.output_format)?;

    println!("Verifying {} outputs in {}", ids.len(), store.dir().display());
    let failures = store.verify_all(&ids);
    for (sample_id, error) in &failures {
        println!("  {} {}: {}", style("FAIL").red(), sample_id, error);
        warn!(sample_id = %sample_id, error = %error, "Output failed verification");
    }

    if failures.is_empty() {
        println!("{} all outputs decode", style("OK").green());
        return Ok(());
    }
    if delete {
        for (sample_id, _) in &failures {
            store.remove(sample_id)?;
        }
        println!("Deleted {} broken output(s)", failures.len());
        return Ok(());
    }
    Err(CliError::VerifyFailed(failures.len()))
}
