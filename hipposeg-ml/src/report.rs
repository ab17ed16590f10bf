//! `results.json` writer.

use crate::config::Config;
use crate::error::MlError;
use crate::persistence::write_json_file;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const RESULTS_FILE_NAME: &str = "results.json";

/// Results map returned by a runner's test pass, extended with the run config.
pub type ResultsReport = Map<String, Value>;

/// Store `config` under the `"config"` key as a flat object.
pub fn attach_config(results: &mut ResultsReport, config: &Config) -> Result<(), MlError> {
    results.insert("config".to_string(), serde_json::to_value(config)?);
    Ok(())
}

/// Write `<out_dir>/results.json`, replacing any previous file.
///
/// Output is pretty-printed with two-space indentation and keys in insertion
/// order, so identical inputs give identical bytes.
pub fn write_results(out_dir: &Path, results: &ResultsReport) -> Result<PathBuf, MlError> {
    let path = out_dir.join(RESULTS_FILE_NAME);
    write_json_file(&path, results)?;
    tracing::debug!(path = %path.display(), "Wrote results");
    Ok(path)
}

pub fn read_results(path: &Path) -> Result<ResultsReport, MlError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
