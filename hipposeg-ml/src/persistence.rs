//! JSON files for run records, checkpoints and results.
//!
//! Writes go through a `.partial` sibling that is renamed over the target, so
//! an interrupted run never leaves a truncated `model.json` or manifest.

use crate::error::MlError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON into `path` and return the bytes written.
pub fn write_json_file<T>(path: &Path, value: &T) -> Result<Vec<u8>, MlError>
where
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec_pretty(value)?;
    replace_file(path, &bytes)?;
    Ok(bytes)
}

/// Replace the contents of `path`, creating parent directories.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), MlError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = partial_path(path);
    std::fs::write(&partial, bytes)?;
    if let Err(e) = std::fs::rename(&partial, path) {
        let _ = std::fs::remove_file(&partial);
        return Err(e.into());
    }
    Ok(())
}

/// Read a JSON file, `None` when it does not exist.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, MlError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&text)?))
}
