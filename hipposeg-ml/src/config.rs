//! Run configuration for the segmentation pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> `hipposeg.toml` in the
//! working directory -> explicit config file -> `HIPPOSEG_*` environment -> CLI overrides.

use crate::error::MlError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File picked up from the working directory when present.
pub const CONFIG_FILE_NAME: &str = "hipposeg.toml";

/// Prefix for environment overrides (`HIPPOSEG_N_EPOCHS=10`).
pub const ENV_PREFIX: &str = "HIPPOSEG_";

/// Parameters of a single training run.
///
/// Field order is the order keys appear under `"config"` in `results.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Run label, used in the output directory name.
    pub name: String,
    /// Dataset root containing `images/` and `labels/`.
    pub root_dir: PathBuf,
    /// Number of training epochs.
    pub n_epochs: usize,
    /// Optimizer step size.
    pub learning_rate: f64,
    /// Number of slices per training batch.
    pub batch_size: usize,
    /// Spatial crop size applied to the two in-slice axes.
    pub patch_size: usize,
    /// Root directory for run outputs.
    pub test_results_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "Basic_unet".to_string(),
            root_dir: PathBuf::from("/home/workspace/"),
            n_epochs: 5,
            learning_rate: 0.0002,
            batch_size: 8,
            patch_size: 64,
            test_results_dir: PathBuf::from("/home/workspace/out"),
        }
    }
}

impl Config {
    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<(), MlError> {
        if self.name.trim().is_empty() {
            return Err(MlError::config("name must not be empty"));
        }
        if self.n_epochs == 0 {
            return Err(MlError::config("n_epochs must be greater than 0"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(MlError::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(MlError::config("batch_size must be greater than 0"));
        }
        if self.patch_size == 0 {
            return Err(MlError::config("patch_size must be greater than 0"));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, MlError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Caller-supplied values that take precedence over every other source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_epochs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results_dir: Option<PathBuf>,
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides
/// 2. Environment variables (prefixed with `HIPPOSEG_`)
/// 3. The config file passed in `config_file`
/// 4. `hipposeg.toml` in the working directory
/// 5. Built-in defaults
pub fn load_config(
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<Config, MlError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    let local = Path::new(CONFIG_FILE_NAME);
    if local.exists() {
        figment = figment.merge(Toml::file(local));
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(MlError::not_found(format!(
                "config file {}",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX));
    figment = figment.merge(Serialized::defaults(overrides));

    let config: Config = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

/// Write the default configuration to `path`, refusing to clobber an existing file.
pub fn write_default_config(path: &Path) -> Result<(), MlError> {
    if path.exists() {
        return Err(MlError::invalid_input(format!(
            "{} already exists",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_toml()?)?;
    Ok(())
}
