// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{PlanConfig, RawPlanConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw `RawPlanConfig`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPlanConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawPlanConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Parses wait durations and rejects nonsensical values.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PlanConfig> {
    let raw_config = load_from_path(&path)?;
    let config = PlanConfig::try_from(raw_config)?;
    debug!(path = ?path.as_ref(), "loaded planner config");
    Ok(config)
}

/// Default config location: `Pitrix.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Pitrix.toml")
}
