//! Kernel configuration from TOML.
//!
//! ```toml
//! on_cell_change = "lazy"
//! console_capacity = 256
//! allow_self_loops_by_default = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use orrery_core::{KernelConfig, OnCellChange};

/// Default location of the user configuration file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("orrery")
        .join("config.toml")
}

/// Load the kernel configuration.
///
/// An explicit path must exist. Without one, the user configuration file is
/// used when present and defaults otherwise.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<KernelConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_path();
            if !path.exists() {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(KernelConfig::default());
            }
            path
        }
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = from_toml(&contents)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), ?config, "Loaded config");
    Ok(config)
}

pub fn from_toml(input: &str) -> anyhow::Result<KernelConfig> {
    let config: KernelConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}

/// Apply command-line overrides.
pub fn with_overrides(mut config: KernelConfig, lazy: bool) -> KernelConfig {
    if lazy {
        config.on_cell_change = OnCellChange::Lazy;
    }
    config
}
