// src/core/config_loader.rs

//! # Config Loader
//!
//! Builds the [`ShellConfig`] of a session from three layers, lowest priority
//! first: built-in defaults, the TOML file, and command-line overrides. The
//! merged result is validated before the shell sees it.

use crate::{
    constants::MIN_SLOT_CAPACITY,
    core::paths::{self, PathError},
    models::ShellConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Path(#[from] PathError),
}

/// Settings given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub prompt: Option<String>,
    pub slot_capacity: Option<usize>,
    pub poll_interval_ms: Option<u64>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut ShellConfig) {
        if let Some(prompt) = &self.prompt {
            config.prompt = prompt.clone();
        }
        if let Some(capacity) = self.slot_capacity {
            config.slot_capacity = capacity;
        }
        if let Some(interval) = self.poll_interval_ms {
            config.poll_interval_ms = interval;
        }
    }
}

/// Loads the session configuration.
///
/// With `explicit_path` the file must exist. Without it the user's default
/// `config.toml` is used when present, and defaults otherwise.
pub fn load(
    explicit_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ShellConfig, ConfigError> {
    // 1. Pick the file layer, if any.
    let file = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => match paths::get_default_config_path() {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                log::debug!("No default config location: {}", e);
                None
            }
        },
    };

    // 2. Defaults, replaced wholesale by the file when there is one.
    let mut config = match &file {
        Some(path) => load_file(path)?,
        None => ShellConfig::default(),
    };

    // 3. Command-line overrides win.
    overrides.apply(&mut config);

    validate(&config)?;
    log::debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Reads and parses one config file. Missing keys keep their defaults.
pub fn load_file(path: &Path) -> Result<ShellConfig, ConfigError> {
    log::debug!("Loading config file '{}'", path.display());
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

pub fn validate(config: &ShellConfig) -> Result<(), ConfigError> {
    if config.slot_capacity < MIN_SLOT_CAPACITY {
        return Err(ConfigError::Invalid {
            field: "slot_capacity",
            reason: format!(
                "must be at least {}, got {}",
                MIN_SLOT_CAPACITY, config.slot_capacity
            ),
        });
    }
    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid {
            field: "poll_interval_ms",
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.null_device.as_os_str().is_empty() {
        return Err(ConfigError::Invalid {
            field: "null_device",
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}
