// src/core/paths.rs

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILENAME};
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

lazy_static! {
    static ref TANDEM_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
}

/// Returns the path to the tandem configuration directory (`~/.config/tandem`).
///
/// The directory is not created; a missing directory simply means no user
/// configuration. The path is computed once and cached.
pub fn get_tandem_config_dir() -> Result<PathBuf, PathError> {
    let mut cached_path_guard = TANDEM_CONFIG_DIR
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(path) = &*cached_path_guard {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(CONFIG_DIR_NAME);

    *cached_path_guard = Some(config_path.clone());
    Ok(config_path)
}

/// Returns the path of the user's `config.toml`.
pub fn get_default_config_path() -> Result<PathBuf, PathError> {
    get_tandem_config_dir().map(|dir| dir.join(CONFIG_FILENAME))
}
