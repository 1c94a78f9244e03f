//! Loading the optional TOML config file from disk.

use std::path::Path;

use crate::domain::config::{ConfigError, ConfigFile};

/// Reads and validates the config file at `path`.
///
/// A path given explicitly must exist; only running without `--config`
/// falls back to [`ConfigFile::default`].
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, otherwise whatever
/// [`ConfigFile::from_toml_str`] reports.
pub fn load(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigFile::from_toml_str(&content)
}

/// [`load`] when a path was given, defaults otherwise.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    match path {
        Some(path) => load(path),
        None => Ok(ConfigFile::default()),
    }
}
