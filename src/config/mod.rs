//! Configuration file loading and saving.
//!
//! This module is the only place that reads the process environment or the
//! configuration file. Everything downstream receives plain values.
//!
//! # Configuration Directory
//!
//! Searched in the following order:
//!
//! 1. Path specified via the `--config-dir` CLI flag
//! 2. The `RUNOS_CONFIG_DIR` environment variable
//! 3. Default location:
//!    - **Linux/macOS:** `~/.runos/`
//!    - **Windows:** `%USERPROFILE%\.runos\`
//!
//! The directory holds `config.json`, the cached `manifest.yaml` and the
//! manifest check timestamp.

mod settings;

pub use settings::{
    Config, ConfigKey, EnvOverrides, FirebaseConfig, LoggingConfig, DEFAULT_CONDUCTOR_URL,
    DEFAULT_CONSOLE_URL, DEFAULT_JOBS_ENDPOINT,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// File name of the configuration inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Returns the default configuration directory.
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".runos"))
}

/// Resolves the configuration directory from an explicit override, the
/// environment, or the default location.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigDir`] if no home directory can be determined.
pub fn config_dir(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = std::env::var_os("RUNOS_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    default_config_dir().ok_or(ConfigError::NoConfigDir)
}

/// Loads the configuration from `dir` and attaches environment overrides.
///
/// A missing file yields the defaults; nothing is written.
///
/// # Errors
///
/// Returns an error if:
/// - The file exists but cannot be read
/// - The JSON is malformed or has unknown fields
/// - Validation fails
pub fn load_config(dir: &Path) -> Result<Config, ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    let config = if config_path.exists() {
        let contents =
            std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
                path: config_path.clone(),
                source: e,
            })?;
        serde_json::from_str::<Config>(&contents).map_err(|e| ConfigError::ParseError {
            path: config_path.clone(),
            source: e,
        })?
    } else {
        tracing::debug!(path = %config_path.display(), "No config file, using defaults");
        Config::default()
    };

    config.validate()?;

    Ok(config.with_env(EnvOverrides::from_env()))
}

/// Writes the configuration to `dir`, creating the directory if needed.
///
/// On Unix the file is created with mode `0600` since it may hold a
/// refresh token.
///
/// # Errors
///
/// Returns [`ConfigError::WriteError`] if the directory or file cannot be written.
pub fn save_config(dir: &Path, config: &Config) -> Result<(), ConfigError> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    let write_error = |source| ConfigError::WriteError {
        path: config_path.clone(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(write_error)?;

    let mut json = serde_json::to_string_pretty(config).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;
    json.push('\n');
    std::fs::write(&config_path, json).map_err(write_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
            .map_err(write_error)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_dir_exists() {
        let dir = default_config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with(".runos"));
    }

    #[test]
    fn explicit_dir_wins() {
        let dir = config_dir(Some(Path::new("/tmp/runos-test"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/runos-test"));
    }

    #[test]
    fn missing_file_yields_defaults_without_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert!(!tmp.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        let mut config = Config::default();
        config.set(ConfigKey::ClusterId, "c-42").unwrap();
        save_config(&dir, &config).unwrap();

        let loaded = load_config(&dir).unwrap();
        assert_eq!(loaded.default_cluster_id.as_deref(), Some("c-42"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "{not json").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
