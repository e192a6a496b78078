//! Workflow-service configuration persisted as JSON.
//!
//! The file lives at `$CORRAL_CONFIG_PATH` when set, otherwise at
//! `<config_dir>/corral/config.json` (`~/.config/corral/config.json` on most
//! Linux systems). Every field is optional; a missing file is equivalent to an
//! empty one. After the file is read, `CORRAL_URL`, `CORRAL_USERNAME` and
//! `CORRAL_PASSWORD` override the corresponding values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::expand_tilde;

/// Environment variable allowing callers to override the configuration file path.
pub const CONFIG_PATH_ENV: &str = "CORRAL_CONFIG_PATH";
pub const URL_ENV: &str = "CORRAL_URL";
pub const USERNAME_ENV: &str = "CORRAL_USERNAME";
pub const PASSWORD_ENV: &str = "CORRAL_PASSWORD";

/// Default filename for the JSON payload.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Error surfaced when reading the configuration fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error for {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Connection defaults for the workflow engine.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ServiceConfig {
    /// API base URL used when a component does not name one.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Run-wide TLS verification setting; unset defers to each component.
    #[serde(default)]
    pub verify_ssl: Option<bool>,
}

impl ServiceConfig {
    /// Apply `CORRAL_*` environment overrides on top of file values.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(url) = non_empty_env(URL_ENV) {
            self.url = Some(url);
        }
        if let Some(username) = non_empty_env(USERNAME_ENV) {
            self.username = Some(username);
        }
        if let Some(password) = non_empty_env(PASSWORD_ENV) {
            self.password = Some(password);
        }
        self
    }
}

/// Returns the default path for the configuration file.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("corral")
        .join(CONFIG_FILE_NAME)
}

/// Loads the configuration from the default path and applies environment overrides.
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    load_config_from_path(&default_config_path()).map(ServiceConfig::apply_env_overrides)
}

/// Loads the configuration file at `path` without environment overrides.
pub fn load_config_from_path(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found; using defaults");
        return Ok(ServiceConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(ServiceConfig::default());
    }
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
