//! Configuration structures for (de)serialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Environment overrides are captured separately in [`EnvOverrides`] and
//! consulted by the accessor methods, so the file contents are never
//! rewritten with values that only came from the environment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Console URL used when neither the environment nor the file sets one.
pub const DEFAULT_CONSOLE_URL: &str = "https://console.beta.runos.com";

/// Conductor URL used when neither the environment nor the file sets one.
pub const DEFAULT_CONDUCTOR_URL: &str = "http://localhost:3025";

/// Job status endpoint used by `--wait`.
pub const DEFAULT_JOBS_ENDPOINT: &str = "/api/v1/jobs/:job_id";

/// Values read from the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `CONSOLE_URL`.
    pub console_url: Option<String>,
    /// `CONDUCTOR_API_URL`.
    pub conductor_url: Option<String>,
    /// `RUNOS_CLUSTER_ID`.
    pub cluster_id: Option<String>,
    /// `RUNOS_TOKEN`.
    pub token: Option<String>,
}

impl EnvOverrides {
    /// Reads the overrides from the current environment. Empty values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            console_url: var("CONSOLE_URL"),
            conductor_url: var("CONDUCTOR_API_URL"),
            cluster_id: var("RUNOS_CLUSTER_ID"),
            token: var("RUNOS_TOKEN"),
        }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,

    /// Console API base URL, used by the command tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_url: Option<String>,

    /// Conductor API base URL, used by the MCP server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conductor_url: Option<String>,

    /// Account ID, set with `runos config set account-id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    /// Cluster used when `--cid` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_cluster_id: Option<String>,

    /// Refresh token for the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Identity provider settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase: Option<FirebaseConfig>,

    /// Job status endpoint template (`:job_id` placeholder).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs_endpoint: Option<String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(skip)]
    env: EnvOverrides,
}

impl Config {
    /// Attaches environment overrides.
    #[must_use]
    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        self.env = env;
        self
    }

    /// Effective console URL.
    #[must_use]
    pub fn console_url(&self) -> &str {
        self.env
            .console_url
            .as_deref()
            .or_else(|| non_empty(self.console_url.as_deref()))
            .unwrap_or(DEFAULT_CONSOLE_URL)
    }

    /// Effective conductor URL.
    #[must_use]
    pub fn conductor_url(&self) -> &str {
        self.env
            .conductor_url
            .as_deref()
            .or_else(|| non_empty(self.conductor_url.as_deref()))
            .unwrap_or(DEFAULT_CONDUCTOR_URL)
    }

    /// Effective default cluster ID.
    #[must_use]
    pub fn default_cluster_id(&self) -> Option<&str> {
        self.env
            .cluster_id
            .as_deref()
            .or_else(|| non_empty(self.default_cluster_id.as_deref()))
    }

    /// Account ID, if logged in.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        non_empty(self.account_id.as_deref())
    }

    /// Static bearer token from the environment.
    #[must_use]
    pub fn static_token(&self) -> Option<&str> {
        self.env.token.as_deref()
    }

    /// Stored refresh token.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(self.refresh_token.as_deref())
    }

    /// Identity provider API key.
    #[must_use]
    pub fn firebase_api_key(&self) -> Option<&str> {
        self.firebase
            .as_ref()
            .and_then(|f| non_empty(f.api_key.as_deref()))
    }

    /// Effective job status endpoint template.
    #[must_use]
    pub fn jobs_endpoint(&self) -> &str {
        non_empty(self.jobs_endpoint.as_deref()).unwrap_or(DEFAULT_JOBS_ENDPOINT)
    }

    /// Effective value for a `config get` key.
    #[must_use]
    pub fn get(&self, key: ConfigKey) -> Option<String> {
        match key {
            ConfigKey::ClusterId => self.default_cluster_id().map(str::to_string),
            ConfigKey::AccountId => self.account_id().map(str::to_string),
            ConfigKey::ConsoleUrl => Some(self.console_url().to_string()),
            ConfigKey::ConductorUrl => Some(self.conductor_url().to_string()),
            ConfigKey::JobsEndpoint => Some(self.jobs_endpoint().to_string()),
        }
    }

    /// Stores a value for a `config set` key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an empty account ID and
    /// for URLs that are not `http(s)`.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
        let value = value.trim().to_string();
        match key {
            ConfigKey::ClusterId => self.default_cluster_id = Some(value),
            ConfigKey::AccountId => {
                if value.is_empty() {
                    return Err(ConfigError::ValidationError {
                        message: "account-id must not be empty".to_string(),
                    });
                }
                self.account_id = Some(value);
            }
            ConfigKey::ConsoleUrl => {
                check_url("console-url", &value)?;
                self.console_url = Some(value);
            }
            ConfigKey::ConductorUrl => {
                check_url("conductor-url", &value)?;
                self.conductor_url = Some(value);
            }
            ConfigKey::JobsEndpoint => {
                if !value.starts_with('/') {
                    return Err(ConfigError::ValidationError {
                        message: format!("jobs-endpoint must start with '/', got '{value}'"),
                    });
                }
                self.jobs_endpoint = Some(value);
            }
        }
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = non_empty(self.console_url.as_deref()) {
            check_url("console_url", url)?;
        }
        if let Some(url) = non_empty(self.conductor_url.as_deref()) {
            check_url("conductor_url", url)?;
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn check_url(key: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: format!("{key} must be an http(s) URL, got '{url}'"),
        })
    }
}

/// Identity provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirebaseConfig {
    /// Web API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Auth domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,
    /// Project ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Keys accepted by `runos config get` and `runos config set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// `cid`: default cluster ID.
    ClusterId,
    /// `account-id`: account the endpoints are scoped to.
    AccountId,
    /// `console-url`.
    ConsoleUrl,
    /// `conductor-url`.
    ConductorUrl,
    /// `jobs-endpoint`.
    JobsEndpoint,
}

impl ConfigKey {
    /// Every key, in display order.
    pub const ALL: [Self; 5] = [
        Self::ClusterId,
        Self::AccountId,
        Self::ConsoleUrl,
        Self::ConductorUrl,
        Self::JobsEndpoint,
    ];

    const AVAILABLE: &'static str = "cid, account-id, console-url, conductor-url, jobs-endpoint";

    /// Key name as typed on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClusterId => "cid",
            Self::AccountId => "account-id",
            Self::ConsoleUrl => "console-url",
            Self::ConductorUrl => "conductor-url",
            Self::JobsEndpoint => "jobs-endpoint",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownKey {
                key: s.to_string(),
                available: Self::AVAILABLE,
            })
    }
}
