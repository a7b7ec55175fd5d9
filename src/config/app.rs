//! Application configuration structures.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::collector::CollectorsConfig;
use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default listen port, as registered for the LSF exporter.
pub const DEFAULT_PORT: u16 = 9818;

/// Default path under which metrics are exposed.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Default maximum number of parallel scrape requests.
pub const DEFAULT_MAX_REQUESTS: usize = 40;

fn default_envdir() -> String {
    "${LSF_ENVDIR}".to_string()
}

fn default_bindir() -> String {
    "${LSF_BINDIR}".to_string()
}

fn default_serverdir() -> String {
    "${LSF_SERVERDIR}".to_string()
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 9818).
    pub port: u16,

    /// Path under which to expose metrics (default: "/metrics").
    pub metrics_path: String,

    /// Maximum number of parallel scrape requests, 0 disables the limit (default: 40).
    pub max_requests: usize,

    /// Leave out `process_*` and `promhttp_*` metrics about the exporter itself.
    pub disable_exporter_metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            max_requests: DEFAULT_MAX_REQUESTS,
            disable_exporter_metrics: false,
        }
    }
}

// =============================================================================
// LSF Configuration
// =============================================================================

/// Location of the LSF installation the collectors talk to.
///
/// Path values may reference environment variables with `${VAR}` or
/// `${VAR:-default}`; by default each one is read from the matching
/// `LSF_*` variable that `profile.lsf` exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LsfConfig {
    /// Directory holding `lsf.conf` (`LSF_ENVDIR`).
    #[serde(default = "default_envdir")]
    pub envdir: String,

    /// Directory holding the user commands (`LSF_BINDIR`).
    #[serde(default = "default_bindir")]
    pub bindir: String,

    /// Directory holding the daemons (`LSF_SERVERDIR`).
    #[serde(default = "default_serverdir")]
    pub serverdir: String,

    /// Shared library directory (`LSF_LIBDIR`), optional.
    #[serde(default)]
    pub libdir: Option<String>,

    /// Kill a scheduler command that runs longer than this. Unset means no limit.
    #[serde(default, with = "humantime_serde")]
    pub command_timeout: Option<Duration>,
}

impl Default for LsfConfig {
    fn default() -> Self {
        Self {
            envdir: default_envdir(),
            bindir: default_bindir(),
            serverdir: default_serverdir(),
            libdir: None,
            command_timeout: None,
        }
    }
}

impl LsfConfig {
    /// `LSF_ENVDIR` after environment expansion.
    pub fn envdir_path(&self) -> PathBuf {
        expand_path(&self.envdir)
    }

    /// `LSF_BINDIR` after environment expansion.
    pub fn bindir_path(&self) -> PathBuf {
        expand_path(&self.bindir)
    }

    /// `LSF_SERVERDIR` after environment expansion.
    pub fn serverdir_path(&self) -> PathBuf {
        expand_path(&self.serverdir)
    }

    /// `LSF_LIBDIR` after environment expansion, if configured and non-empty.
    pub fn libdir_path(&self) -> Option<PathBuf> {
        self.libdir
            .as_deref()
            .map(expand_path)
            .filter(|p| !p.as_os_str().is_empty())
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(expand_env_vars(raw).trim())
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// LSF installation layout.
    #[serde(default)]
    pub lsf: LsfConfig,

    /// Collector enablement overrides.
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Directory existence is checked separately when the LSF environment is
    /// built, so a config file can be validated on a machine without LSF.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if !self.server.metrics_path.starts_with('/') || self.server.metrics_path.len() < 2 {
            return Err(ConfigError::ValidationError(format!(
                "metrics_path must start with '/' and name a path: '{}'",
                self.server.metrics_path
            )));
        }

        if self.lsf.command_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationError(
                "lsf command_timeout must be positive".to_string(),
            ));
        }

        self.collectors.validate()?;

        Ok(())
    }
}
