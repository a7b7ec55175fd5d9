//! Configuration module for the LSF exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (bind address, port, metrics path, request limit)
//! - LSF installation layout (`LSF_ENVDIR`, `LSF_BINDIR`, ...)
//! - Collector enablement overrides

mod app;
mod collector;
mod validation;

pub use app::{AppConfig, LsfConfig, ServerConfig};
pub use collector::CollectorsConfig;
pub use validation::{ConfigError, expand_env_vars, parse_duration, require_dir};

// Re-export constants
pub use app::{DEFAULT_MAX_REQUESTS, DEFAULT_METRICS_PATH, DEFAULT_PORT};
