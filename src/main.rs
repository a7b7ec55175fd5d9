//! LSF Exporter Binary Entry Point
//!
//! Runs the HTTP exporter. Core functionality is provided by the
//! `lsf_exporter` library crate.

use clap::Parser;
use lsf_exporter::{
    collector::CollectorRegistry,
    command::{CommandRunner, LsfEnvironment},
    config::{AppConfig, CollectorsConfig},
    scrape::Scraper,
    server::{AppState, create_router},
};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// LSF Exporter - Prometheus metrics for IBM Spectrum LSF
#[derive(Parser, Debug)]
#[command(name = "lsf-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (optional)
    #[arg(short, long, env = "LSF_EXPORTER_CONFIG")]
    config: Option<String>,

    /// Server bind address (overrides config file)
    #[arg(long, env = "LSF_EXPORTER_SERVER_BIND")]
    server_bind: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, env = "LSF_EXPORTER_SERVER_PORT")]
    server_port: Option<u16>,

    /// Path under which to expose metrics (overrides config file)
    #[arg(long, env = "LSF_EXPORTER_METRICS_PATH")]
    metrics_path: Option<String>,

    /// Maximum number of parallel scrape requests, 0 disables the limit
    #[arg(long, env = "LSF_EXPORTER_MAX_REQUESTS")]
    max_requests: Option<usize>,

    /// Directory holding lsf.conf
    #[arg(long, env = "LSF_ENVDIR")]
    lsf_envdir: Option<String>,

    /// Directory holding the LSF user commands
    #[arg(long, env = "LSF_BINDIR")]
    lsf_bindir: Option<String>,

    /// Directory holding the LSF daemons
    #[arg(long, env = "LSF_SERVERDIR")]
    lsf_serverdir: Option<String>,

    /// LSF shared library directory
    #[arg(long, env = "LSF_LIBDIR")]
    lsf_libdir: Option<String>,

    /// Kill an LSF command that runs longer than this (e.g. "30s")
    #[arg(long, env = "LSF_EXPORTER_COMMAND_TIMEOUT", value_parser = lsf_exporter::config::parse_duration)]
    command_timeout: Option<Duration>,

    /// Enable a collector (repeatable)
    #[arg(long = "collector", value_name = "NAME")]
    collectors: Vec<String>,

    /// Disable a collector (repeatable)
    #[arg(long = "no-collector", value_name = "NAME")]
    no_collectors: Vec<String>,

    /// Disable every collector not enabled with --collector or in the config file
    #[arg(long)]
    disable_default_collectors: bool,

    /// Exclude metrics about the exporter itself (process_*, promhttp_*)
    #[arg(long, env = "LSF_EXPORTER_DISABLE_EXPORTER_METRICS")]
    disable_exporter_metrics: bool,
}

impl Cli {
    /// Collector overrides given on the command line.
    fn collectors_config(&self) -> CollectorsConfig {
        let enabled = self
            .collectors
            .iter()
            .map(|name| (name.clone(), true))
            .chain(self.no_collectors.iter().map(|name| (name.clone(), false)))
            .collect::<BTreeMap<_, _>>();

        CollectorsConfig {
            disable_defaults: self.disable_default_collectors,
            enabled,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,lsf_exporter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting lsf_exporter");

    // Parse CLI arguments
    let cli = Cli::parse();

    if effective_uid() == Some(0) {
        tracing::warn!(
            "lsf_exporter is running as root user. It is designed to run as an unprivileged user, root is not required."
        );
    }

    // Load configuration from file, if any
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(bind) = cli.server_bind.clone() {
        config.server.bind = bind;
    }
    if let Some(port) = cli.server_port {
        config.server.port = port;
    }
    if let Some(path) = cli.metrics_path.clone() {
        config.server.metrics_path = path;
    }
    if let Some(max) = cli.max_requests {
        config.server.max_requests = max;
    }
    if cli.disable_exporter_metrics {
        config.server.disable_exporter_metrics = true;
    }
    if let Some(dir) = cli.lsf_envdir.clone() {
        config.lsf.envdir = dir;
    }
    if let Some(dir) = cli.lsf_bindir.clone() {
        config.lsf.bindir = dir;
    }
    if let Some(dir) = cli.lsf_serverdir.clone() {
        config.lsf.serverdir = dir;
    }
    if let Some(dir) = cli.lsf_libdir.clone() {
        config.lsf.libdir = Some(dir);
    }
    if cli.command_timeout.is_some() {
        config.lsf.command_timeout = cli.command_timeout;
    }
    config.collectors = config.collectors.merge(cli.collectors_config());
    config.validate()?;

    // LSF directories must exist before the first scrape
    let env = LsfEnvironment::new(&config.lsf)?;
    tracing::info!(
        bindir = %env.bindir().display(),
        timeout = ?config.lsf.command_timeout,
        "LSF environment validated"
    );
    let runner = CommandRunner::new(env).with_timeout(config.lsf.command_timeout);

    let mut registry = CollectorRegistry::new();
    registry.configure(&config.collectors)?;
    for kind in registry.enabled() {
        tracing::info!(collector = %kind, "Collector enabled");
    }

    let scraper = Arc::new(Scraper::new(registry, Arc::new(runner)));
    let app_state = AppState::from_config(scraper, &config.server)?;
    if app_state.exporter_metrics.is_none() {
        tracing::info!("Exporter metrics disabled");
    }

    // Build Axum router
    let app = create_router(app_state);

    let addr = SocketAddr::new(config.server.bind.parse::<IpAddr>()?, config.server.port);

    tracing::info!(
        "Listening on: http://{}{}",
        addr,
        config.server.metrics_path
    );
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}

/// Effective user id of this process, read from `/proc/self/status`.
fn effective_uid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_effective_uid(&status)
}

/// Second field of the `Uid:` line (real, effective, saved, filesystem).
fn parse_effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().nth(1))
        .and_then(|uid| uid.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_effective_uid() {
        let status = "Name:\tlsf-exporter\nUmask:\t0022\nUid:\t1000\t0\t0\t0\nGid:\t100\t100\t100\t100\n";
        assert_eq!(parse_effective_uid(status), Some(0));
        assert_eq!(parse_effective_uid("Uid:\t1000\t1000\t1000\t1000\n"), Some(1000));
        assert_eq!(parse_effective_uid("Name:\tlsf-exporter\n"), None);
    }

    #[test]
    fn test_disable_exporter_metrics_flag() {
        let cli = Cli::parse_from(["lsf-exporter", "--disable-exporter-metrics"]);
        assert!(cli.disable_exporter_metrics);

        let cli = Cli::parse_from(["lsf-exporter", "--collector", "lsfjob", "--no-collector", "lsload"]);
        assert!(!cli.disable_exporter_metrics);
        let collectors = cli.collectors_config();
        assert_eq!(collectors.enabled.get("lsfjob"), Some(&true));
        assert_eq!(collectors.enabled.get("lsload"), Some(&false));
    }
}
