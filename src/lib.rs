//! LSF Exporter - Prometheus metrics for IBM Spectrum LSF
//!
//! This crate polls the LSF command-line tools (`bhosts`, `bqueues`,
//! `lshosts`, `lsload`, `lsid`, `bjobs`), decodes their tabular output and
//! republishes the values in the Prometheus text exposition format. It can
//! be used as a library or run as the `lsf-exporter` binary.
//!
//! # Architecture
//!
//! - **Command**: Runs LSF commands inside a validated LSF environment
//! - **Table**: Decodes header-plus-rows command output into records
//! - **Normalize**: Maps status words, sizes and placeholders to numbers
//! - **Collector**: One collector per command, plus the registry
//! - **Scrape**: Runs the selected collectors concurrently per request
//! - **Server**: Axum front end exposing `/metrics`
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lsf_exporter::{CollectorRegistry, CommandRunner, LsfConfig, LsfEnvironment, Scraper};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let env = LsfEnvironment::new(&LsfConfig::default())?;
//! let scraper = Scraper::new(CollectorRegistry::new(), Arc::new(CommandRunner::new(env)));
//!
//! let report = scraper.scrape(&[]).await?;
//! println!("{}", report.render()?);
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod command;
pub mod config;
pub mod metrics;
pub mod normalize;
pub mod scrape;
pub mod server;
pub mod table;

pub use collector::{
    ClusterIdentity, Collector, CollectorError, CollectorKind, CollectorRegistry, ScrapeError,
};
pub use command::{CommandRunner, CommandSource, ExecutionError, LsfEnvironment};
pub use config::{AppConfig, CollectorsConfig, ConfigError, LsfConfig, ServerConfig};
pub use metrics::{ExporterMetrics, MetricDesc, Sample, SampleSink, encode_text, encode_with};
pub use normalize::NormalizeError;
pub use scrape::{ScrapeOutcome, ScrapeReport, Scraper};
pub use server::{AppState, create_router};
pub use table::{DecodeError, RawRecord, TableDecoder, TableFormat};
