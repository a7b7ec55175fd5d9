//! Concurrent scrape orchestration.
//!
//! A scrape resolves the requested collectors, runs each one in its own
//! tokio task against a shared sample channel, waits for all of them, and
//! appends per-collector duration and success samples.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::collector::{CollectorKind, CollectorRegistry, ScrapeError};
use crate::command::CommandSource;
use crate::metrics::{ExporterMetrics, MetricDesc, NAMESPACE, Sample, SampleSink, encode_with};

/// Result of one collector within one scrape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrapeOutcome {
    pub collector: CollectorKind,
    pub duration: Duration,
    pub success: bool,
}

/// Everything one scrape produced.
#[derive(Debug, Clone)]
pub struct ScrapeReport {
    /// Collector samples, in arrival order.
    pub samples: Vec<Sample>,
    /// One outcome per selected collector, sorted by name.
    pub outcomes: Vec<ScrapeOutcome>,
    /// Duration, success and build info samples.
    pub meta: Vec<Sample>,
}

impl ScrapeReport {
    pub fn outcome(&self, kind: CollectorKind) -> Option<&ScrapeOutcome> {
        self.outcomes.iter().find(|o| o.collector == kind)
    }

    /// Render collector and meta samples in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        self.render_with(None)
    }

    /// Render the report, appending the exporter's own metrics if given.
    pub fn render_with(&self, exporter: Option<&ExporterMetrics>) -> Result<String, prometheus::Error> {
        let all: Vec<Sample> = self.samples.iter().chain(&self.meta).cloned().collect();
        let families = exporter.map(ExporterMetrics::gather).unwrap_or_default();
        encode_with(&all, families)
    }
}

/// Runs scrapes against a fixed registry and command source.
pub struct Scraper {
    registry: CollectorRegistry,
    source: Arc<dyn CommandSource>,
    duration: Arc<MetricDesc>,
    success: Arc<MetricDesc>,
    build_info: Arc<MetricDesc>,
}

impl std::fmt::Debug for Scraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scraper")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Scraper {
    pub fn new(registry: CollectorRegistry, source: Arc<dyn CommandSource>) -> Self {
        Self {
            registry,
            source,
            duration: MetricDesc::new(
                NAMESPACE,
                "scrape",
                "collector_duration_seconds",
                "lsf_exporter: Duration of a collector scrape.",
                &["collector"],
            ),
            success: MetricDesc::new(
                NAMESPACE,
                "scrape",
                "collector_success",
                "lsf_exporter: Whether a collector succeeded.",
                &["collector"],
            ),
            build_info: MetricDesc::new(
                NAMESPACE,
                "exporter",
                "build_info",
                "A metric with a constant '1' value labeled by the lsf_exporter version.",
                &["version"],
            ),
        }
    }

    pub fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    /// Run the selected collectors concurrently.
    ///
    /// A failing collector is reported through its outcome and the other
    /// collectors' samples are still returned.
    ///
    /// # Errors
    /// Returns `ScrapeError` before any command runs if a filter names an
    /// unknown or disabled collector.
    ///
    /// # Panics
    /// Re-raises a panic from a collector task.
    pub async fn scrape(&self, filters: &[String]) -> Result<ScrapeReport, ScrapeError> {
        let kinds = self.registry.select(filters)?;
        tracing::debug!(collectors = kinds.len(), "Starting scrape");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();

        for &kind in &kinds {
            let collector = self.registry.instance(kind);
            let source = Arc::clone(&self.source);
            let sink = SampleSink::new(tx.clone());
            let span = tracing::info_span!("collector", collector = %kind);

            tasks.spawn(
                async move {
                    let start = Instant::now();
                    let result = collector.update(source.as_ref(), &sink).await;
                    let duration = start.elapsed();

                    match &result {
                        Ok(()) => tracing::debug!(
                            duration_ms = duration.as_millis() as u64,
                            "Collector succeeded"
                        ),
                        Err(e) => tracing::error!(
                            error = %e,
                            duration_ms = duration.as_millis() as u64,
                            "Collector failed"
                        ),
                    }

                    ScrapeOutcome {
                        collector: kind,
                        duration,
                        success: result.is_ok(),
                    }
                }
                .instrument(span),
            );
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(kinds.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => tracing::warn!(error = %e, "Collector task cancelled"),
            }
        }

        for &kind in &kinds {
            if !outcomes.iter().any(|o| o.collector == kind) {
                outcomes.push(ScrapeOutcome {
                    collector: kind,
                    duration: Duration::ZERO,
                    success: false,
                });
            }
        }
        outcomes.sort_by_key(|o| o.collector.as_ref().to_string());

        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }

        let meta = self.meta_samples(&outcomes);
        Ok(ScrapeReport {
            samples,
            outcomes,
            meta,
        })
    }

    fn meta_samples(&self, outcomes: &[ScrapeOutcome]) -> Vec<Sample> {
        let sample = |desc: &Arc<MetricDesc>, value: f64, label: &str| Sample {
            desc: Arc::clone(desc),
            value,
            label_values: vec![label.to_string()],
        };

        let mut meta = Vec::with_capacity(outcomes.len() * 2 + 1);
        for outcome in outcomes {
            let name = outcome.collector.as_ref();
            meta.push(sample(&self.duration, outcome.duration.as_secs_f64(), name));
            meta.push(sample(
                &self.success,
                if outcome.success { 1.0 } else { 0.0 },
                name,
            ));
        }
        meta.push(sample(&self.build_info, 1.0, env!("CARGO_PKG_VERSION")));
        meta
    }
}
