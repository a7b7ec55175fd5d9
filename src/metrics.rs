//! Metric descriptors, samples and text exposition.
//!
//! Collectors describe their series once with [`MetricDesc`] and push
//! [`Sample`]s through a [`SampleSink`] during a scrape. The orchestrator
//! hands the collected samples to [`encode_text`], which renders them with
//! the `prometheus` crate. [`ExporterMetrics`] describes the exporter
//! process itself and outlives every scrape.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::sync::mpsc::UnboundedSender;

/// Namespace shared by every exported series.
pub const NAMESPACE: &str = "lsf";

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Immutable identity of one exported series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    fq_name: String,
    help: String,
    label_names: Vec<String>,
}

impl MetricDesc {
    /// Build a descriptor, joining the non-empty name parts with `_`.
    pub fn new(
        namespace: &str,
        subsystem: &str,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Arc<Self> {
        let fq_name = [namespace, subsystem, name]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_");

        Arc::new(Self {
            fq_name,
            help: help.to_string(),
            label_names: labels.iter().map(|l| l.to_string()).collect(),
        })
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// One concrete value of a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub desc: Arc<MetricDesc>,
    pub value: f64,
    pub label_values: Vec<String>,
}

impl Sample {
    /// Label value for `name`, if the descriptor declares it.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .label_names
            .iter()
            .position(|l| l == name)
            .and_then(|i| self.label_values.get(i))
            .map(String::as_str)
    }
}

/// Write half of the per-scrape sample channel.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: UnboundedSender<Sample>,
}

impl SampleSink {
    pub fn new(tx: UnboundedSender<Sample>) -> Self {
        Self { tx }
    }

    /// Emit one sample.
    ///
    /// # Panics
    /// Panics if the number of label values differs from the number of
    /// label names declared by `desc`. That is a collector bug.
    pub fn emit(&self, desc: &Arc<MetricDesc>, value: f64, label_values: &[&str]) {
        assert_eq!(
            desc.label_names.len(),
            label_values.len(),
            "label cardinality mismatch for {}",
            desc.fq_name
        );

        let sample = Sample {
            desc: Arc::clone(desc),
            value,
            label_values: label_values.iter().map(|v| v.to_string()).collect(),
        };
        if self.tx.send(sample).is_err() {
            tracing::debug!(metric = %desc.fq_name, "Sample receiver dropped");
        }
    }
}

/// Status codes whose request counters exist before the first request.
const PRESET_CODES: &[&str] = &["200", "500", "503"];

/// Process and HTTP handler metrics of the exporter itself.
#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    requests: IntCounterVec,
    in_flight: IntGauge,
}

impl std::fmt::Debug for ExporterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterMetrics")
            .field("in_flight", &self.in_flight.get())
            .finish_non_exhaustive()
    }
}

impl ExporterMetrics {
    /// Register the process collector and the request counters.
    ///
    /// Process metrics are only available on Linux.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        let requests = IntCounterVec::new(
            Opts::new(
                "promhttp_metric_handler_requests_total",
                "Total number of scrapes by HTTP status code.",
            ),
            &["code"],
        )?;
        let in_flight = IntGauge::new(
            "promhttp_metric_handler_requests_in_flight",
            "Current number of scrapes being served.",
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;

        for code in PRESET_CODES {
            requests.with_label_values(&[*code]);
        }

        Ok(Self {
            registry,
            requests,
            in_flight,
        })
    }

    pub fn request_started(&self) {
        self.in_flight.inc();
    }

    pub fn request_finished(&self, code: u16) {
        self.in_flight.dec();
        let code = code.to_string();
        self.requests.with_label_values(&[code.as_str()]).inc();
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

/// Render samples in the Prometheus text exposition format.
///
/// Samples sharing a descriptor become one metric family. A later sample
/// with the same label values replaces an earlier one.
pub fn encode_text(samples: &[Sample]) -> Result<String, prometheus::Error> {
    encode_with(samples, Vec::new())
}

/// Render samples together with already gathered metric families.
///
/// Families are written in name order.
pub fn encode_with(
    samples: &[Sample],
    mut families: Vec<MetricFamily>,
) -> Result<String, prometheus::Error> {
    let registry = Registry::new();
    let mut gauges: HashMap<&str, GaugeVec> = HashMap::new();

    for sample in samples {
        let family = match gauges.entry(sample.desc.fq_name()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let labels: Vec<&str> = sample.desc.label_names.iter().map(String::as_str).collect();
                let gauge = GaugeVec::new(Opts::new(sample.desc.fq_name(), sample.desc.help()), &labels)?;
                registry.register(Box::new(gauge.clone()))?;
                entry.insert(gauge)
            }
        };

        let values: Vec<&str> = sample.label_values.iter().map(String::as_str).collect();
        family.get_metric_with_label_values(&values)?.set(sample.value);
    }

    families.extend(registry.gather());
    families.sort_by(|a, b| a.get_name().cmp(b.get_name()));

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
