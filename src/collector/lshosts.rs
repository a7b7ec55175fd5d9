//! `lshosts` collector: static host capacity.

use std::sync::Arc;

use crate::command::CommandSource;
use crate::metrics::{MetricDesc, NAMESPACE, SampleSink};
use crate::normalize::{ServerType, parse_limit, parse_size_kib, strip_parens};
use crate::table::{DecodeError, FromRecord, RawRecord, TableFormat, decode_rows};

use super::types::{CollectorError, CollectorKind, value_or_sentinel};

const KIND: CollectorKind = CollectorKind::Lshosts;
const SUBSYSTEM: &str = "lshosts";
const LABELS: &[&str] = &["host_name", "host_type", "host_model", "server_type", "resource_type"];

/// One row of `lshosts -w`. RESOURCES is the free-text last column and may
/// be absent.
#[derive(Debug, Clone, PartialEq)]
struct StaticHostRow {
    host_name: String,
    host_type: String,
    model: String,
    cpuf: String,
    ncpus: String,
    maxmem: String,
    maxswp: String,
    server: String,
    resources: String,
}

impl FromRecord for StaticHostRow {
    fn from_record(record: &RawRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            host_name: record.require("HOST_NAME")?.to_string(),
            host_type: record.require("type")?.to_string(),
            model: record.require("model")?.to_string(),
            cpuf: record.require("cpuf")?.to_string(),
            ncpus: record.require("ncpus")?.to_string(),
            maxmem: record.require("maxmem")?.to_string(),
            maxswp: record.require("maxswp")?.to_string(),
            server: record.require("server")?.to_string(),
            resources: record.get("RESOURCES").unwrap_or_default().to_string(),
        })
    }
}

#[derive(Debug)]
pub struct LshostsCollector {
    max_mem: Arc<MetricDesc>,
    max_swap: Arc<MetricDesc>,
    ncpus: Arc<MetricDesc>,
    cpuf: Arc<MetricDesc>,
}

impl LshostsCollector {
    pub fn new() -> Self {
        let desc = |name: &str, help: &str| MetricDesc::new(NAMESPACE, SUBSYSTEM, name, help, LABELS);
        Self {
            max_mem: desc(
                "max_mem",
                "The maximum amount of physical memory available for user processes, in KiB.",
            ),
            max_swap: desc("max_swp", "The total available swap space, in KiB."),
            ncpus: desc(
                "ncpus",
                "The number of processors on this host, or cores when LSF_ENABLE_DUALCORE is set.",
            ),
            cpuf: desc(
                "cpuf",
                "The relative CPU performance factor. The faster the CPU, the larger the CPU factor.",
            ),
        }
    }

    pub async fn update(
        &self,
        source: &dyn CommandSource,
        sink: &SampleSink,
    ) -> Result<(), CollectorError> {
        let output = source.output("lshosts", &["-w"]).await?;
        let format = TableFormat::trailing_text().allow_short_rows();
        let rows: Vec<StaticHostRow> = decode_rows(KIND.as_ref(), &output, format)?;

        for row in &rows {
            let resources = strip_parens(&row.resources);
            let labels = [
                row.host_name.as_str(),
                row.host_type.as_str(),
                row.model.as_str(),
                ServerType::from_token(&row.server).as_str(),
                resources.as_str(),
            ];

            sink.emit(
                &self.max_mem,
                value_or_sentinel(KIND, "maxmem", parse_size_kib(&row.maxmem)),
                &labels,
            );
            sink.emit(
                &self.max_swap,
                value_or_sentinel(KIND, "maxswp", parse_size_kib(&row.maxswp)),
                &labels,
            );
            sink.emit(
                &self.ncpus,
                value_or_sentinel(KIND, "ncpus", parse_limit(&row.ncpus)),
                &labels,
            );
            sink.emit(
                &self.cpuf,
                value_or_sentinel(KIND, "cpuf", parse_limit(&row.cpuf)),
                &labels,
            );
        }

        tracing::debug!(collector = %KIND, hosts = rows.len(), "Collected static host metrics");
        Ok(())
    }
}

impl Default for LshostsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::testing::{count_of, run, value_of};
    use crate::command::testing::FakeCommands;

    const FIXTURE: &str = include_str!("../../testdata/lshosts.out");

    #[tokio::test]
    async fn test_lshosts_metrics() {
        let source = FakeCommands::new().with_output("lshosts", FIXTURE);
        let (result, samples) = run(KIND, &source).await;
        result.unwrap();

        assert_eq!(count_of(&samples, "lsf_lshosts_ncpus"), 4);
        let v = |name: &str, host: &str| value_of(&samples, name, "host_name", host);

        assert_eq!(v("lsf_lshosts_max_mem", "master01"), Some(62.7 * 1024.0 * 1024.0));
        assert_eq!(v("lsf_lshosts_max_swp", "master01"), Some(4.0 * 1024.0 * 1024.0));
        assert_eq!(v("lsf_lshosts_ncpus", "node001"), Some(32.0));
        assert_eq!(v("lsf_lshosts_cpuf", "node001"), Some(60.0));
        assert_eq!(v("lsf_lshosts_ncpus", "client01"), Some(-1.0));
        assert_eq!(v("lsf_lshosts_max_mem", "client01"), Some(-1.0));
    }

    #[tokio::test]
    async fn test_lshosts_labels() {
        let source = FakeCommands::new().with_output("lshosts", FIXTURE);
        let (_, samples) = run(KIND, &source).await;

        let master = samples
            .iter()
            .find(|s| s.label("host_name") == Some("master01"))
            .unwrap();
        assert_eq!(
            master.label_values,
            ["master01", "X86_64", "Intel_EM64T", "servers", "mg docker"]
        );

        let node002 = samples
            .iter()
            .find(|s| s.label("host_name") == Some("node002"))
            .unwrap();
        assert_eq!(node002.label("server_type"), Some("dynamic"));
        assert_eq!(node002.label("resource_type"), Some("cs"));

        let client = samples
            .iter()
            .find(|s| s.label("host_name") == Some("client01"))
            .unwrap();
        assert_eq!(client.label("server_type"), Some("client"));
        assert_eq!(client.label("resource_type"), Some(""));
    }

    #[tokio::test]
    async fn test_lshosts_unknown_unit_reports_sentinel() {
        let output = "HOST_NAME type model cpuf ncpus maxmem maxswp server RESOURCES\n\
                      node001 X86_64 PC 1.0 8 16Q 2G Yes ()\n";
        let source = FakeCommands::new().with_output("lshosts", output);
        let (result, samples) = run(KIND, &source).await;
        result.unwrap();

        assert_eq!(
            value_of(&samples, "lsf_lshosts_max_mem", "host_name", "node001"),
            Some(-1.0)
        );
        assert_eq!(
            value_of(&samples, "lsf_lshosts_max_swp", "host_name", "node001"),
            Some(2.0 * 1024.0 * 1024.0)
        );
    }

    #[tokio::test]
    async fn test_lshosts_row_without_resources() {
        let output = "HOST_NAME type model cpuf ncpus maxmem maxswp server RESOURCES\n\
                      node001 X86_64 PC 1.0 8 16G 2G Yes\n\
                      node002 X86_64 PC 1.0\n";
        let source = FakeCommands::new().with_output("lshosts", output);
        let (result, samples) = run(KIND, &source).await;
        result.unwrap();

        assert_eq!(count_of(&samples, "lsf_lshosts_ncpus"), 1);
        let node = samples
            .iter()
            .find(|s| s.desc.fq_name() == "lsf_lshosts_ncpus")
            .unwrap();
        assert_eq!(node.value, 8.0);
        assert_eq!(node.label("resource_type"), Some(""));
        assert_eq!(node.label("server_type"), Some("servers"));
    }
}
