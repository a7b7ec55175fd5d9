//! `bhosts` collector: job slots and batch status per host.

use std::sync::Arc;

use crate::command::CommandSource;
use crate::metrics::{MetricDesc, NAMESPACE, SampleSink};
use crate::normalize::{HostStatus, parse_limit};
use crate::table::{DecodeError, FromRecord, RawRecord, TableFormat, decode_rows};

use super::types::{CollectorError, CollectorKind, value_or_sentinel};

const KIND: CollectorKind = CollectorKind::Bhosts;
const SUBSYSTEM: &str = "bhost";
const LABELS: &[&str] = &["host_name"];

/// One row of `bhosts -w`.
#[derive(Debug, Clone, PartialEq)]
struct HostRow {
    host_name: String,
    status: String,
    max: String,
    njobs: String,
    run: String,
    ssusp: String,
    ususp: String,
    rsv: String,
}

impl FromRecord for HostRow {
    fn from_record(record: &RawRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            host_name: record.require("HOST_NAME")?.to_string(),
            status: record.require("STATUS")?.to_string(),
            max: record.require("MAX")?.to_string(),
            njobs: record.require("NJOBS")?.to_string(),
            run: record.require("RUN")?.to_string(),
            ssusp: record.require("SSUSP")?.to_string(),
            ususp: record.require("USUSP")?.to_string(),
            rsv: record.require("RSV")?.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct BhostsCollector {
    njobs: Arc<MetricDesc>,
    running: Arc<MetricDesc>,
    max_jobs: Arc<MetricDesc>,
    ssusp: Arc<MetricDesc>,
    ususp: Arc<MetricDesc>,
    reserved: Arc<MetricDesc>,
    status: Arc<MetricDesc>,
}

impl BhostsCollector {
    pub fn new() -> Self {
        let desc = |name: &str, help: &str| MetricDesc::new(NAMESPACE, SUBSYSTEM, name, help, LABELS);
        Self {
            njobs: desc(
                "njobs_count",
                "The number of tasks for all jobs that are dispatched to the host. The NJOBS value includes running, suspended, and chunk jobs.",
            ),
            running: desc(
                "runingjob_count",
                "The number of tasks for all running jobs on the host.",
            ),
            max_jobs: desc(
                "maxjob_count",
                "The maximum number of job slots available. -1 indicates no limit.",
            ),
            ssusp: desc(
                "ssuspjob_count",
                "The number of tasks for all system suspended jobs on the host.",
            ),
            ususp: desc(
                "ususpjob_count",
                "The number of tasks for all user suspended jobs on the host.",
            ),
            reserved: desc(
                "rsvjob_count",
                "The number of tasks for all pending jobs that have job slots reserved on the host.",
            ),
            status: desc(
                "host_status",
                "The batch status of the host: 0 unknown, 1 ok, 2 unavail, 3 unreach, 4 closed, 5 closed_cu_excl.",
            ),
        }
    }

    pub async fn update(
        &self,
        source: &dyn CommandSource,
        sink: &SampleSink,
    ) -> Result<(), CollectorError> {
        let output = source.output("bhosts", &["-w"]).await?;
        let rows: Vec<HostRow> = decode_rows(KIND.as_ref(), &output, TableFormat::space_delimited())?;

        for row in &rows {
            let host = [row.host_name.as_str()];
            let count = |field: &str, token: &str| value_or_sentinel(KIND, field, parse_limit(token));

            sink.emit(&self.njobs, count("NJOBS", &row.njobs), &host);
            sink.emit(&self.running, count("RUN", &row.run), &host);
            sink.emit(&self.max_jobs, count("MAX", &row.max), &host);
            sink.emit(&self.ssusp, count("SSUSP", &row.ssusp), &host);
            sink.emit(&self.ususp, count("USUSP", &row.ususp), &host);
            sink.emit(&self.reserved, count("RSV", &row.rsv), &host);
            sink.emit(&self.status, HostStatus::from_token(&row.status).code(), &host);
        }

        tracing::debug!(collector = %KIND, hosts = rows.len(), "Collected batch host metrics");
        Ok(())
    }
}

impl Default for BhostsCollector {
    fn default() -> Self {
        Self::new()
    }
}
