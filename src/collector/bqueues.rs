//! `bqueues` collector: job counts, limits and status per queue.

use std::sync::Arc;

use crate::command::CommandSource;
use crate::metrics::{MetricDesc, NAMESPACE, SampleSink};
use crate::normalize::{QueueStatus, parse_limit};
use crate::table::{DecodeError, FromRecord, RawRecord, TableFormat, decode_rows};

use super::types::{CollectorError, CollectorKind, value_or_sentinel};

const KIND: CollectorKind = CollectorKind::Bqueues;
const SUBSYSTEM: &str = "bqueues";
const LABELS: &[&str] = &["queues_name"];

/// One row of `bqueues -w`.
#[derive(Debug, Clone, PartialEq)]
struct QueueRow {
    name: String,
    priority: String,
    status: String,
    max: String,
    njobs: String,
    pending: String,
    running: String,
    suspended: String,
}

impl FromRecord for QueueRow {
    fn from_record(record: &RawRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            name: record.require("QUEUE_NAME")?.to_string(),
            priority: record.require("PRIO")?.to_string(),
            status: record.require("STATUS")?.to_string(),
            max: record.require("MAX")?.to_string(),
            njobs: record.require("NJOBS")?.to_string(),
            pending: record.require("PEND")?.to_string(),
            running: record.require("RUN")?.to_string(),
            suspended: record.require("SUSP")?.to_string(),
        })
    }
}

#[derive(Debug)]
pub struct BqueuesCollector {
    running: Arc<MetricDesc>,
    pending: Arc<MetricDesc>,
    njobs: Arc<MetricDesc>,
    suspended: Arc<MetricDesc>,
    max_jobs: Arc<MetricDesc>,
    priority: Arc<MetricDesc>,
    status: Arc<MetricDesc>,
}

impl BqueuesCollector {
    pub fn new() -> Self {
        let desc = |name: &str, help: &str| MetricDesc::new(NAMESPACE, SUBSYSTEM, name, help, LABELS);
        Self {
            running: desc(
                "runingjob_count",
                "The total number of tasks for all running jobs in the queue.",
            ),
            pending: desc(
                "pendingjob_count",
                "The total number of tasks for all pending jobs in the queue.",
            ),
            njobs: desc(
                "njobs_count",
                "The total number of tasks for all jobs in the queue, including pending, running, and suspended jobs.",
            ),
            suspended: desc(
                "suspjob_count",
                "The total number of tasks for all suspended jobs in the queue.",
            ),
            max_jobs: desc(
                "maxjob_count",
                "The maximum number of job slots that can be used by the jobs from the queue. -1 indicates no limit.",
            ),
            priority: desc(
                "priority",
                "The priority of the queue. Jobs from higher priority queues are dispatched first.",
            ),
            status: desc(
                "status",
                "The status of the queue: 0 unknown, 1 Open:Active, 2 Open:Inact, 3 Closed:Active, 4 Closed:Inact.",
            ),
        }
    }

    pub async fn update(
        &self,
        source: &dyn CommandSource,
        sink: &SampleSink,
    ) -> Result<(), CollectorError> {
        let output = source.output("bqueues", &["-w"]).await?;
        let rows: Vec<QueueRow> = decode_rows(KIND.as_ref(), &output, TableFormat::space_delimited())?;

        for row in &rows {
            let queue = [row.name.as_str()];
            let count = |field: &str, token: &str| value_or_sentinel(KIND, field, parse_limit(token));

            sink.emit(&self.running, count("RUN", &row.running), &queue);
            sink.emit(&self.pending, count("PEND", &row.pending), &queue);
            sink.emit(&self.njobs, count("NJOBS", &row.njobs), &queue);
            sink.emit(&self.suspended, count("SUSP", &row.suspended), &queue);
            sink.emit(&self.max_jobs, count("MAX", &row.max), &queue);
            sink.emit(&self.priority, count("PRIO", &row.priority), &queue);
            sink.emit(&self.status, QueueStatus::from_token(&row.status).code(), &queue);
        }

        tracing::debug!(collector = %KIND, queues = rows.len(), "Collected queue metrics");
        Ok(())
    }
}

impl Default for BqueuesCollector {
    fn default() -> Self {
        Self::new()
    }
}
