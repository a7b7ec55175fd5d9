//! `lsfjob` collector: per-job state from `bjobs`, plus per-queue totals.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::command::{CommandSource, ExecutionError};
use crate::metrics::{MetricDesc, NAMESPACE, SampleSink};
use crate::normalize::JobStatus;
use crate::table::{DecodeError, FromRecord, RawRecord, TableFormat, decode_rows};

use super::types::{CollectorError, CollectorKind};

const KIND: CollectorKind = CollectorKind::Lsfjob;
const SUBSYSTEM: &str = "bjobs";

/// Output columns requested from `bjobs -o`. `job_name` must stay last, it
/// may contain spaces.
const OUTPUT_FIELDS: &str = "jobid stat user queue from_host exec_host job_name";

/// Messages `bjobs` prints when there is nothing to report.
const NO_JOBS_MESSAGES: &[&str] = &["No unfinished job found", "No job found"];

/// One row of `bjobs -o`.
#[derive(Debug, Clone, PartialEq)]
struct JobRow {
    job_id: String,
    status: JobStatus,
    user: String,
    queue: String,
    from_host: String,
    exec_host: String,
    job_name: String,
}

impl FromRecord for JobRow {
    fn from_record(record: &RawRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            job_id: record.require("JOBID")?.to_string(),
            status: JobStatus::from_token(record.require("STAT")?),
            user: record.require("USER")?.to_string(),
            queue: record.require("QUEUE")?.to_string(),
            from_host: record.require("FROM_HOST")?.to_string(),
            exec_host: record.require("EXEC_HOST")?.to_string(),
            job_name: record.require("JOB_NAME")?.to_string(),
        })
    }
}

fn is_no_jobs(err: &ExecutionError) -> bool {
    err.stderr()
        .is_some_and(|stderr| NO_JOBS_MESSAGES.iter().any(|m| stderr.contains(m)))
}

#[derive(Debug)]
pub struct JobCollector {
    status: Arc<MetricDesc>,
    count: Arc<MetricDesc>,
}

impl JobCollector {
    pub fn new() -> Self {
        Self {
            status: MetricDesc::new(
                NAMESPACE,
                SUBSYSTEM,
                "status",
                "The state of each unfinished job: 0 unknown, 1 PEND, 2 RUN, 3 PSUSP, 4 USUSP, 5 SSUSP, 6 DONE, 7 EXIT, 8 WAIT, 9 ZOMBI.",
                &["job_id", "user", "queue", "from_host", "exec_host", "job_name"],
            ),
            count: MetricDesc::new(
                NAMESPACE,
                SUBSYSTEM,
                "count",
                "The number of jobs in each queue by state.",
                &["queue", "status"],
            ),
        }
    }

    pub async fn update(
        &self,
        source: &dyn CommandSource,
        sink: &SampleSink,
    ) -> Result<(), CollectorError> {
        let output = match source
            .output("bjobs", &["-u", "all", "-o", OUTPUT_FIELDS])
            .await
        {
            Ok(output) => output,
            Err(e) if is_no_jobs(&e) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        if output.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!(collector = %KIND, "No unfinished jobs");
            return Ok(());
        }

        let rows: Vec<JobRow> = decode_rows(KIND.as_ref(), &output, TableFormat::trailing_text())?;

        let mut totals: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        for row in &rows {
            sink.emit(
                &self.status,
                row.status.code(),
                &[
                    row.job_id.as_str(),
                    row.user.as_str(),
                    row.queue.as_str(),
                    row.from_host.as_str(),
                    row.exec_host.as_str(),
                    row.job_name.as_str(),
                ],
            );
            *totals.entry((row.queue.as_str(), row.status.as_str())).or_default() += 1;
        }

        for ((queue, status), jobs) in &totals {
            sink.emit(&self.count, *jobs as f64, &[*queue, *status]);
        }

        tracing::debug!(collector = %KIND, jobs = rows.len(), "Collected job metrics");
        Ok(())
    }
}

impl Default for JobCollector {
    fn default() -> Self {
        Self::new()
    }
}
