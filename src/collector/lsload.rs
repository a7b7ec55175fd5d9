//! `lsload` collector: dynamic load indices per host.
//!
//! Unavailable hosts are printed with only their name and status, so the
//! decoder accepts short rows and the missing indices are reported as -1.

use std::sync::Arc;

use crate::command::CommandSource;
use crate::metrics::{MetricDesc, NAMESPACE, SampleSink};
use crate::normalize::{
    LoadStatus, NO_LIMIT, NormalizeError, parse_limit, parse_percent, parse_size_kib,
    strip_threshold_marker,
};
use crate::table::{DecodeError, FromRecord, RawRecord, TableFormat, decode_rows};

use super::types::{CollectorError, CollectorKind, value_or_sentinel};

const KIND: CollectorKind = CollectorKind::Lsload;
const SUBSYSTEM: &str = "lsload";
const LABELS: &[&str] = &["host_name"];

/// How a load index column is normalized.
#[derive(Debug, Clone, Copy)]
enum IndexKind {
    Number,
    Percent,
    Size,
}

impl IndexKind {
    fn parse(self, token: &str) -> Result<f64, NormalizeError> {
        let token = strip_threshold_marker(token);
        match self {
            Self::Number => parse_limit(token),
            Self::Percent => parse_percent(token),
            Self::Size => parse_size_kib(token),
        }
    }
}

/// Load index columns in output order: header name, metric name, help, kind.
const INDICES: &[(&str, &str, &str, IndexKind)] = &[
    ("r15s", "r15s", "The 15 second exponentially averaged CPU run queue length.", IndexKind::Number),
    ("r1m", "r1m", "The 1 minute exponentially averaged CPU run queue length.", IndexKind::Number),
    ("r15m", "r15m", "The 15 minute exponentially averaged CPU run queue length.", IndexKind::Number),
    ("ut", "ut", "The CPU utilization exponentially averaged over the last minute, in percent.", IndexKind::Percent),
    ("pg", "pg", "The memory paging rate exponentially averaged over the last minute, in pages per second.", IndexKind::Number),
    ("ls", "login_usersCount", "The number of current login users.", IndexKind::Number),
    ("it", "it", "The idle time of the host in minutes.", IndexKind::Number),
    ("tmp", "tmp", "The amount of free space in /tmp, in KiB.", IndexKind::Size),
    ("swp", "swp", "The amount of available swap space, in KiB.", IndexKind::Size),
    ("mem", "mem", "The amount of available RAM, in KiB.", IndexKind::Size),
];

/// One row of `lsload -w`; `values` follows [`INDICES`].
#[derive(Debug, Clone, PartialEq)]
struct LoadRow {
    host_name: String,
    status: String,
    values: Vec<Option<String>>,
}

impl FromRecord for LoadRow {
    fn from_record(record: &RawRecord) -> Result<Self, DecodeError> {
        Ok(Self {
            host_name: record.require("HOST_NAME")?.to_string(),
            status: record.require("status")?.to_string(),
            values: INDICES
                .iter()
                .map(|(column, ..)| record.get(column).map(str::to_string))
                .collect(),
        })
    }
}

#[derive(Debug)]
pub struct LsloadCollector {
    indices: Vec<(IndexKind, &'static str, Arc<MetricDesc>)>,
    status: Arc<MetricDesc>,
}

impl LsloadCollector {
    pub fn new() -> Self {
        Self {
            indices: INDICES
                .iter()
                .map(|&(column, name, help, kind)| {
                    (kind, column, MetricDesc::new(NAMESPACE, SUBSYSTEM, name, help, LABELS))
                })
                .collect(),
            status: MetricDesc::new(
                NAMESPACE,
                SUBSYSTEM,
                "host_status",
                "The load status of the host: 0 unknown, 1 ok, 2 -ok, 3 busy, 4 lockW, 5 lockU, 6 unavail.",
                LABELS,
            ),
        }
    }

    pub async fn update(
        &self,
        source: &dyn CommandSource,
        sink: &SampleSink,
    ) -> Result<(), CollectorError> {
        let output = source.output("lsload", &["-w"]).await?;
        let format = TableFormat::space_delimited().allow_short_rows();
        let rows: Vec<LoadRow> = decode_rows(KIND.as_ref(), &output, format)?;

        for row in &rows {
            let host = [row.host_name.as_str()];
            for ((kind, column, desc), token) in self.indices.iter().zip(&row.values) {
                let value = match token {
                    Some(token) => value_or_sentinel(KIND, column, kind.parse(token)),
                    None => NO_LIMIT,
                };
                sink.emit(desc, value, &host);
            }
            sink.emit(&self.status, LoadStatus::from_token(&row.status).code(), &host);
        }

        tracing::debug!(collector = %KIND, hosts = rows.len(), "Collected load metrics");
        Ok(())
    }
}

impl Default for LsloadCollector {
    fn default() -> Self {
        Self::new()
    }
}
