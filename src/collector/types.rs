//! Core collector types.

use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

use crate::command::{CommandSource, ExecutionError};
use crate::metrics::SampleSink;
use crate::table::DecodeError;

use super::bhosts::BhostsCollector;
use super::bjobs::JobCollector;
use super::bqueues::BqueuesCollector;
use super::lshosts::LshostsCollector;
use super::lsid::InformationCollector;
use super::lsload::LsloadCollector;

/// Errors that fail one collector's update.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The scheduler command could not be run.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The command output had no usable header.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Every collector this exporter knows about.
///
/// The string form is the name used in configuration, on the command line
/// and in `collect[]` scrape filters.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum CollectorKind {
    Bhosts,
    Bqueues,
    Lshosts,
    Lsload,
    LsfInformation,
    Lsfjob,
}

impl CollectorKind {
    /// Whether the collector runs unless explicitly disabled.
    ///
    /// `lsfjob` exports one series per job and is opt-in.
    pub fn default_enabled(self) -> bool {
        !matches!(self, Self::Lsfjob)
    }
}

/// A collector instance with its descriptor bundle.
#[derive(Debug)]
pub enum Collector {
    Bhosts(BhostsCollector),
    Bqueues(BqueuesCollector),
    Lshosts(LshostsCollector),
    Lsload(LsloadCollector),
    Information(InformationCollector),
    Jobs(JobCollector),
}

impl Collector {
    /// Build the collector for `kind`.
    pub fn new(kind: CollectorKind) -> Self {
        match kind {
            CollectorKind::Bhosts => Self::Bhosts(BhostsCollector::new()),
            CollectorKind::Bqueues => Self::Bqueues(BqueuesCollector::new()),
            CollectorKind::Lshosts => Self::Lshosts(LshostsCollector::new()),
            CollectorKind::Lsload => Self::Lsload(LsloadCollector::new()),
            CollectorKind::LsfInformation => Self::Information(InformationCollector::new()),
            CollectorKind::Lsfjob => Self::Jobs(JobCollector::new()),
        }
    }

    pub fn kind(&self) -> CollectorKind {
        match self {
            Self::Bhosts(_) => CollectorKind::Bhosts,
            Self::Bqueues(_) => CollectorKind::Bqueues,
            Self::Lshosts(_) => CollectorKind::Lshosts,
            Self::Lsload(_) => CollectorKind::Lsload,
            Self::Information(_) => CollectorKind::LsfInformation,
            Self::Jobs(_) => CollectorKind::Lsfjob,
        }
    }

    /// Run one collection cycle, emitting samples into `sink`.
    ///
    /// Malformed rows and unparseable fields are logged and do not fail the
    /// update. A command that cannot be run, or output without a header,
    /// returns `Err` and marks this collector as failed for the scrape.
    pub async fn update(
        &self,
        source: &dyn CommandSource,
        sink: &SampleSink,
    ) -> Result<(), CollectorError> {
        match self {
            Self::Bhosts(c) => c.update(source, sink).await,
            Self::Bqueues(c) => c.update(source, sink).await,
            Self::Lshosts(c) => c.update(source, sink).await,
            Self::Lsload(c) => c.update(source, sink).await,
            Self::Information(c) => c.update(source, sink).await,
            Self::Jobs(c) => c.update(source, sink).await,
        }
    }
}

/// Parse a numeric field, logging and substituting `-1` when it is unusable.
pub(crate) fn value_or_sentinel(
    kind: CollectorKind,
    field: &str,
    result: Result<f64, crate::normalize::NormalizeError>,
) -> f64 {
    result.unwrap_or_else(|e| {
        tracing::warn!(collector = %kind, field, error = %e, "Unparseable field, reporting -1");
        crate::normalize::NO_LIMIT
    })
}


#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_kind_names() {
        let names: Vec<String> = CollectorKind::iter().map(|k| k.to_string()).collect();
        assert_eq!(
            names,
            ["bhosts", "bqueues", "lshosts", "lsload", "lsf_information", "lsfjob"]
        );
        assert_eq!(
            "lsf_information".parse::<CollectorKind>().unwrap(),
            CollectorKind::LsfInformation
        );
        assert!("slurm".parse::<CollectorKind>().is_err());
    }

    #[test]
    fn test_default_enabled() {
        assert!(CollectorKind::Bhosts.default_enabled());
        assert!(CollectorKind::LsfInformation.default_enabled());
        assert!(!CollectorKind::Lsfjob.default_enabled());
    }

    #[test]
    fn test_collector_kind_roundtrip() {
        for kind in CollectorKind::iter() {
            assert_eq!(Collector::new(kind).kind(), kind);
        }
    }

    #[test]
    fn test_value_or_sentinel() {
        let bad = crate::normalize::parse_limit("abc");
        assert_eq!(value_or_sentinel(CollectorKind::Bhosts, "MAX", bad), -1.0);
        assert_eq!(value_or_sentinel(CollectorKind::Bhosts, "MAX", Ok(4.0)), 4.0);
    }
}
