//! Collector Layer
//!
//! One collector per LSF command. Each runs its command through a
//! [`CommandSource`](crate::command::CommandSource), decodes the output and
//! emits samples into the scrape's [`SampleSink`](crate::metrics::SampleSink).
//!
//! # Architecture
//!
//! - [`CollectorKind`]: The closed set of collector names
//! - [`Collector`]: A collector instance with its descriptors
//! - [`CollectorRegistry`]: Enablement and memoized instances
//!
//! | name | command |
//! |---|---|
//! | `bhosts` | `bhosts -w` |
//! | `bqueues` | `bqueues -w` |
//! | `lshosts` | `lshosts -w` |
//! | `lsload` | `lsload -w` |
//! | `lsf_information` | `lsid` |
//! | `lsfjob` | `bjobs -u all -o ...` (off by default) |

mod bhosts;
mod bjobs;
mod bqueues;
mod lshosts;
mod lsid;
mod lsload;
mod registry;
pub(crate) mod types;

pub use bhosts::BhostsCollector;
pub use bjobs::JobCollector;
pub use bqueues::BqueuesCollector;
pub use lshosts::LshostsCollector;
pub use lsid::{ClusterIdentity, InformationCollector};
pub use lsload::LsloadCollector;
pub use registry::{CollectorRegistry, InstanceCache, ScrapeError};
pub use types::{Collector, CollectorError, CollectorKind};
