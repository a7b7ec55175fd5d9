//! Collector enablement configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::collector::CollectorKind;

use super::validation::ConfigError;

/// Which collectors run when a scrape does not filter.
///
/// ```yaml
/// collectors:
///   disable_defaults: false
///   enabled:
///     lsfjob: true
///     lsload: false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorsConfig {
    /// Disable every collector that is not explicitly listed in `enabled`.
    #[serde(default)]
    pub disable_defaults: bool,

    /// Per-collector overrides keyed by collector name.
    #[serde(default)]
    pub enabled: BTreeMap<String, bool>,
}

impl CollectorsConfig {
    /// Merge another CollectorsConfig into this one; `other` wins on conflicts.
    #[must_use]
    pub fn merge(mut self, other: CollectorsConfig) -> Self {
        self.disable_defaults |= other.disable_defaults;
        self.enabled.extend(other.enabled);
        self
    }

    /// Validate that every override names a known collector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.enabled.keys() {
            name.parse::<CollectorKind>().map_err(|_| {
                ConfigError::ValidationError(format!("unknown collector: '{}'", name))
            })?;
        }
        Ok(())
    }
}
