//! Collector registry: enablement and memoized instances.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use strum::IntoEnumIterator;
use thiserror::Error;

use crate::config::{CollectorsConfig, ConfigError};

use super::types::{Collector, CollectorKind};

/// Errors that reject a scrape before any collector runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    #[error("unknown collector: '{0}'")]
    UnknownCollector(String),

    #[error("disabled collector: '{0}'")]
    DisabledCollector(String),
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    enabled: bool,
    /// Set explicitly by configuration or the command line.
    forced: bool,
}

/// Construct-once cache of collector instances.
///
/// The lock is held only while a missing instance is built; callers get an
/// `Arc` and run updates without it.
#[derive(Debug, Default)]
pub struct InstanceCache {
    instances: Mutex<HashMap<CollectorKind, Arc<Collector>>>,
}

impl InstanceCache {
    pub fn get_or_init(&self, kind: CollectorKind) -> Arc<Collector> {
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(instances.entry(kind).or_insert_with(|| {
            tracing::debug!(collector = %kind, "Instantiating collector");
            Arc::new(Collector::new(kind))
        }))
    }

    /// Number of collectors built so far.
    pub fn len(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every known collector with its enabled flag.
///
/// Built once at startup, then shared read-only by the scrape path.
#[derive(Debug)]
pub struct CollectorRegistry {
    registrations: BTreeMap<CollectorKind, Registration>,
    instances: InstanceCache,
}

impl CollectorRegistry {
    /// Register every collector with its default enablement.
    pub fn new() -> Self {
        let registrations = CollectorKind::iter()
            .map(|kind| {
                let registration = Registration {
                    enabled: kind.default_enabled(),
                    forced: false,
                };
                (kind, registration)
            })
            .collect();

        Self {
            registrations,
            instances: InstanceCache::default(),
        }
    }

    /// Apply enablement overrides from configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for an unknown collector name.
    pub fn configure(&mut self, config: &CollectorsConfig) -> Result<(), ConfigError> {
        for (name, enabled) in &config.enabled {
            self.set_enabled(name, *enabled)?;
        }
        if config.disable_defaults {
            self.disable_defaults();
        }
        Ok(())
    }

    /// Force a collector on or off.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for an unknown collector name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        let kind: CollectorKind = name
            .parse()
            .map_err(|_| ConfigError::ValidationError(format!("unknown collector: '{}'", name)))?;
        self.registrations.insert(
            kind,
            Registration {
                enabled,
                forced: true,
            },
        );
        Ok(())
    }

    /// Disable every collector that was not explicitly set.
    pub fn disable_defaults(&mut self) {
        for registration in self.registrations.values_mut() {
            if !registration.forced {
                registration.enabled = false;
            }
        }
    }

    pub fn is_enabled(&self, kind: CollectorKind) -> bool {
        self.registrations.get(&kind).is_some_and(|r| r.enabled)
    }

    /// Enabled collectors, sorted by name.
    pub fn enabled(&self) -> Vec<CollectorKind> {
        let mut kinds: Vec<CollectorKind> = self
            .registrations
            .iter()
            .filter(|(_, r)| r.enabled)
            .map(|(kind, _)| *kind)
            .collect();
        kinds.sort_by_key(|kind| kind.as_ref().to_string());
        kinds
    }

    /// Resolve scrape filters to collectors.
    ///
    /// No filters selects every enabled collector. Duplicate names are
    /// collapsed.
    ///
    /// # Errors
    /// Fails on the first name that is unknown or disabled.
    pub fn select(&self, filters: &[String]) -> Result<Vec<CollectorKind>, ScrapeError> {
        if filters.is_empty() {
            return Ok(self.enabled());
        }

        let mut selected = Vec::with_capacity(filters.len());
        for name in filters {
            let kind: CollectorKind = name
                .parse()
                .map_err(|_| ScrapeError::UnknownCollector(name.clone()))?;
            if !self.is_enabled(kind) {
                return Err(ScrapeError::DisabledCollector(name.clone()));
            }
            if !selected.contains(&kind) {
                selected.push(kind);
            }
        }
        Ok(selected)
    }

    /// The shared instance of `kind`, built on first use.
    pub fn instance(&self, kind: CollectorKind) -> Arc<Collector> {
        self.instances.get_or_init(kind)
    }

    /// Number of collectors instantiated so far.
    pub fn instantiated(&self) -> usize {
        self.instances.len()
    }
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
