//! Configuration catalog.
//!
//! The catalog is immutable once built. Reloading builds a new catalog and
//! swaps the shared reference, so an orchestration that took a snapshot keeps
//! seeing the catalog it started with.

use crate::error::CatalogError;
use models::{Bootloader, Configuration};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bootloaders and configurations, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    bootloaders: BTreeMap<String, Bootloader>,
    configurations: BTreeMap<String, Configuration>,
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate names and dangling bootloader
    /// references.
    pub fn new(
        bootloaders: Vec<Bootloader>,
        configurations: Vec<Configuration>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();

        for bootloader in bootloaders {
            if catalog.bootloaders.contains_key(&bootloader.name) {
                return Err(CatalogError::DuplicateBootloader(bootloader.name));
            }
            catalog.bootloaders.insert(bootloader.name.clone(), bootloader);
        }

        for configuration in configurations {
            if !catalog.bootloaders.contains_key(&configuration.bootloader) {
                return Err(CatalogError::UnknownBootloader {
                    configuration: configuration.name,
                    bootloader: configuration.bootloader,
                });
            }
            if catalog.configurations.contains_key(&configuration.name) {
                return Err(CatalogError::DuplicateConfiguration(configuration.name));
            }
            catalog
                .configurations
                .insert(configuration.name.clone(), configuration);
        }

        Ok(catalog)
    }

    /// Looks up a configuration by name.
    pub fn resolve(&self, name: &str) -> Option<&Configuration> {
        self.configurations.get(name)
    }

    /// Looks up a bootloader by name.
    pub fn bootloader(&self, name: &str) -> Option<&Bootloader> {
        self.bootloaders.get(name)
    }

    /// The bootloader a configuration is written for.
    pub fn bootloader_for(&self, configuration: &str) -> Option<&Bootloader> {
        self.resolve(configuration)
            .and_then(|c| self.bootloader(&c.bootloader))
    }

    /// Bootloaders, ordered by name.
    pub fn bootloaders(&self) -> impl Iterator<Item = &Bootloader> {
        self.bootloaders.values()
    }

    /// Configurations, ordered by name.
    pub fn configurations(&self) -> impl Iterator<Item = &Configuration> {
        self.configurations.values()
    }
}

/// Shared, atomically swappable reference to the current catalog.
#[derive(Debug, Default)]
pub struct CatalogHandle {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
        }
    }

    /// The current catalog. Later swaps do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&*self.current.read())
    }

    /// Replaces the catalog and returns the previous one.
    pub fn swap(&self, catalog: Catalog) -> Arc<Catalog> {
        std::mem::replace(&mut *self.current.write(), Arc::new(catalog))
    }
}
