//! In-process driver registry and identifier resolution.

use super::PersistenceDriver;
use crate::db::SqliteDriver;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Driver registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverRegistryError {
    #[error("driver id is invalid: {0}")]
    InvalidDriverId(String),
    #[error("driver id already registered: {0}")]
    DuplicateDriverId(String),
}

/// Registered persistence drivers, addressable by id or alias.
#[derive(Default, Clone)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn PersistenceDriver>>,
    aliases: BTreeMap<String, String>,
}

impl DriverRegistry {
    /// Empty registry; nothing resolves until a driver is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in SQLite driver.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        // The built-in id and aliases are constants, so this cannot collide.
        let _ = registry.register(Arc::new(SqliteDriver::new()));
        registry
    }

    /// Registers one driver under its id and aliases.
    pub fn register(
        &mut self,
        driver: Arc<dyn PersistenceDriver>,
    ) -> Result<(), DriverRegistryError> {
        let driver_id = driver.id().trim().to_string();
        if !is_valid_driver_id(&driver_id) {
            return Err(DriverRegistryError::InvalidDriverId(driver_id));
        }

        let aliases: Vec<String> = driver
            .aliases()
            .iter()
            .map(|alias| alias.trim().to_string())
            .filter(|alias| !alias.is_empty() && *alias != driver_id)
            .collect();
        for name in std::iter::once(&driver_id).chain(aliases.iter()) {
            if self.drivers.contains_key(name) || self.aliases.contains_key(name) {
                return Err(DriverRegistryError::DuplicateDriverId(name.clone()));
            }
        }

        for alias in aliases {
            self.aliases.insert(alias, driver_id.clone());
        }
        self.drivers.insert(driver_id, driver);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Returns sorted canonical driver ids.
    pub fn driver_ids(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    /// Resolves a driver by canonical id or alias.
    pub fn resolve(&self, identifier: &str) -> Option<Arc<dyn PersistenceDriver>> {
        let identifier = identifier.trim();
        let canonical = self
            .aliases
            .get(identifier)
            .map(String::as_str)
            .unwrap_or(identifier);
        self.drivers.get(canonical).cloned()
    }
}

fn is_valid_driver_id(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
