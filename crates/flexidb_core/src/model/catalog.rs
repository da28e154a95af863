//! Package-indexed entity catalog used during bootstrap.

use super::entity::{Entity, EntityDescriptor};
use crate::config::{ConfigError, ENTITY_PACKAGE_KEY};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static PACKAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("package pattern is valid")
});

/// Entity descriptors grouped by package name.
///
/// Packages match exactly; `app.model` does not include `app.model.audit`.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    packages: BTreeMap<String, Vec<&'static EntityDescriptor>>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `E` under `package`. Registering the same type twice is a no-op.
    pub fn register<E: Entity>(&mut self, package: &str) -> &mut Self {
        let descriptor = E::descriptor();
        let entries = self.packages.entry(package.trim().to_string()).or_default();
        if !entries.iter().any(|known| std::ptr::eq(*known, descriptor)) {
            entries.push(descriptor);
        }
        self
    }

    /// Chainable form of [`EntityCatalog::register`].
    pub fn with<E: Entity>(mut self, package: &str) -> Self {
        self.register::<E>(package);
        self
    }

    /// Declares an empty package, so scanning it reports "no entities".
    pub fn declare_package(&mut self, package: &str) -> &mut Self {
        self.packages.entry(package.trim().to_string()).or_default();
        self
    }

    pub fn packages(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    /// Resolves the validated descriptors registered under `package`.
    pub fn scan(&self, package: &str) -> Result<Vec<&'static EntityDescriptor>, ConfigError> {
        let package = package.trim();
        if package.is_empty() {
            return Err(ConfigError::MissingSetting(ENTITY_PACKAGE_KEY));
        }
        if !PACKAGE_NAME.is_match(package) {
            return Err(ConfigError::InvalidSetting {
                key: ENTITY_PACKAGE_KEY,
                value: package.to_string(),
                reason: "expected dot-separated identifiers".to_string(),
            });
        }

        let descriptors = self
            .packages
            .get(package)
            .ok_or_else(|| ConfigError::EntityPackageNotFound(package.to_string()))?;
        if descriptors.is_empty() {
            return Err(ConfigError::EmptyEntityPackage(package.to_string()));
        }

        let mut tables: BTreeMap<String, &'static EntityDescriptor> = BTreeMap::new();
        for &descriptor in descriptors {
            descriptor.validate()?;
            if let Some(first) = tables.insert(descriptor.table.to_ascii_lowercase(), descriptor) {
                return Err(ConfigError::DuplicateEntity {
                    table: descriptor.table,
                    first: first.name,
                    second: descriptor.name,
                });
            }
        }

        Ok(descriptors.clone())
    }
}
