//! Persistence driver contracts and registry.
//!
//! # Responsibility
//! - Probe whether a persistence runtime is usable before depending on it.
//! - Build engines, recording the API variant and capability set once.
//!
//! # Invariants
//! - A driver is probed before it builds anything.
//! - Capabilities are resolved at build time, never re-resolved per call.

use crate::config::{ConfigError, Dialect, PersistenceSettings};
use crate::db::{PersistResult, SqliteSessionFactory};
use crate::model::EntityDescriptor;
use crate::session::DynSession;
use std::sync::Arc;

mod capability;
mod registry;

pub use capability::{Capability, CapabilitySet};
pub use registry::{DriverRegistry, DriverRegistryError};

/// Availability probe outcome for one driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverProbe {
    Available { version: String },
    Missing { reason: String },
}

impl DriverProbe {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}

/// Engine reachable only through the uniform dynamic session surface.
pub trait DynEngine: Send + Sync {
    fn driver_id(&self) -> &str;

    fn capabilities(&self) -> CapabilitySet;

    fn open(&self) -> PersistResult<Box<dyn DynSession>>;

    /// Releases the engine. Idempotent.
    fn close(&self) -> PersistResult<()>;

    fn is_closed(&self) -> bool;
}

/// Engine produced by a driver build.
///
/// `sqlite` is set when the statically typed SQLite API is available too.
#[derive(Clone)]
pub struct BuiltEngine {
    pub dynamic: Arc<dyn DynEngine>,
    pub sqlite: Option<Arc<SqliteSessionFactory>>,
}

impl BuiltEngine {
    pub fn sqlite(factory: Arc<SqliteSessionFactory>) -> Self {
        Self {
            dynamic: factory.clone(),
            sqlite: Some(factory),
        }
    }

    pub fn dynamic_only(engine: Arc<dyn DynEngine>) -> Self {
        Self {
            dynamic: engine,
            sqlite: None,
        }
    }
}

/// One pluggable persistence runtime.
pub trait PersistenceDriver: Send + Sync {
    /// Canonical identifier, lowercase.
    fn id(&self) -> &str;

    /// Extra identifiers accepted in the `flexidb.connection.driver` setting.
    fn aliases(&self) -> &[&str] {
        &[]
    }

    fn probe(&self) -> DriverProbe;

    fn supports_dialect(&self, dialect: Dialect) -> bool;

    fn build(
        &self,
        settings: &PersistenceSettings,
        entities: &[&'static EntityDescriptor],
    ) -> Result<BuiltEngine, ConfigError>;
}
