//! Generic repository and unit-of-work layer over SQLite.
//!
//! Entities describe their table once (`Entity::descriptor`); repositories
//! then offer CRUD, paging and parameterized queries, each call running in
//! exactly one transaction on exactly one session.

pub mod config;
pub mod db;
pub mod driver;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod session;
pub mod settings;

pub use config::{
    global_config, install_global, ApiVariant, Availability, ConfigError, Dialect, Lifecycle,
    PersistenceConfig, PersistenceConfigBuilder, PersistenceSettings, SchemaMode,
};
pub use db::{PersistError, PersistResult, SqliteSession};
pub use driver::{Capability, CapabilitySet, DriverProbe, DriverRegistry, PersistenceDriver};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::{
    ColumnDef, Entity, EntityCatalog, EntityDescriptor, EntityId, IdStrategy, Record, SqlType,
    Value,
};
pub use query::{Page, Pageable, PaginationError, QueryParameters, QuerySpec};
pub use repo::{DynDispatch, DynamicRepository, RepoError, RepoResult, Repository, SimpleRepository};
pub use session::{DynSessionProvider, SessionProvider, Transactional, UnitOfWork};
pub use settings::{EnvSettings, MapSettings, SettingsSource};

/// Minimal health-check API for embedding hosts.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
