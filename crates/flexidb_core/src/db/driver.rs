//! Built-in SQLite persistence driver.

use super::open::SqliteTarget;
use super::session::SqliteSessionFactory;
use crate::config::{ConfigError, Dialect, PersistenceSettings};
use crate::driver::{BuiltEngine, DriverProbe, PersistenceDriver};
use crate::model::EntityDescriptor;
use log::info;
use std::sync::Arc;
use std::time::Instant;

pub const SQLITE_DRIVER_ID: &str = "sqlite";

const SQLITE_DRIVER_ALIASES: &[&str] = &["rusqlite", "org.sqlite.JDBC"];
/// `INSERT .. ON CONFLICT DO UPDATE` landed in 3.24.0.
const MIN_SQLITE_VERSION_NUMBER: i32 = 3_024_000;

/// Driver backed by the linked SQLite library.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    pub fn new() -> Self {
        Self
    }
}

impl PersistenceDriver for SqliteDriver {
    fn id(&self) -> &str {
        SQLITE_DRIVER_ID
    }

    fn aliases(&self) -> &[&str] {
        SQLITE_DRIVER_ALIASES
    }

    fn probe(&self) -> DriverProbe {
        let version = rusqlite::version();
        if rusqlite::version_number() < MIN_SQLITE_VERSION_NUMBER {
            return DriverProbe::Missing {
                reason: format!("sqlite {version} is older than 3.24.0"),
            };
        }
        DriverProbe::Available {
            version: version.to_string(),
        }
    }

    fn supports_dialect(&self, dialect: Dialect) -> bool {
        dialect == Dialect::Sqlite
    }

    fn build(
        &self,
        settings: &PersistenceSettings,
        entities: &[&'static EntityDescriptor],
    ) -> Result<BuiltEngine, ConfigError> {
        let started_at = Instant::now();
        let target = SqliteTarget::parse_url(&settings.url)?;
        let factory = SqliteSessionFactory::bootstrap(
            target,
            settings.show_sql,
            settings.schema_mode,
            entities.to_vec(),
        )?;

        info!(
            "event=engine_build module=db status=ok driver={} mode={} schema_mode={} entities={} duration_ms={}",
            SQLITE_DRIVER_ID,
            factory.target().mode(),
            settings.schema_mode.as_str(),
            entities.len(),
            started_at.elapsed().as_millis()
        );
        Ok(BuiltEngine::sqlite(Arc::new(factory)))
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteDriver;
    use crate::config::Dialect;
    use crate::driver::PersistenceDriver;

    #[test]
    fn bundled_sqlite_passes_probe() {
        assert!(SqliteDriver::new().probe().is_available());
    }

    #[test]
    fn only_sqlite_dialect_is_supported() {
        let driver = SqliteDriver::new();
        assert!(driver.supports_dialect(Dialect::Sqlite));
        assert!(!driver.supports_dialect(Dialect::Postgres));
        assert!(!driver.supports_dialect(Dialect::MySql));
    }
}
