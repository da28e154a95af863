//! Persistence configuration: settings resolution and bootstrap lifecycle.
//!
//! # Responsibility
//! - Gather and validate required persistence settings.
//! - Resolve the declared dialect, schema mode and SQL echo flag.
//! - Own the process-wide engine lifecycle (`PersistenceConfig`).
//!
//! # Invariants
//! - Missing required settings fail initialization; nothing is guessed.
//! - The password is never logged nor printed by `Debug`.

use crate::db::PersistError;
use crate::settings::SettingsSource;
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;

mod provider;

pub use provider::{
    global_config, install_global, ApiVariant, Availability, Lifecycle, PersistenceConfig,
    PersistenceConfigBuilder, ReadyEngine,
};

pub const URL_KEY: &str = "flexidb.connection.url";
pub const USERNAME_KEY: &str = "flexidb.connection.username";
pub const PASSWORD_KEY: &str = "flexidb.connection.password";
pub const DRIVER_KEY: &str = "flexidb.connection.driver";
pub const DIALECT_KEY: &str = "flexidb.dialect";
pub const ENTITY_PACKAGE_KEY: &str = "flexidb.entity-package";
pub const SCHEMA_MODE_KEY: &str = "flexidb.schema.mode";
pub const SHOW_SQL_KEY: &str = "flexidb.show_sql";

const DEFAULT_SCHEMA_MODE: &str = "validate";
const DEFAULT_SHOW_SQL: &str = "false";

/// Configuration and bootstrap failures. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting `{0}` is missing")]
    MissingSetting(&'static str),
    #[error("setting `{key}` has invalid value `{value}`: {reason}")]
    InvalidSetting {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("dialect `{0}` does not resolve to a known implementation")]
    UnknownDialect(String),
    #[error("dialect `{dialect}` is not supported by driver `{driver}`")]
    UnsupportedDialect { dialect: Dialect, driver: String },
    #[error("driver `{0}` is not registered")]
    UnknownDriver(String),
    #[error("driver `{driver}` is unavailable: {reason}")]
    DriverUnavailable { driver: String, reason: String },
    #[error("entity package `{0}` was not found")]
    EntityPackageNotFound(String),
    #[error("entity package `{0}` contains no entities")]
    EmptyEntityPackage(String),
    #[error("entities `{first}` and `{second}` both map table `{table}`")]
    DuplicateEntity {
        table: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("entity descriptor `{entity}` is invalid: {reason}")]
    InvalidDescriptor {
        entity: &'static str,
        reason: String,
    },
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("engine bootstrap failed: {0}")]
    Engine(#[from] PersistError),
    #[error("initialization previously failed: {0}")]
    InitializationFailed(String),
    #[error("persistence configuration has been shut down")]
    ShutDown,
    #[error("a global persistence configuration is already installed")]
    AlreadyInstalled,
}

/// SQL vendor declared by the `flexidb.dialect` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Resolves short names and the fully-qualified class names used by
    /// existing deployments.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim() {
            "sqlite" | "SQLiteDialect" | "org.hibernate.community.dialect.SQLiteDialect" => {
                Ok(Self::Sqlite)
            }
            "postgres" | "postgresql" | "PostgreSQLDialect"
            | "org.hibernate.dialect.PostgreSQLDialect" => Ok(Self::Postgres),
            "mysql" | "MySQLDialect" | "org.hibernate.dialect.MySQLDialect" => Ok(Self::MySql),
            other => Err(ConfigError::UnknownDialect(other.to_string())),
        }
    }
}

impl Display for Dialect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What bootstrap does with the entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    /// Trust the database as-is.
    None,
    /// Require every mapped table and column to exist.
    Validate,
    /// Create missing tables, then validate.
    Create,
}

impl SchemaMode {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "validate" => Ok(Self::Validate),
            "create" | "update" => Ok(Self::Create),
            other => Err(ConfigError::InvalidSetting {
                key: SCHEMA_MODE_KEY,
                value: other.to_string(),
                reason: "expected none|validate|create|update".to_string(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Validate => "validate",
            Self::Create => "create",
        }
    }
}

/// Validated persistence settings.
#[derive(Clone, PartialEq, Eq)]
pub struct PersistenceSettings {
    pub url: String,
    pub username: String,
    password: String,
    pub driver: String,
    pub dialect: Dialect,
    pub entity_package: String,
    pub schema_mode: SchemaMode,
    pub show_sql: bool,
}

impl PersistenceSettings {
    /// Gathers and validates every setting from `source`.
    ///
    /// # Errors
    /// - `MissingSetting` when a required key is absent, or blank where a
    ///   value is mandatory (the password may be empty).
    /// - `UnknownDialect` when the dialect cannot be resolved.
    /// - `InvalidSetting` for malformed schema mode or echo flag values.
    pub fn from_source(source: &dyn SettingsSource) -> Result<Self, ConfigError> {
        let url = required_non_blank(source, URL_KEY)?;
        let username = required(source, USERNAME_KEY)?;
        let password = required(source, PASSWORD_KEY)?;
        let driver = required_non_blank(source, DRIVER_KEY)?;
        let dialect = Dialect::parse(&required_non_blank(source, DIALECT_KEY)?)?;
        let entity_package = required_non_blank(source, ENTITY_PACKAGE_KEY)?;
        let schema_mode = SchemaMode::parse(&source.get_or(SCHEMA_MODE_KEY, DEFAULT_SCHEMA_MODE))?;
        let show_sql = parse_flag(SHOW_SQL_KEY, &source.get_or(SHOW_SQL_KEY, DEFAULT_SHOW_SQL))?;

        Ok(Self {
            url,
            username,
            password,
            driver,
            dialect,
            entity_package,
            schema_mode,
            show_sql,
        })
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl Debug for PersistenceSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceSettings")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("driver", &self.driver)
            .field("dialect", &self.dialect)
            .field("entity_package", &self.entity_package)
            .field("schema_mode", &self.schema_mode)
            .field("show_sql", &self.show_sql)
            .finish()
    }
}

fn required(source: &dyn SettingsSource, key: &'static str) -> Result<String, ConfigError> {
    source.get(key).ok_or(ConfigError::MissingSetting(key))
}

fn required_non_blank(
    source: &dyn SettingsSource,
    key: &'static str,
) -> Result<String, ConfigError> {
    let value = required(source, key)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingSetting(key));
    }
    Ok(trimmed.to_string())
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidSetting {
            key,
            value: other.to_string(),
            reason: "expected true|false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, Dialect, PersistenceSettings, SchemaMode, DIALECT_KEY, DRIVER_KEY,
        ENTITY_PACKAGE_KEY, PASSWORD_KEY, SCHEMA_MODE_KEY, SHOW_SQL_KEY, URL_KEY, USERNAME_KEY,
    };
    use crate::settings::MapSettings;

    fn complete() -> MapSettings {
        MapSettings::new()
            .with(URL_KEY, "sqlite::memory:")
            .with(USERNAME_KEY, "app")
            .with(PASSWORD_KEY, "s3cret")
            .with(DRIVER_KEY, "sqlite")
            .with(DIALECT_KEY, "org.hibernate.community.dialect.SQLiteDialect")
            .with(ENTITY_PACKAGE_KEY, "app.model")
    }

    #[test]
    fn resolves_complete_settings_with_defaults() {
        let settings = PersistenceSettings::from_source(&complete()).expect("settings resolve");
        assert_eq!(settings.dialect, Dialect::Sqlite);
        assert_eq!(settings.schema_mode, SchemaMode::Validate);
        assert!(!settings.show_sql);
        assert_eq!(settings.password(), "s3cret");
    }

    #[test]
    fn each_required_key_is_enforced() {
        for key in [
            URL_KEY,
            USERNAME_KEY,
            PASSWORD_KEY,
            DRIVER_KEY,
            DIALECT_KEY,
            ENTITY_PACKAGE_KEY,
        ] {
            let mut source = complete();
            source.remove(key);
            let err = PersistenceSettings::from_source(&source).expect_err("missing key must fail");
            assert!(
                matches!(err, ConfigError::MissingSetting(missing) if missing == key),
                "unexpected error for {key}: {err}"
            );
        }
    }

    #[test]
    fn empty_password_is_allowed_but_blank_url_is_not() {
        let source = complete().with(PASSWORD_KEY, "");
        assert!(PersistenceSettings::from_source(&source).is_ok());

        let source = complete().with(URL_KEY, "   ");
        assert!(matches!(
            PersistenceSettings::from_source(&source),
            Err(ConfigError::MissingSetting(URL_KEY))
        ));
    }

    #[test]
    fn unknown_dialect_is_fatal() {
        let source = complete().with(DIALECT_KEY, "com.example.MadeUpDialect");
        assert!(matches!(
            PersistenceSettings::from_source(&source),
            Err(ConfigError::UnknownDialect(_))
        ));
    }

    #[test]
    fn parses_optional_settings() {
        let source = complete()
            .with(SCHEMA_MODE_KEY, "UPDATE")
            .with(SHOW_SQL_KEY, "yes");
        let settings = PersistenceSettings::from_source(&source).unwrap();
        assert_eq!(settings.schema_mode, SchemaMode::Create);
        assert!(settings.show_sql);

        let source = complete().with(SHOW_SQL_KEY, "maybe");
        assert!(matches!(
            PersistenceSettings::from_source(&source),
            Err(ConfigError::InvalidSetting { key: SHOW_SQL_KEY, .. })
        ));
    }

    #[test]
    fn debug_output_redacts_password() {
        let settings = PersistenceSettings::from_source(&complete()).unwrap();
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
