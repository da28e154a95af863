//! Schema mode handling for mapped entity tables.
//!
//! # Responsibility
//! - Create missing entity tables when the schema mode asks for it.
//! - Verify every mapped table and column exists before sessions are served.
//!
//! # Invariants
//! - Table creation runs in one immediate transaction; partial schemas are
//!   never left behind.
//! - Validation never mutates the database.

use super::PersistError;
use crate::config::{ConfigError, SchemaMode};
use crate::model::{EntityDescriptor, IdStrategy};
use log::{error, info};
use rusqlite::{Connection, TransactionBehavior};
use std::time::Instant;

/// Applies `mode` to the tables of `entities`.
///
/// # Errors
/// - `SchemaValidation` when a table or column is missing after the mode ran.
/// - `Engine` when SQLite rejects a statement.
pub fn apply_schema_mode(
    conn: &mut Connection,
    mode: SchemaMode,
    entities: &[&'static EntityDescriptor],
) -> Result<(), ConfigError> {
    let started_at = Instant::now();
    let result = match mode {
        SchemaMode::None => Ok(()),
        SchemaMode::Validate => validate_tables(conn, entities),
        SchemaMode::Create => match create_tables(conn, entities) {
            Ok(()) => validate_tables(conn, entities),
            Err(err) => Err(err),
        },
    };

    match &result {
        Ok(()) => info!(
            "event=schema_apply module=db status=ok mode={} tables={} duration_ms={}",
            mode.as_str(),
            entities.len(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=schema_apply module=db status=error mode={} duration_ms={} error={}",
            mode.as_str(),
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

/// `CREATE TABLE IF NOT EXISTS` statement for one descriptor.
pub fn create_table_sql(entity: &EntityDescriptor) -> String {
    let id_definition = match entity.id_strategy {
        IdStrategy::Generated => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", entity.id_column),
        IdStrategy::Assigned => format!(
            "{} {} PRIMARY KEY NOT NULL",
            entity.id_column,
            entity.id_type.as_sql()
        ),
    };

    let mut definitions = vec![id_definition];
    for column in entity.columns {
        let mut definition = format!("{} {}", column.name, column.sql_type.as_sql());
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        if column.unique {
            definition.push_str(" UNIQUE");
        }
        definitions.push(definition);
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        entity.table,
        definitions.join(", ")
    )
}

fn create_tables(
    conn: &mut Connection,
    entities: &[&'static EntityDescriptor],
) -> Result<(), ConfigError> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(engine_error)?;
    for entity in entities {
        tx.execute_batch(&create_table_sql(entity))
            .map_err(engine_error)?;
    }
    tx.commit().map_err(engine_error)
}

/// Checks that every table and mapped column exists.
pub fn validate_tables(
    conn: &Connection,
    entities: &[&'static EntityDescriptor],
) -> Result<(), ConfigError> {
    for entity in entities {
        if !table_exists(conn, entity.table).map_err(engine_error)? {
            return Err(ConfigError::SchemaValidation(format!(
                "table `{}` for entity `{}` does not exist",
                entity.table, entity.name
            )));
        }
        let expected = std::iter::once(entity.id_column).chain(entity.column_names());
        for column in expected {
            if !table_has_column(conn, entity.table, column).map_err(engine_error)? {
                return Err(ConfigError::SchemaValidation(format!(
                    "column `{}.{}` for entity `{}` does not exist",
                    entity.table, column, entity.name
                )));
            }
        }
    }
    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1 COLLATE NOCASE
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn engine_error(err: rusqlite::Error) -> ConfigError {
    ConfigError::Engine(PersistError::Sqlite(err))
}

#[cfg(test)]
mod tests {
    use super::{apply_schema_mode, create_table_sql, table_exists, table_has_column};
    use crate::config::{ConfigError, SchemaMode};
    use crate::model::{ColumnDef, EntityDescriptor, IdStrategy, SqlType};
    use rusqlite::Connection;

    static MEMBERS: EntityDescriptor = EntityDescriptor {
        name: "Member",
        table: "members",
        id_column: "id",
        id_type: SqlType::Integer,
        id_strategy: IdStrategy::Generated,
        columns: &[
            ColumnDef::new("email", SqlType::Text).unique(),
            ColumnDef::new("nickname", SqlType::Text).nullable(),
        ],
    };

    static BADGES: EntityDescriptor = EntityDescriptor {
        name: "Badge",
        table: "badges",
        id_column: "code",
        id_type: SqlType::Text,
        id_strategy: IdStrategy::Assigned,
        columns: &[ColumnDef::new("weight", SqlType::Real)],
    };

    #[test]
    fn create_sql_reflects_descriptor() {
        assert_eq!(
            create_table_sql(&MEMBERS),
            "CREATE TABLE IF NOT EXISTS members (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             email TEXT NOT NULL UNIQUE, nickname TEXT);"
        );
        assert_eq!(
            create_table_sql(&BADGES),
            "CREATE TABLE IF NOT EXISTS badges (code TEXT PRIMARY KEY NOT NULL, weight REAL NOT NULL);"
        );
    }

    #[test]
    fn create_mode_builds_tables_and_is_repeatable() {
        let mut conn = Connection::open_in_memory().unwrap();
        let entities = [&MEMBERS, &BADGES];

        apply_schema_mode(&mut conn, SchemaMode::Create, &entities).unwrap();
        apply_schema_mode(&mut conn, SchemaMode::Create, &entities).unwrap();

        assert!(table_exists(&conn, "members").unwrap());
        assert!(table_has_column(&conn, "badges", "weight").unwrap());
        assert!(!table_has_column(&conn, "badges", "missing").unwrap());
    }

    #[test]
    fn validate_mode_reports_missing_tables_and_columns() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = apply_schema_mode(&mut conn, SchemaMode::Validate, &[&MEMBERS]).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation(message) if message.contains("members")));

        conn.execute_batch("CREATE TABLE members (id INTEGER PRIMARY KEY, email TEXT);")
            .unwrap();
        let err = apply_schema_mode(&mut conn, SchemaMode::Validate, &[&MEMBERS]).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation(message) if message.contains("nickname")));
    }

    #[test]
    fn none_mode_skips_checks() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_schema_mode(&mut conn, SchemaMode::None, &[&MEMBERS]).unwrap();
        assert!(!table_exists(&conn, "members").unwrap());
    }
}
