//! SQL statements issued for entity operations.
//!
//! # Invariants
//! - Identifiers come from validated descriptors only; values are always bound.
//! - Listing is ordered by id so windows are stable.

use super::{PersistError, PersistResult};
use crate::model::{EntityDescriptor, IdStrategy, Record, Value};
use crate::query::{Binding, QueryParameters, QuerySpec, Window, PLACEHOLDER_PREFIXES};
use log::info;
use rusqlite::{Connection, Statement};

/// Executes entity statements on one borrowed connection.
pub(crate) struct SqlExecutor<'conn> {
    conn: &'conn Connection,
    show_sql: bool,
}

impl<'conn> SqlExecutor<'conn> {
    pub(crate) fn new(conn: &'conn Connection, show_sql: bool) -> Self {
        Self { conn, show_sql }
    }

    /// Inserts one row and returns its identifier.
    ///
    /// Without `id`, the entity must use generated ids and the row id becomes
    /// the identifier.
    pub(crate) fn insert(
        &self,
        entity: &EntityDescriptor,
        record: &Record,
        id: Option<&Value>,
    ) -> PersistResult<Value> {
        if id.is_none() && entity.id_strategy == IdStrategy::Assigned {
            return Err(PersistError::MissingIdentifier {
                entity: entity.name,
            });
        }

        let mut columns: Vec<&str> = Vec::with_capacity(entity.columns.len() + 1);
        let mut values: Vec<Value> = Vec::with_capacity(entity.columns.len() + 1);
        if let Some(id) = id {
            columns.push(entity.id_column);
            values.push(id.clone());
        }
        for column in entity.column_names() {
            columns.push(column);
            values.push(record.value_or_null(column));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            entity.table,
            columns.join(", "),
            placeholders(columns.len())
        );
        self.execute(&sql, &values)?;

        Ok(match id {
            Some(id) => id.clone(),
            None => Value::Integer(self.conn.last_insert_rowid()),
        })
    }

    /// Inserts or updates the row keyed by `id`.
    pub(crate) fn merge(
        &self,
        entity: &EntityDescriptor,
        record: &Record,
        id: &Value,
    ) -> PersistResult<()> {
        let mut columns = vec![entity.id_column];
        columns.extend(entity.column_names());
        let values: Vec<Value> = std::iter::once(id.clone())
            .chain(entity.column_names().map(|column| record.value_or_null(column)))
            .collect();
        let assignments: Vec<String> = entity
            .column_names()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect();

        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({values}) ON CONFLICT({id}) DO UPDATE SET {assignments};",
            table = entity.table,
            columns = columns.join(", "),
            values = placeholders(columns.len()),
            id = entity.id_column,
            assignments = assignments.join(", ")
        );
        self.execute(&sql, &values)?;
        Ok(())
    }

    pub(crate) fn select_by_id(
        &self,
        entity: &EntityDescriptor,
        id: &Value,
    ) -> PersistResult<Option<Record>> {
        let sql = format!(
            "{} WHERE {} = ?1 LIMIT 1;",
            select_columns(entity),
            entity.id_column
        );
        let mut stmt = self.prepare(&sql)?;
        stmt.raw_bind_parameter(1, id)?;
        Ok(read_records(&mut stmt)?.into_iter().next())
    }

    pub(crate) fn delete_by_id(
        &self,
        entity: &EntityDescriptor,
        id: &Value,
    ) -> PersistResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1;",
            entity.table, entity.id_column
        );
        Ok(self.execute(&sql, std::slice::from_ref(id))? > 0)
    }

    pub(crate) fn select_all(
        &self,
        entity: &EntityDescriptor,
        window: Option<Window>,
    ) -> PersistResult<Vec<Record>> {
        let mut sql = format!(
            "{} ORDER BY {} ASC",
            select_columns(entity),
            entity.id_column
        );
        push_window(&mut sql, window);
        sql.push(';');

        let mut stmt = self.prepare(&sql)?;
        read_records(&mut stmt)
    }

    pub(crate) fn count_rows(&self, entity: &EntityDescriptor) -> PersistResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {};", entity.table);
        self.echo(&sql);
        let total: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        u64::try_from(total)
            .map_err(|_| PersistError::InvalidData(format!("negative row count `{total}`")))
    }

    /// Runs a caller-supplied query and returns its rows.
    pub(crate) fn run_query(&self, spec: &QuerySpec) -> PersistResult<Vec<Record>> {
        let sql = match spec.window() {
            None => spec.sql().to_string(),
            Some(window) => {
                // Own lines keep a trailing `--` comment away from the paren.
                let mut wrapped = format!("SELECT * FROM (\n{}\n)", trim_statement(spec.sql()));
                push_window(&mut wrapped, Some(window));
                wrapped
            }
        };

        let mut stmt = self.prepare(&sql)?;
        match spec.binding() {
            Binding::Named(params) => bind_named(&mut stmt, params)?,
            Binding::Positional(values) => bind_positional(&mut stmt, values)?,
        }
        read_records(&mut stmt)
    }

    fn prepare(&self, sql: &str) -> PersistResult<Statement<'conn>> {
        self.echo(sql);
        Ok(self.conn.prepare(sql)?)
    }

    fn execute(&self, sql: &str, values: &[Value]) -> PersistResult<usize> {
        let mut stmt = self.prepare(sql)?;
        bind_positional(&mut stmt, values)?;
        Ok(stmt.raw_execute()?)
    }

    fn echo(&self, sql: &str) {
        if self.show_sql {
            info!("event=sql_echo module=db sql={}", sql);
        }
    }
}

fn select_columns(entity: &EntityDescriptor) -> String {
    let mut columns = vec![entity.id_column];
    columns.extend(entity.column_names());
    format!("SELECT {} FROM {}", columns.join(", "), entity.table)
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_window(sql: &mut String, window: Option<Window>) {
    if let Some(window) = window {
        sql.push_str(&format!(" LIMIT {}", window.limit));
        if window.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", window.offset));
        }
    }
}

fn trim_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

fn bind_named(stmt: &mut Statement<'_>, params: &QueryParameters) -> PersistResult<()> {
    params.apply_to(stmt)?;
    for index in 1..=stmt.parameter_count() {
        match stmt.parameter_name(index) {
            Some(name) => {
                let bare = name.trim_start_matches(PLACEHOLDER_PREFIXES);
                if !params.contains(bare) {
                    return Err(PersistError::UnboundParameter(bare.to_string()));
                }
            }
            None => return Err(PersistError::UnboundParameter(format!("?{index}"))),
        }
    }
    Ok(())
}

fn bind_positional(stmt: &mut Statement<'_>, values: &[Value]) -> PersistResult<()> {
    let expected = stmt.parameter_count();
    if expected != values.len() {
        return Err(PersistError::ParameterCount {
            expected,
            actual: values.len(),
        });
    }
    for (index, value) in values.iter().enumerate() {
        stmt.raw_bind_parameter(index + 1, value)?;
    }
    Ok(())
}

fn read_records(stmt: &mut Statement<'_>) -> PersistResult<Vec<Record>> {
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rows = stmt.raw_query();
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let record = columns
            .iter()
            .enumerate()
            .map(|(index, name)| row.get::<_, Value>(index).map(|value| (name.clone(), value)))
            .collect::<rusqlite::Result<Record>>()?;
        records.push(record);
    }
    Ok(records)
}
