//! Entity trait, table descriptors and dynamic row records.
//!
//! # Invariants
//! - `Entity::to_record` never contains the id column; sessions add it.
//! - `Entity::from_record` receives the id column plus every mapped column.
//! - `IdStrategy::Generated` is only valid for `SqlType::Integer` ids.

use crate::config::ConfigError;
use crate::db::{PersistError, PersistResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::marker::PhantomData;
use uuid::Uuid;

/// Dynamically typed SQL value, shared with the SQLite engine.
pub use rusqlite::types::Value;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Storage class of one mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
}

impl SqlType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

/// One non-id column of an entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub unique: bool,
}

impl ColumnDef {
    /// Non-null, non-unique column.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            unique: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// How identifiers are produced for new rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// The engine allocates an integer id on insert.
    Generated,
    /// The caller sets the id before the first save.
    Assigned,
}

/// Table mapping for one entity type.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity name used in logs and errors.
    pub name: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub id_type: SqlType,
    pub id_strategy: IdStrategy,
    /// Mapped columns, excluding the id column.
    pub columns: &'static [ColumnDef],
}

impl EntityDescriptor {
    /// Checks that the descriptor can be turned into SQL safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidDescriptor {
            entity: self.name,
            reason,
        };

        for (what, value) in [("table", self.table), ("id column", self.id_column)] {
            if !IDENTIFIER.is_match(value) {
                return Err(invalid(format!("{what} `{value}` is not a valid identifier")));
            }
        }
        if self.columns.is_empty() {
            return Err(invalid("no columns are mapped".to_string()));
        }
        if self.id_strategy == IdStrategy::Generated && self.id_type != SqlType::Integer {
            return Err(invalid(
                "generated identifiers require an INTEGER id column".to_string(),
            ));
        }

        let mut seen = BTreeSet::from([self.id_column.to_ascii_lowercase()]);
        for column in self.columns {
            if !IDENTIFIER.is_match(column.name) {
                return Err(invalid(format!(
                    "column `{}` is not a valid identifier",
                    column.name
                )));
            }
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(invalid(format!("column `{}` is mapped twice", column.name)));
            }
        }

        Ok(())
    }

    /// Mapped column names in declaration order, excluding the id column.
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.columns.iter().map(|column| column.name)
    }
}

/// Column name to value map for one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable insert used by `Entity::to_record` implementations.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Returns the value for `column`; `Null` when the column is absent.
    pub fn value_or_null(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn integer(&self, column: &str) -> PersistResult<i64> {
        self.opt_integer(column)?
            .ok_or_else(|| unexpected_null(column))
    }

    pub fn opt_integer(&self, column: &str) -> PersistResult<Option<i64>> {
        match self.required(column)? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(*value)),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    pub fn real(&self, column: &str) -> PersistResult<f64> {
        match self.required(column)? {
            Value::Real(value) => Ok(*value),
            Value::Integer(value) => Ok(*value as f64),
            Value::Null => Err(unexpected_null(column)),
            other => Err(type_mismatch(column, "real", other)),
        }
    }

    pub fn text(&self, column: &str) -> PersistResult<String> {
        self.opt_text(column)?.ok_or_else(|| unexpected_null(column))
    }

    pub fn opt_text(&self, column: &str) -> PersistResult<Option<String>> {
        match self.required(column)? {
            Value::Null => Ok(None),
            Value::Text(value) => Ok(Some(value.clone())),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    /// Reads a 0/1 integer column.
    pub fn boolean(&self, column: &str) -> PersistResult<bool> {
        match self.integer(column)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(PersistError::InvalidData(format!(
                "invalid boolean value `{other}` in column `{column}`"
            ))),
        }
    }

    fn required(&self, column: &str) -> PersistResult<&Value> {
        self.values
            .get(column)
            .ok_or_else(|| PersistError::InvalidData(format!("column `{column}` is missing")))
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

fn unexpected_null(column: &str) -> PersistError {
    PersistError::InvalidData(format!("column `{column}` is unexpectedly null"))
}

fn type_mismatch(column: &str, expected: &str, actual: &Value) -> PersistError {
    PersistError::InvalidData(format!(
        "column `{column}` holds {:?}, expected {expected}",
        actual.data_type()
    ))
}

/// Identifier types usable as entity primary keys.
pub trait EntityId: Clone + Debug + PartialEq + Send + Sync + 'static {
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> PersistResult<Self>;
}

impl EntityId for i64 {
    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> PersistResult<Self> {
        match value {
            Value::Integer(id) => Ok(id),
            other => Err(PersistError::InvalidData(format!(
                "expected integer identifier, got {:?}",
                other.data_type()
            ))),
        }
    }
}

impl EntityId for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> PersistResult<Self> {
        match value {
            Value::Text(id) => Ok(id),
            other => Err(PersistError::InvalidData(format!(
                "expected text identifier, got {:?}",
                other.data_type()
            ))),
        }
    }
}

impl EntityId for Uuid {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }

    fn from_value(value: Value) -> PersistResult<Self> {
        let text = String::from_value(value)?;
        Uuid::parse_str(&text)
            .map_err(|_| PersistError::InvalidData(format!("invalid uuid identifier `{text}`")))
    }
}

/// A type persisted as rows of one table.
pub trait Entity: Sized + Send + 'static {
    type Id: EntityId;

    fn descriptor() -> &'static EntityDescriptor;

    /// Current identifier; `None` marks a new, never-saved entity.
    fn id(&self) -> Option<Self::Id>;

    fn set_id(&mut self, id: Self::Id);

    /// Mapped column values, excluding the id column.
    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> PersistResult<Self>;
}

/// Type witness binding a repository to its entity descriptor.
pub struct EntityType<E> {
    descriptor: &'static EntityDescriptor,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityType<E> {
    /// Resolves and validates the descriptor of `E`.
    pub fn resolve() -> Result<Self, ConfigError> {
        let descriptor = E::descriptor();
        descriptor.validate()?;
        Ok(Self {
            descriptor,
            _entity: PhantomData,
        })
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.descriptor
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }
}

impl<E> Clone for EntityType<E> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor,
            _entity: PhantomData,
        }
    }
}

impl<E> Debug for EntityType<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityType")
            .field("entity", &self.descriptor.name)
            .field("table", &self.descriptor.table)
            .finish()
    }
}
