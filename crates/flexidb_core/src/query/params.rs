//! Named query parameter sets.

use crate::db::{PersistError, PersistResult};
use crate::model::Value;
use rusqlite::Statement;
use std::collections::BTreeMap;

/// Name to value bindings for one query.
///
/// Names are stored without the leading `:`; `add(":email", ..)` and
/// `add("email", ..)` address the same placeholder. A stored name binds to
/// `:name`, `@name` or `$name` in the statement text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParameters {
    values: BTreeMap<String, Value>,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chainable insert.
    pub fn add(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets one binding and returns the value it replaced.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(normalize(name), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(normalize(name).as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(normalize(name).as_str())
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

    /// Binds every parameter onto the `:name`, `@name` or `$name`
    /// placeholder `stmt` declares.
    ///
    /// Rebinding the same set onto the same statement is harmless.
    ///
    /// # Errors
    /// - `UnknownParameter` when the statement declares no such placeholder.
    pub fn apply_to(&self, stmt: &mut Statement<'_>) -> PersistResult<()> {
        for (name, value) in &self.values {
            let mut bound = false;
            for prefix in PLACEHOLDER_PREFIXES {
                if let Some(index) = stmt.parameter_index(&format!("{prefix}{name}"))? {
                    stmt.raw_bind_parameter(index, value)?;
                    bound = true;
                }
            }
            if !bound {
                return Err(PersistError::UnknownParameter(name.clone()));
            }
        }
        Ok(())
    }
}

pub(crate) const PLACEHOLDER_PREFIXES: [char; 3] = [':', '@', '$'];

fn normalize(name: &str) -> String {
    let trimmed = name.trim();
    trimmed.strip_prefix(':').unwrap_or(trimmed).to_string()
}

#[cfg(test)]
mod tests {
    use super::QueryParameters;
    use crate::db::PersistError;
    use crate::model::Value;
    use rusqlite::Connection;

    #[test]
    fn names_with_and_without_colon_are_equal() {
        let params = QueryParameters::new()
            .add(":email", "a@example.com".to_string())
            .add("tier", 2_i64);

        assert_eq!(params.len(), 2);
        assert!(params.contains("email"));
        assert_eq!(params.get(":tier"), Some(&Value::Integer(2)));

        let names: Vec<_> = params.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["email", "tier"]);
    }

    #[test]
    fn later_insert_replaces_value() {
        let mut params = QueryParameters::new().add("n", 1_i64);
        let previous = params.insert(":n", 2_i64);
        assert_eq!(previous, Some(Value::Integer(1)));
        assert_eq!(params.get("n"), Some(&Value::Integer(2)));
    }

    #[test]
    fn apply_to_binds_declared_names() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT :a + :b;").unwrap();
        let params = QueryParameters::new().add("a", 40_i64).add("b", 2_i64);

        params.apply_to(&mut stmt).unwrap();
        params.apply_to(&mut stmt).unwrap();

        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().expect("one row");
        assert_eq!(row.get::<_, i64>(0).unwrap(), 42);
    }

    #[test]
    fn apply_to_binds_at_and_dollar_placeholders() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT @a * $b;").unwrap();
        let params = QueryParameters::new().add("a", 6_i64).add(":b", 7_i64);

        params.apply_to(&mut stmt).unwrap();

        let mut rows = stmt.raw_query();
        let row = rows.next().unwrap().expect("one row");
        assert_eq!(row.get::<_, i64>(0).unwrap(), 42);
    }

    #[test]
    fn apply_to_rejects_undeclared_names() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT :a;").unwrap();
        let params = QueryParameters::new().add("a", 1_i64).add("zzz", 2_i64);

        let err = params.apply_to(&mut stmt).unwrap_err();
        assert!(matches!(err, PersistError::UnknownParameter(name) if name == "zzz"));
    }
}
