//! Query value objects shared by both repository strategies.
//!
//! # Invariants
//! - `Pageable` never holds a zero page size.
//! - A `QuerySpec` binds either named or positional parameters, never both.

use crate::model::Value;

mod page;
mod params;

pub use page::{Page, Pageable, PaginationError, Window};
pub use params::QueryParameters;
pub(crate) use params::PLACEHOLDER_PREFIXES;

/// How parameters reach the statement placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// `:name` placeholders.
    Named(QueryParameters),
    /// `?` placeholders bound in order.
    Positional(Vec<Value>),
}

/// A caller-supplied SQL query returning rows of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    sql: String,
    binding: Binding,
    window: Option<Window>,
}

impl QuerySpec {
    pub fn named(sql: impl Into<String>, params: QueryParameters) -> Self {
        Self {
            sql: sql.into(),
            binding: Binding::Named(params),
            window: None,
        }
    }

    pub fn positional(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            binding: Binding::Positional(values),
            window: None,
        }
    }

    /// Restricts the result to the first `limit` rows.
    pub fn limit(self, limit: u32) -> Self {
        self.with_window(Window::first(limit))
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }
}
