//! Generic repository contracts and both dispatch strategies.
//!
//! # Responsibility
//! - Define the CRUD, paging and query surface every entity gets.
//! - Run each operation in exactly one transaction on exactly one session.
//!
//! # Invariants
//! - A repository always knows its entity descriptor; construction fails
//!   otherwise.
//! - Both strategies classify the same failure as the same `RepoError`.

use crate::config::ConfigError;
use crate::db::{PersistError, PersistResult};
use crate::model::Entity;
use crate::query::{Page, Pageable, QueryParameters};
use thiserror::Error;

mod dynamic;
mod simple;
mod transaction;

pub use dynamic::{DynDispatch, DynamicRepository};
pub use simple::SimpleRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Failures reported by repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence configuration failed: {0}")]
    Configuration(#[from] ConfigError),
    #[error("no persistence configuration available: {0}")]
    MissingConfiguration(String),
    #[error("persistence is not initialized")]
    Uninitialized,
    #[error("persistence is unavailable: {0}")]
    Unavailable(String),
    #[error("persistence has been shut down")]
    ShutDown,
    #[error("session failure: {0}")]
    Session(#[source] PersistError),
    #[error("transaction failed: {source}")]
    TransactionFailed { source: PersistError },
    #[error("rollback failed: {source}; original failure: {original}")]
    RollbackFailed {
        source: PersistError,
        original: PersistError,
    },
    #[error("query for `{entity}` returned more than one result")]
    NonUniqueResult { entity: &'static str },
    #[error("operation `{0}` is not supported by this repository")]
    Unsupported(&'static str),
}

impl RepoError {
    /// Stable machine-readable error code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::MissingConfiguration(_) => "missing_configuration",
            Self::Uninitialized => "uninitialized",
            Self::Unavailable(_) => "unavailable",
            Self::ShutDown => "shut_down",
            Self::Session(_) => "session",
            Self::TransactionFailed { .. } => "transaction_failed",
            Self::RollbackFailed { .. } => "rollback_failed",
            Self::NonUniqueResult { .. } => "non_unique_result",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

/// Uniform data access for one entity type.
pub trait Repository<E: Entity> {
    /// Inserts a new entity (id unset) or merges an existing one (id set).
    /// Returns the entity with its identifier populated.
    fn save(&self, entity: E) -> RepoResult<E>;

    fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<E>>;

    /// Every row, ordered by id.
    fn find_all(&self) -> RepoResult<Vec<E>>;

    /// Removes the row if present; an unknown id is not an error.
    fn delete_by_id(&self, id: &E::Id) -> RepoResult<()>;

    fn exists_by_id(&self, id: &E::Id) -> RepoResult<bool> {
        Ok(self.find_by_id(id)?.is_some())
    }

    /// Saves all entities in one transaction, all-or-nothing.
    fn save_all(&self, entities: Vec<E>) -> RepoResult<Vec<E>> {
        drop(entities);
        Err(RepoError::Unsupported("save_all"))
    }

    /// Runs `query` (`:name` placeholders) and maps every row.
    fn find_by(&self, query: &str, params: &QueryParameters) -> RepoResult<Vec<E>>;

    /// Runs `query` expecting at most one row.
    ///
    /// # Errors
    /// - `NonUniqueResult` when more than one row matches.
    fn find_one_by(&self, query: &str, params: &QueryParameters) -> RepoResult<Option<E>>;

    /// One window of rows in id order plus the total row count.
    fn find_page(&self, pageable: Pageable) -> RepoResult<Page<E>>;
}

/// Reduces a result set fetched with a limit of two to at most one row.
pub(crate) fn single_result<T>(entity: &'static str, mut rows: Vec<T>) -> PersistResult<Option<T>> {
    if rows.len() > 1 {
        return Err(PersistError::NonUniqueResult { entity });
    }
    Ok(rows.pop())
}
