//! SQLite engine: connection bootstrap, schema handling and sessions.
//!
//! # Responsibility
//! - Open and configure SQLite connections for flexidb sessions.
//! - Apply the configured schema mode before any session is handed out.
//! - Own every SQL statement issued on behalf of repositories.
//!
//! # Invariants
//! - Every connection has `foreign_keys=ON` and a busy timeout.
//! - In-memory engines run at most one transaction at a time.
//! - Table and column names reach SQL text only after descriptor validation.

use crate::driver::Capability;
use thiserror::Error;

mod driver;
mod gate;
mod open;
pub mod schema;
mod session;
mod sql;

pub use driver::{SqliteDriver, SQLITE_DRIVER_ID};
pub use open::{open_connection, SqliteTarget};
pub use session::{SqliteSession, SqliteSessionFactory};

pub type PersistResult<T> = Result<T, PersistError>;

/// Failures raised while talking to an open unit of work.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("query does not declare parameter `{0}`")]
    UnknownParameter(String),
    #[error("query parameter `{0}` was never bound")]
    UnboundParameter(String),
    #[error("query expects {expected} positional parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("entity `{entity}` uses assigned identifiers but none was set")]
    MissingIdentifier { entity: &'static str },
    #[error("driver `{driver}` does not provide capability `{capability}`")]
    CapabilityMissing {
        driver: String,
        capability: Capability,
    },
    #[error("operation `{operation}` returned an unexpected reply")]
    UnexpectedReply { operation: &'static str },
    #[error("query for `{entity}` matched more than one row")]
    NonUniqueResult { entity: &'static str },
    #[error("session is already closed")]
    SessionClosed,
    #[error("no transaction is active")]
    NoActiveTransaction,
    #[error("a transaction is already active")]
    TransactionActive,
    #[error("session factory is closed")]
    EngineClosed,
    #[error("gave up waiting for the in-memory write lock after {waited_ms} ms")]
    LockTimeout { waited_ms: u128 },
}
