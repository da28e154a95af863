//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Resolve a connection URL into a file or shared in-memory target.
//! - Open connections and apply the pragmas every session relies on.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - In-memory targets use a unique shared-cache name per engine.

use super::PersistResult;
use crate::config::{ConfigError, URL_KEY};
use log::{debug, error};
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

const MEMORY_URL: &str = "sqlite::memory:";
pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Physical location of one SQLite database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// Named shared-cache database living as long as one connection holds it.
    Memory { uri: String },
    File(PathBuf),
}

impl SqliteTarget {
    /// Parses `sqlite::memory:`, `sqlite://<path>` or `sqlite:<path>`.
    pub fn parse_url(url: &str) -> Result<Self, ConfigError> {
        let trimmed = url.trim();
        if trimmed == MEMORY_URL {
            return Ok(Self::Memory {
                uri: format!("file:flexidb-{}?mode=memory&cache=shared", Uuid::new_v4()),
            });
        }

        let path = trimmed
            .strip_prefix("sqlite://")
            .or_else(|| trimmed.strip_prefix("sqlite:"))
            .ok_or_else(|| ConfigError::InvalidSetting {
                key: URL_KEY,
                value: trimmed.to_string(),
                reason: "expected `sqlite::memory:`, `sqlite://<path>` or `sqlite:<path>`"
                    .to_string(),
            })?;
        if path.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                key: URL_KEY,
                value: trimmed.to_string(),
                reason: "database path is empty".to_string(),
            });
        }

        Ok(Self::File(PathBuf::from(path)))
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory { .. })
    }

    pub(crate) fn mode(&self) -> &'static str {
        match self {
            Self::Memory { .. } => "memory",
            Self::File(_) => "file",
        }
    }
}

/// Opens one connection to `target` with session pragmas applied.
///
/// # Side effects
/// - Emits `db_open` debug events, and an error event on failure.
pub fn open_connection(target: &SqliteTarget) -> PersistResult<Connection> {
    let started_at = Instant::now();
    let opened = match target {
        SqliteTarget::Memory { uri } => Connection::open_with_flags(
            uri,
            OpenFlags::default() | OpenFlags::SQLITE_OPEN_SHARED_CACHE,
        ),
        SqliteTarget::File(path) => Connection::open(path),
    };

    let conn = match opened.and_then(|conn| configure(&conn).map(|()| conn)) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                target.mode(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    debug!(
        "event=db_open module=db status=ok mode={} duration_ms={}",
        target.mode(),
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)
}
