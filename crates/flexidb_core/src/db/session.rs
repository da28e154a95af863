//! SQLite session factory and unit-of-work sessions.
//!
//! # Responsibility
//! - Bootstrap the database once (schema mode) and hand out one connection
//!   per session.
//! - Serve both the typed `UnitOfWork` surface and the `DynSession` surface
//!   through the same SQL layer.
//!
//! # Invariants
//! - In-memory databases stay alive through an anchor connection until the
//!   factory is closed.
//! - Transactions start with `BEGIN IMMEDIATE`.
//! - On in-memory databases a session holds the engine's write gate from
//!   `begin` until its transaction ends.
//! - A closed session rejects every further operation with `SessionClosed`.

use super::gate::{GatePass, WriteGate};
use super::open::{open_connection, SqliteTarget, BUSY_TIMEOUT};
use super::schema::apply_schema_mode;
use super::sql::SqlExecutor;
use super::{PersistError, PersistResult, SQLITE_DRIVER_ID};
use crate::config::{ConfigError, SchemaMode};
use crate::driver::{CapabilitySet, DynEngine};
use crate::model::{Entity, EntityDescriptor, EntityId};
use crate::query::{QuerySpec, Window};
use crate::session::{
    DynSession, EntityQuery, SaveMode, SessionCall, SessionReply, Transactional, UnitOfWork,
};
use log::{debug, info, warn};
use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Produces sessions against one configured SQLite database.
pub struct SqliteSessionFactory {
    target: SqliteTarget,
    show_sql: bool,
    entities: Vec<&'static EntityDescriptor>,
    anchor: Mutex<Option<Connection>>,
    gate: Option<Arc<WriteGate>>,
    closed: AtomicBool,
}

impl SqliteSessionFactory {
    /// Opens the database, applies `schema_mode` and keeps the bootstrap
    /// connection as the anchor for in-memory targets.
    ///
    /// # Errors
    /// - `Engine` when the database cannot be opened.
    /// - `SchemaValidation` when mapped tables do not match the database.
    pub fn bootstrap(
        target: SqliteTarget,
        show_sql: bool,
        schema_mode: SchemaMode,
        entities: Vec<&'static EntityDescriptor>,
    ) -> Result<Self, ConfigError> {
        let mut conn = open_connection(&target)?;
        apply_schema_mode(&mut conn, schema_mode, &entities)?;

        let (anchor, gate) = if target.is_memory() {
            (Some(conn), Some(WriteGate::new(BUSY_TIMEOUT)))
        } else {
            drop(conn);
            (None, None)
        };

        Ok(Self {
            target,
            show_sql,
            entities,
            anchor: Mutex::new(anchor),
            gate,
            closed: AtomicBool::new(false),
        })
    }

    pub fn target(&self) -> &SqliteTarget {
        &self.target
    }

    pub fn show_sql(&self) -> bool {
        self.show_sql
    }

    pub fn entities(&self) -> &[&'static EntityDescriptor] {
        &self.entities
    }

    /// Opens a fresh session with its own connection.
    pub fn new_session(&self) -> PersistResult<SqliteSession> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PersistError::EngineClosed);
        }
        let conn = open_connection(&self.target)?;
        Ok(SqliteSession {
            conn: Some(conn),
            show_sql: self.show_sql,
            gate: self.gate.clone(),
            pass: None,
        })
    }

    /// Releases the anchor connection. Idempotent.
    pub fn shutdown(&self) -> PersistResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let anchor = self
            .anchor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = anchor {
            conn.close().map_err(|(_, err)| PersistError::Sqlite(err))?;
        }
        info!(
            "event=engine_close module=db status=ok driver={} mode={}",
            SQLITE_DRIVER_ID,
            self.target.mode()
        );
        Ok(())
    }
}

impl DynEngine for SqliteSessionFactory {
    fn driver_id(&self) -> &str {
        SQLITE_DRIVER_ID
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    fn open(&self) -> PersistResult<Box<dyn DynSession>> {
        Ok(Box::new(self.new_session()?))
    }

    fn close(&self) -> PersistResult<()> {
        self.shutdown()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// One SQLite connection used as a unit of work.
pub struct SqliteSession {
    // Dropped before `pass`, so an abandoned transaction is rolled back
    // before the gate reopens.
    conn: Option<Connection>,
    show_sql: bool,
    gate: Option<Arc<WriteGate>>,
    pass: Option<GatePass>,
}

impl SqliteSession {
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Borrowed connection for statements not covered by the entity API.
    pub fn connection(&self) -> PersistResult<&Connection> {
        self.conn.as_ref().ok_or(PersistError::SessionClosed)
    }

    fn sql(&self) -> PersistResult<SqlExecutor<'_>> {
        Ok(SqlExecutor::new(self.connection()?, self.show_sql))
    }

    fn run_batch(&self, statement: &str) -> PersistResult<()> {
        let conn = self.connection()?;
        if self.show_sql {
            info!("event=sql_echo module=db sql={}", statement);
        }
        conn.execute_batch(statement)?;
        Ok(())
    }

    /// Ends the transaction; the gate stays held while it is still open.
    fn finish(&mut self, statement: &str) -> PersistResult<()> {
        let ended = self.run_batch(statement);
        if !self.is_active() {
            self.pass = None;
        }
        ended
    }

    fn close_connection(&mut self) -> PersistResult<()> {
        let conn = self.conn.take().ok_or(PersistError::SessionClosed)?;
        if !conn.is_autocommit() {
            warn!("event=session_close module=db status=warn reason=transaction_active");
        }
        let closed = conn.close().map_err(|(_, err)| PersistError::Sqlite(err));
        self.pass = None;
        closed?;
        debug!("event=session_close module=db status=ok");
        Ok(())
    }
}

impl Transactional for SqliteSession {
    fn begin(&mut self) -> PersistResult<()> {
        if self.is_active() {
            return Err(PersistError::TransactionActive);
        }
        self.connection()?;
        let pass = self.gate.as_ref().map(WriteGate::enter).transpose()?;
        self.run_batch("BEGIN IMMEDIATE;")?;
        self.pass = pass;
        Ok(())
    }

    fn commit(&mut self) -> PersistResult<()> {
        if !self.is_active() {
            return Err(PersistError::NoActiveTransaction);
        }
        self.finish("COMMIT;")
    }

    fn rollback(&mut self) -> PersistResult<()> {
        if !self.is_active() {
            return Err(PersistError::NoActiveTransaction);
        }
        self.finish("ROLLBACK;")
    }

    fn is_active(&self) -> bool {
        self.conn
            .as_ref()
            .map(|conn| !conn.is_autocommit())
            .unwrap_or(false)
    }

    fn close(mut self) -> PersistResult<()> {
        self.close_connection()
    }
}

impl UnitOfWork for SqliteSession {
    fn persist<E: Entity>(&mut self, entity: &mut E) -> PersistResult<()> {
        let id = entity.id().map(|id| id.to_value());
        let saved = self
            .sql()?
            .insert(E::descriptor(), &entity.to_record(), id.as_ref())?;
        entity.set_id(E::Id::from_value(saved)?);
        Ok(())
    }

    fn merge<E: Entity>(&mut self, entity: &E) -> PersistResult<()> {
        let descriptor = E::descriptor();
        let id = entity.id().ok_or(PersistError::MissingIdentifier {
            entity: descriptor.name,
        })?;
        self.sql()?
            .merge(descriptor, &entity.to_record(), &id.to_value())
    }

    fn get<E: Entity>(&mut self, id: &E::Id) -> PersistResult<Option<E>> {
        self.sql()?
            .select_by_id(E::descriptor(), &id.to_value())?
            .map(|record| E::from_record(&record))
            .transpose()
    }

    fn remove<E: Entity>(&mut self, id: &E::Id) -> PersistResult<bool> {
        self.sql()?.delete_by_id(E::descriptor(), &id.to_value())
    }

    fn list<E: Entity>(&mut self, window: Option<Window>) -> PersistResult<Vec<E>> {
        self.sql()?
            .select_all(E::descriptor(), window)?
            .iter()
            .map(E::from_record)
            .collect()
    }

    fn count<E: Entity>(&mut self) -> PersistResult<u64> {
        self.sql()?.count_rows(E::descriptor())
    }

    fn query<E: Entity>(&mut self, spec: &QuerySpec) -> PersistResult<Vec<E>> {
        self.sql()?
            .run_query(spec)?
            .iter()
            .map(E::from_record)
            .collect()
    }
}

impl DynSession for SqliteSession {
    fn driver_id(&self) -> &str {
        SQLITE_DRIVER_ID
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    fn transaction_active(&self) -> bool {
        self.is_active()
    }

    fn invoke(&mut self, call: SessionCall<'_>) -> PersistResult<SessionReply> {
        match call {
            SessionCall::BeginTransaction => self.begin().map(|()| SessionReply::Done),
            SessionCall::Commit => self.commit().map(|()| SessionReply::Done),
            SessionCall::Rollback => self.rollback().map(|()| SessionReply::Done),
            SessionCall::Close => self.close_connection().map(|()| SessionReply::Done),
            SessionCall::Save {
                entity,
                record,
                id,
                mode: SaveMode::Insert,
            } => self.sql()?.insert(entity, record, id).map(SessionReply::Saved),
            SessionCall::Save {
                entity,
                record,
                id,
                mode: SaveMode::Merge,
            } => {
                let id = id.ok_or(PersistError::MissingIdentifier {
                    entity: entity.name,
                })?;
                self.sql()?.merge(entity, record, id)?;
                Ok(SessionReply::Saved(id.clone()))
            }
            SessionCall::Get { entity, id } => {
                self.sql()?.select_by_id(entity, id).map(SessionReply::Row)
            }
            SessionCall::Remove { entity, id } => {
                self.sql()?.delete_by_id(entity, id).map(SessionReply::Removed)
            }
            SessionCall::CreateQuery { entity, query } => {
                let sql = self.sql()?;
                match query {
                    EntityQuery::All { window } => {
                        sql.select_all(entity, window).map(SessionReply::Rows)
                    }
                    EntityQuery::Count => sql.count_rows(entity).map(SessionReply::Count),
                    EntityQuery::Custom(spec) => sql.run_query(spec).map(SessionReply::Rows),
                }
            }
        }
    }
}
