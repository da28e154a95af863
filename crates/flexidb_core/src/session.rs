//! Unit-of-work contracts consumed by repositories.
//!
//! # Responsibility
//! - Define the statically typed session surface (`UnitOfWork`).
//! - Define the object-safe dynamic surface (`DynSession`) and its call set.
//! - Define how repositories obtain sessions (`SessionProvider`,
//!   `DynSessionProvider`).
//!
//! # Invariants
//! - A session is owned by exactly one repository call and closed once.
//! - `close` consumes the session; nothing can use it afterwards.

use crate::db::PersistResult;
use crate::driver::{Capability, CapabilitySet};
use crate::model::{Entity, EntityDescriptor, Record, Value};
use crate::query::{QuerySpec, Window};
use crate::repo::{DynDispatch, RepoResult};
use std::sync::Arc;

/// Transaction control shared by both session flavours.
pub trait Transactional {
    fn begin(&mut self) -> PersistResult<()>;

    fn commit(&mut self) -> PersistResult<()>;

    fn rollback(&mut self) -> PersistResult<()>;

    /// Whether the engine still reports an open transaction.
    fn is_active(&self) -> bool;

    fn close(self) -> PersistResult<()>
    where
        Self: Sized;
}

/// Statically dispatched entity operations on one open session.
pub trait UnitOfWork: Transactional {
    /// Inserts a new row and writes the allocated id back into `entity`.
    fn persist<E: Entity>(&mut self, entity: &mut E) -> PersistResult<()>;

    /// Inserts or updates the row keyed by the entity id.
    fn merge<E: Entity>(&mut self, entity: &E) -> PersistResult<()>;

    fn get<E: Entity>(&mut self, id: &E::Id) -> PersistResult<Option<E>>;

    /// Returns whether a row was deleted.
    fn remove<E: Entity>(&mut self, id: &E::Id) -> PersistResult<bool>;

    /// Rows ordered by id, optionally windowed.
    fn list<E: Entity>(&mut self, window: Option<Window>) -> PersistResult<Vec<E>>;

    fn count<E: Entity>(&mut self) -> PersistResult<u64>;

    fn query<E: Entity>(&mut self, spec: &QuerySpec) -> PersistResult<Vec<E>>;
}

/// Source of statically typed sessions.
pub trait SessionProvider: Send + Sync {
    type Session: UnitOfWork;

    fn open_session(&self) -> RepoResult<Self::Session>;

    fn is_initialized(&self) -> bool;
}

impl<T: SessionProvider + ?Sized> SessionProvider for Arc<T> {
    type Session = T::Session;

    fn open_session(&self) -> RepoResult<Self::Session> {
        (**self).open_session()
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }
}

/// Insert or merge semantics for `SessionCall::Save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Insert,
    Merge,
}

/// Row selection for `SessionCall::CreateQuery`.
#[derive(Debug, Clone, Copy)]
pub enum EntityQuery<'a> {
    All { window: Option<Window> },
    Count,
    Custom(&'a QuerySpec),
}

/// One operation requested through the dynamic surface.
#[derive(Debug, Clone, Copy)]
pub enum SessionCall<'a> {
    BeginTransaction,
    Commit,
    Rollback,
    Close,
    Save {
        entity: &'static EntityDescriptor,
        record: &'a Record,
        id: Option<&'a Value>,
        mode: SaveMode,
    },
    Get {
        entity: &'static EntityDescriptor,
        id: &'a Value,
    },
    Remove {
        entity: &'static EntityDescriptor,
        id: &'a Value,
    },
    CreateQuery {
        entity: &'static EntityDescriptor,
        query: EntityQuery<'a>,
    },
}

impl SessionCall<'_> {
    /// Capability an engine must declare to accept this call.
    pub fn capability(&self) -> Capability {
        match self {
            Self::BeginTransaction => Capability::BeginTransaction,
            Self::Commit => Capability::Commit,
            Self::Rollback => Capability::Rollback,
            Self::Close => Capability::Close,
            Self::Save { .. } => Capability::Save,
            Self::Get { .. } => Capability::Get,
            Self::Remove { .. } => Capability::Remove,
            Self::CreateQuery { .. } => Capability::CreateQuery,
        }
    }
}

/// Result shape of one dynamic call.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionReply {
    Done,
    /// Identifier of the saved row.
    Saved(Value),
    Row(Option<Record>),
    Rows(Vec<Record>),
    Count(u64),
    Removed(bool),
}

/// Object-safe session reached by uniform invocation.
pub trait DynSession: Send {
    fn driver_id(&self) -> &str;

    /// Operations this session can serve.
    fn capabilities(&self) -> CapabilitySet;

    fn transaction_active(&self) -> bool;

    fn invoke(&mut self, call: SessionCall<'_>) -> PersistResult<SessionReply>;
}

/// Source of dynamically dispatched sessions.
pub trait DynSessionProvider: Send + Sync {
    fn open_dyn_session(&self) -> RepoResult<DynDispatch>;

    fn is_initialized(&self) -> bool;
}

impl<T: DynSessionProvider + ?Sized> DynSessionProvider for Arc<T> {
    fn open_dyn_session(&self) -> RepoResult<DynDispatch> {
        (**self).open_dyn_session()
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }
}
