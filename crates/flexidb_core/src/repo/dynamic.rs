//! Dynamically dispatched repository over capability-checked sessions.
//!
//! # Responsibility
//! - Reach any engine through the uniform `DynSession::invoke` surface.
//! - Reject calls the engine did not declare at build time.
//!
//! # Invariants
//! - Capability checks use the set recorded when the engine was built.
//! - Every reply is checked for the expected shape before it is used.

use super::transaction::run_in_transaction;
use super::{single_result, RepoError, RepoResult, Repository};
use crate::config::{global_config, PersistenceConfig};
use crate::db::{PersistError, PersistResult};
use crate::driver::{Capability, CapabilitySet};
use crate::model::{Entity, EntityDescriptor, EntityId, EntityType, Record, Value};
use crate::query::{Page, Pageable, QueryParameters, QuerySpec, Window};
use crate::session::{
    DynSession, DynSessionProvider, EntityQuery, SaveMode, SessionCall, SessionReply,
    Transactional,
};
use std::sync::Arc;

/// A dynamic session paired with the capability set of its engine.
pub struct DynDispatch {
    session: Box<dyn DynSession>,
    capabilities: CapabilitySet,
    driver_id: String,
}

impl DynDispatch {
    pub fn new(session: Box<dyn DynSession>, capabilities: CapabilitySet) -> Self {
        let driver_id = session.driver_id().to_string();
        Self {
            session,
            capabilities,
            driver_id,
        }
    }

    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Invokes `call` after checking the recorded capability set.
    ///
    /// # Errors
    /// - `CapabilityMissing` when the engine did not declare the capability.
    pub fn call(&mut self, call: SessionCall<'_>) -> PersistResult<SessionReply> {
        self.require(call.capability())?;
        self.session.invoke(call)
    }

    pub fn save(
        &mut self,
        entity: &'static EntityDescriptor,
        record: &Record,
        id: Option<&Value>,
        mode: SaveMode,
    ) -> PersistResult<Value> {
        match self.call(SessionCall::Save {
            entity,
            record,
            id,
            mode,
        })? {
            SessionReply::Saved(id) => Ok(id),
            _ => Err(unexpected(Capability::Save)),
        }
    }

    pub fn get(
        &mut self,
        entity: &'static EntityDescriptor,
        id: &Value,
    ) -> PersistResult<Option<Record>> {
        match self.call(SessionCall::Get { entity, id })? {
            SessionReply::Row(row) => Ok(row),
            _ => Err(unexpected(Capability::Get)),
        }
    }

    pub fn remove(&mut self, entity: &'static EntityDescriptor, id: &Value) -> PersistResult<bool> {
        match self.call(SessionCall::Remove { entity, id })? {
            SessionReply::Removed(removed) => Ok(removed),
            _ => Err(unexpected(Capability::Remove)),
        }
    }

    pub fn list(
        &mut self,
        entity: &'static EntityDescriptor,
        window: Option<Window>,
    ) -> PersistResult<Vec<Record>> {
        self.rows(entity, EntityQuery::All { window })
    }

    pub fn count(&mut self, entity: &'static EntityDescriptor) -> PersistResult<u64> {
        match self.call(SessionCall::CreateQuery {
            entity,
            query: EntityQuery::Count,
        })? {
            SessionReply::Count(total) => Ok(total),
            _ => Err(unexpected(Capability::CreateQuery)),
        }
    }

    pub fn query(
        &mut self,
        entity: &'static EntityDescriptor,
        spec: &QuerySpec,
    ) -> PersistResult<Vec<Record>> {
        self.rows(entity, EntityQuery::Custom(spec))
    }

    fn rows(
        &mut self,
        entity: &'static EntityDescriptor,
        query: EntityQuery<'_>,
    ) -> PersistResult<Vec<Record>> {
        match self.call(SessionCall::CreateQuery { entity, query })? {
            SessionReply::Rows(rows) => Ok(rows),
            _ => Err(unexpected(Capability::CreateQuery)),
        }
    }

    fn done(&mut self, call: SessionCall<'_>) -> PersistResult<()> {
        let capability = call.capability();
        match self.call(call)? {
            SessionReply::Done => Ok(()),
            _ => Err(unexpected(capability)),
        }
    }

    fn require(&self, capability: Capability) -> PersistResult<()> {
        if self.capabilities.contains(capability) {
            return Ok(());
        }
        Err(PersistError::CapabilityMissing {
            driver: self.driver_id.clone(),
            capability,
        })
    }
}

fn unexpected(capability: Capability) -> PersistError {
    PersistError::UnexpectedReply {
        operation: capability.as_str(),
    }
}

impl Transactional for DynDispatch {
    fn begin(&mut self) -> PersistResult<()> {
        self.done(SessionCall::BeginTransaction)
    }

    fn commit(&mut self) -> PersistResult<()> {
        self.done(SessionCall::Commit)
    }

    fn rollback(&mut self) -> PersistResult<()> {
        self.done(SessionCall::Rollback)
    }

    fn is_active(&self) -> bool {
        self.session.transaction_active()
    }

    /// Closes through the engine when it can; the session is released either
    /// way.
    fn close(mut self) -> PersistResult<()> {
        self.done(SessionCall::Close)
    }
}

/// Repository for `E` whose sessions are reached only by dynamic dispatch.
pub struct DynamicRepository<E: Entity, P: DynSessionProvider> {
    entity_type: EntityType<E>,
    provider: P,
}

impl<E: Entity> DynamicRepository<E, Arc<PersistenceConfig>> {
    /// Binds to the process-wide configuration.
    pub fn from_global() -> RepoResult<Self> {
        let config = global_config().ok_or_else(|| {
            RepoError::MissingConfiguration(
                "no global persistence configuration is installed".to_string(),
            )
        })?;
        Self::try_new(config)
    }
}

impl<E: Entity, P: DynSessionProvider> DynamicRepository<E, P> {
    pub fn try_new(provider: P) -> RepoResult<Self> {
        Ok(Self {
            entity_type: EntityType::resolve()?,
            provider,
        })
    }

    pub fn entity_type(&self) -> &EntityType<E> {
        &self.entity_type
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Runs `operation` against the open dispatch inside one transaction.
    pub fn execute_query<T>(
        &self,
        operation: impl FnOnce(&mut DynDispatch) -> PersistResult<T>,
    ) -> RepoResult<T> {
        self.in_transaction("execute_query", operation)
    }

    pub fn count(&self) -> RepoResult<u64> {
        let descriptor = self.entity_type.descriptor();
        self.in_transaction("count", |dispatch| dispatch.count(descriptor))
    }

    pub fn delete(&self, entity: &E) -> RepoResult<()> {
        match entity.id() {
            Some(id) => self.delete_by_id(&id),
            None => Ok(()),
        }
    }

    pub fn find_by_positional(&self, query: &str, values: Vec<Value>) -> RepoResult<Vec<E>> {
        let spec = QuerySpec::positional(query, values);
        self.query_entities("find_by_positional", &spec)
    }

    fn query_entities(&self, operation: &'static str, spec: &QuerySpec) -> RepoResult<Vec<E>> {
        let descriptor = self.entity_type.descriptor();
        self.in_transaction(operation, |dispatch| {
            to_entities(dispatch.query(descriptor, spec)?)
        })
    }

    fn in_transaction<T>(
        &self,
        operation: &'static str,
        work: impl FnOnce(&mut DynDispatch) -> PersistResult<T>,
    ) -> RepoResult<T> {
        run_in_transaction(
            self.entity_type.name(),
            operation,
            || self.provider.open_dyn_session(),
            work,
        )
    }
}

fn to_entities<E: Entity>(records: Vec<Record>) -> PersistResult<Vec<E>> {
    records.iter().map(E::from_record).collect()
}

fn save_one<E: Entity>(
    dispatch: &mut DynDispatch,
    descriptor: &'static EntityDescriptor,
    entity: &mut E,
) -> PersistResult<()> {
    let record = entity.to_record();
    match entity.id() {
        None => {
            let id = dispatch.save(descriptor, &record, None, SaveMode::Insert)?;
            entity.set_id(E::Id::from_value(id)?);
        }
        Some(id) => {
            dispatch.save(descriptor, &record, Some(&id.to_value()), SaveMode::Merge)?;
        }
    }
    Ok(())
}

impl<E: Entity, P: DynSessionProvider> Repository<E> for DynamicRepository<E, P> {
    fn save(&self, mut entity: E) -> RepoResult<E> {
        let descriptor = self.entity_type.descriptor();
        self.in_transaction("save", move |dispatch| {
            save_one(dispatch, descriptor, &mut entity)?;
            Ok(entity)
        })
    }

    fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        let descriptor = self.entity_type.descriptor();
        let id = id.to_value();
        self.in_transaction("find_by_id", |dispatch| {
            dispatch
                .get(descriptor, &id)?
                .map(|record| E::from_record(&record))
                .transpose()
        })
    }

    fn find_all(&self) -> RepoResult<Vec<E>> {
        let descriptor = self.entity_type.descriptor();
        self.in_transaction("find_all", |dispatch| {
            to_entities(dispatch.list(descriptor, None)?)
        })
    }

    fn delete_by_id(&self, id: &E::Id) -> RepoResult<()> {
        let descriptor = self.entity_type.descriptor();
        let id = id.to_value();
        self.in_transaction("delete_by_id", |dispatch| {
            dispatch.remove(descriptor, &id).map(|_| ())
        })
    }

    fn save_all(&self, mut entities: Vec<E>) -> RepoResult<Vec<E>> {
        let descriptor = self.entity_type.descriptor();
        self.in_transaction("save_all", move |dispatch| {
            for entity in &mut entities {
                save_one(dispatch, descriptor, entity)?;
            }
            Ok(entities)
        })
    }

    fn find_by(&self, query: &str, params: &QueryParameters) -> RepoResult<Vec<E>> {
        let spec = QuerySpec::named(query, params.clone());
        self.query_entities("find_by", &spec)
    }

    fn find_one_by(&self, query: &str, params: &QueryParameters) -> RepoResult<Option<E>> {
        let spec = QuerySpec::named(query, params.clone()).limit(2);
        let descriptor = self.entity_type.descriptor();
        self.in_transaction("find_one_by", |dispatch| {
            let rows = to_entities::<E>(dispatch.query(descriptor, &spec)?)?;
            single_result(descriptor.name, rows)
        })
    }

    fn find_page(&self, pageable: Pageable) -> RepoResult<Page<E>> {
        let descriptor = self.entity_type.descriptor();
        self.in_transaction("find_page", |dispatch| {
            let content = to_entities(dispatch.list(descriptor, Some(pageable.window()))?)?;
            let total = dispatch.count(descriptor)?;
            Ok(Page::new(content, pageable, total))
        })
    }
}
