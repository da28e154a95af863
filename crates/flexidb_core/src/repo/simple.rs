//! Statically dispatched repository over a typed unit of work.

use super::transaction::run_in_transaction;
use super::{single_result, RepoError, RepoResult, Repository};
use crate::config::{global_config, PersistenceConfig};
use crate::db::PersistResult;
use crate::model::{Entity, EntityType, Value};
use crate::query::{Page, Pageable, QueryParameters, QuerySpec};
use crate::session::{SessionProvider, UnitOfWork};
use std::sync::Arc;

/// Repository for `E` whose sessions come from `P`.
pub struct SimpleRepository<E: Entity, P: SessionProvider> {
    entity_type: EntityType<E>,
    provider: P,
}

impl<E: Entity> SimpleRepository<E, Arc<PersistenceConfig>> {
    /// Binds to the process-wide configuration.
    ///
    /// # Errors
    /// - `MissingConfiguration` when none is installed.
    pub fn from_global() -> RepoResult<Self> {
        let config = global_config().ok_or_else(|| {
            RepoError::MissingConfiguration(
                "no global persistence configuration is installed".to_string(),
            )
        })?;
        Self::try_new(config)
    }
}

impl<E: Entity, P: SessionProvider> SimpleRepository<E, P> {
    /// Resolves the entity descriptor of `E` and binds `provider`.
    ///
    /// # Errors
    /// - `Configuration` when the descriptor is invalid.
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

    /// Runs `operation` against the open session inside one transaction.
    pub fn execute_query<T>(
        &self,
        operation: impl FnOnce(&mut P::Session) -> PersistResult<T>,
    ) -> RepoResult<T> {
        self.in_transaction("execute_query", operation)
    }

    pub fn count(&self) -> RepoResult<u64> {
        self.in_transaction("count", |session| session.count::<E>())
    }

    /// Deletes by the entity's id; an unsaved entity is a no-op.
    pub fn delete(&self, entity: &E) -> RepoResult<()> {
        match entity.id() {
            Some(id) => self.delete_by_id(&id),
            None => Ok(()),
        }
    }

    /// Runs `query` with `?` placeholders bound in order.
    pub fn find_by_positional(&self, query: &str, values: Vec<Value>) -> RepoResult<Vec<E>> {
        let spec = QuerySpec::positional(query, values);
        self.in_transaction("find_by_positional", |session| session.query::<E>(&spec))
    }

    fn in_transaction<T>(
        &self,
        operation: &'static str,
        work: impl FnOnce(&mut P::Session) -> PersistResult<T>,
    ) -> RepoResult<T> {
        run_in_transaction(
            self.entity_type.name(),
            operation,
            || self.provider.open_session(),
            work,
        )
    }
}

fn save_one<E: Entity, S: UnitOfWork>(session: &mut S, entity: &mut E) -> PersistResult<()> {
    match entity.id() {
        None => session.persist(entity),
        Some(_) => session.merge(entity),
    }
}

impl<E: Entity, P: SessionProvider> Repository<E> for SimpleRepository<E, P> {
    fn save(&self, mut entity: E) -> RepoResult<E> {
        self.in_transaction("save", move |session| {
            save_one(session, &mut entity)?;
            Ok(entity)
        })
    }

    fn find_by_id(&self, id: &E::Id) -> RepoResult<Option<E>> {
        self.in_transaction("find_by_id", |session| session.get::<E>(id))
    }

    fn find_all(&self) -> RepoResult<Vec<E>> {
        self.in_transaction("find_all", |session| session.list::<E>(None))
    }

    fn delete_by_id(&self, id: &E::Id) -> RepoResult<()> {
        self.in_transaction("delete_by_id", |session| {
            session.remove::<E>(id).map(|_| ())
        })
    }

    fn save_all(&self, mut entities: Vec<E>) -> RepoResult<Vec<E>> {
        self.in_transaction("save_all", move |session| {
            for entity in &mut entities {
                save_one(session, entity)?;
            }
            Ok(entities)
        })
    }

    fn find_by(&self, query: &str, params: &QueryParameters) -> RepoResult<Vec<E>> {
        let spec = QuerySpec::named(query, params.clone());
        self.in_transaction("find_by", |session| session.query::<E>(&spec))
    }

    fn find_one_by(&self, query: &str, params: &QueryParameters) -> RepoResult<Option<E>> {
        let spec = QuerySpec::named(query, params.clone()).limit(2);
        let entity = self.entity_type.name();
        self.in_transaction("find_one_by", |session| {
            single_result(entity, session.query::<E>(&spec)?)
        })
    }

    fn find_page(&self, pageable: Pageable) -> RepoResult<Page<E>> {
        self.in_transaction("find_page", |session| {
            let content = session.list::<E>(Some(pageable.window()))?;
            let total = session.count::<E>()?;
            Ok(Page::new(content, pageable, total))
        })
    }
}
