//! Process-wide persistence bootstrap and session source.
//!
//! # Responsibility
//! - Turn settings plus the entity catalog into one ready engine.
//! - Serve typed and dynamic sessions from that engine.
//! - Offer one optional process-wide slot for repositories built without an
//!   explicit provider.
//!
//! # Invariants
//! - At most one engine build per successful initialization, even under
//!   concurrent callers.
//! - A failed initialization is sticky; later calls report it and never retry.
//! - After `shutdown`, no session is handed out again.

use super::{ConfigError, PersistenceSettings};
use crate::db::{PersistError, SqliteSession, SqliteSessionFactory};
use crate::driver::{
    BuiltEngine, Capability, CapabilitySet, DriverProbe, DriverRegistry, DynEngine,
};
use crate::model::{EntityCatalog, EntityDescriptor};
use crate::repo::{DynDispatch, RepoError, RepoResult};
use crate::session::{DynSessionProvider, SessionProvider};
use crate::settings::{EnvSettings, SettingsSource};
use log::{error, info, warn};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

static GLOBAL_CONFIG: OnceCell<Arc<PersistenceConfig>> = OnceCell::new();

/// Installs the process-wide configuration. Only the first call wins.
pub fn install_global(
    config: Arc<PersistenceConfig>,
) -> Result<Arc<PersistenceConfig>, ConfigError> {
    GLOBAL_CONFIG
        .set(Arc::clone(&config))
        .map_err(|_| ConfigError::AlreadyInstalled)?;
    Ok(config)
}

pub fn global_config() -> Option<Arc<PersistenceConfig>> {
    GLOBAL_CONFIG.get().cloned()
}

/// Session APIs offered by a ready engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVariant {
    /// Typed SQLite sessions plus the dynamic surface.
    Static,
    /// Only the capability-checked dynamic surface.
    DynamicOnly,
}

impl ApiVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::DynamicOnly => "dynamic_only",
        }
    }
}

/// Outcome of a successful initialization call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Ready,
    /// The optional driver is absent; persistence is switched off.
    Disabled { reason: String },
}

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
    Disabled,
    ShutDown,
}

/// Engine plus everything recorded about it at build time.
pub struct ReadyEngine {
    driver_id: String,
    settings: PersistenceSettings,
    entities: Vec<&'static EntityDescriptor>,
    engine: BuiltEngine,
    capabilities: CapabilitySet,
    variant: ApiVariant,
}

impl ReadyEngine {
    pub fn driver_id(&self) -> &str {
        &self.driver_id
    }

    pub fn settings(&self) -> &PersistenceSettings {
        &self.settings
    }

    pub fn entities(&self) -> &[&'static EntityDescriptor] {
        &self.entities
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn variant(&self) -> ApiVariant {
        self.variant
    }

    pub fn dynamic(&self) -> &Arc<dyn DynEngine> {
        &self.engine.dynamic
    }

    pub fn sqlite(&self) -> Option<&Arc<SqliteSessionFactory>> {
        self.engine.sqlite.as_ref()
    }
}

enum State {
    Uninitialized,
    Initializing,
    Ready(Arc<ReadyEngine>),
    Failed(String),
    Disabled(String),
    ShutDown,
}

enum Bootstrapped {
    Ready(ReadyEngine),
    Disabled(String),
}

/// Lazily initialized persistence configuration.
pub struct PersistenceConfig {
    settings: Box<dyn SettingsSource + Send + Sync>,
    catalog: EntityCatalog,
    drivers: DriverRegistry,
    state: RwLock<State>,
    init_lock: Mutex<()>,
}

impl PersistenceConfig {
    pub fn builder() -> PersistenceConfigBuilder {
        PersistenceConfigBuilder::default()
    }

    /// Initializes the engine; a missing driver is fatal.
    ///
    /// Returns immediately when already ready.
    ///
    /// # Errors
    /// - Any `ConfigError` from settings, driver selection, entity scanning or
    ///   engine build on the first attempt.
    /// - `InitializationFailed` on every later attempt after a failure.
    /// - `ShutDown` after `shutdown`.
    pub fn initialize(&self) -> Result<(), ConfigError> {
        self.bootstrap(false).map(|_| ())
    }

    /// Initializes the engine, treating an unregistered or unavailable driver
    /// as "persistence disabled" instead of an error.
    pub fn initialize_optional(&self) -> Result<Availability, ConfigError> {
        self.bootstrap(true)
    }

    /// Initializes on first use and returns the ready engine.
    pub fn ensure_ready(&self) -> Result<Arc<ReadyEngine>, ConfigError> {
        self.initialize()?;
        match &*self.read_state() {
            State::Ready(engine) => Ok(Arc::clone(engine)),
            State::ShutDown => Err(ConfigError::ShutDown),
            State::Failed(message) | State::Disabled(message) => {
                Err(ConfigError::InitializationFailed(message.clone()))
            }
            State::Uninitialized | State::Initializing => Err(ConfigError::InitializationFailed(
                "engine is not ready".to_string(),
            )),
        }
    }

    /// Closes the engine when open. Idempotent.
    pub fn shutdown(&self) -> Result<(), ConfigError> {
        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *self.write_state(), State::ShutDown);
        let State::Ready(engine) = previous else {
            return Ok(());
        };

        let dynamic = engine.dynamic();
        if dynamic.is_closed() {
            return Ok(());
        }
        match dynamic.close() {
            Ok(()) => {
                info!(
                    "event=persistence_shutdown module=config status=ok driver={}",
                    engine.driver_id()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=persistence_shutdown module=config status=error driver={} error={}",
                    engine.driver_id(),
                    err
                );
                Err(ConfigError::Engine(err))
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(&*self.read_state(), State::Ready(_))
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match &*self.read_state() {
            State::Uninitialized => Lifecycle::Uninitialized,
            State::Initializing => Lifecycle::Initializing,
            State::Ready(_) => Lifecycle::Ready,
            State::Failed(_) => Lifecycle::Failed,
            State::Disabled(_) => Lifecycle::Disabled,
            State::ShutDown => Lifecycle::ShutDown,
        }
    }

    /// `None` until an initialization call has settled.
    pub fn availability(&self) -> Option<Availability> {
        match &*self.read_state() {
            State::Ready(_) => Some(Availability::Ready),
            State::Disabled(reason) => Some(Availability::Disabled {
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    pub fn driver_id(&self) -> Option<String> {
        self.ready_engine().map(|engine| engine.driver_id().to_string())
    }

    pub fn entity_count(&self) -> usize {
        self.ready_engine()
            .map(|engine| engine.entities().len())
            .unwrap_or(0)
    }

    pub fn show_sql(&self) -> bool {
        self.ready_engine()
            .map(|engine| engine.settings().show_sql)
            .unwrap_or(false)
    }

    /// Opens a typed SQLite session.
    ///
    /// # Errors
    /// - `Uninitialized` before a successful initialization.
    /// - `Unavailable` when disabled or when the engine is dynamic-only.
    /// - `ShutDown` after `shutdown`.
    pub fn open_session(&self) -> RepoResult<SqliteSession> {
        let engine = self.ready()?;
        let factory = engine.sqlite().ok_or_else(|| {
            RepoError::Unavailable(format!(
                "driver `{}` offers no static session API",
                engine.driver_id()
            ))
        })?;
        factory.new_session().map_err(session_error)
    }

    /// Opens a capability-checked dynamic session.
    pub fn open_dyn_session(&self) -> RepoResult<DynDispatch> {
        let engine = self.ready()?;
        let capabilities = engine.capabilities();
        if !capabilities.contains(Capability::OpenSession) {
            return Err(RepoError::Session(PersistError::CapabilityMissing {
                driver: engine.driver_id().to_string(),
                capability: Capability::OpenSession,
            }));
        }
        let session = engine.dynamic().open().map_err(session_error)?;
        Ok(DynDispatch::new(session, capabilities))
    }

    fn ready(&self) -> RepoResult<Arc<ReadyEngine>> {
        match &*self.read_state() {
            State::Ready(engine) => Ok(Arc::clone(engine)),
            State::Disabled(reason) => Err(RepoError::Unavailable(reason.clone())),
            State::ShutDown => Err(RepoError::ShutDown),
            State::Uninitialized | State::Initializing | State::Failed(_) => {
                Err(RepoError::Uninitialized)
            }
        }
    }

    fn ready_engine(&self) -> Option<Arc<ReadyEngine>> {
        match &*self.read_state() {
            State::Ready(engine) => Some(Arc::clone(engine)),
            _ => None,
        }
    }

    fn bootstrap(&self, optional: bool) -> Result<Availability, ConfigError> {
        if let Some(settled) = self.settled(optional) {
            return settled;
        }

        let _guard = self.init_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(settled) = self.settled(optional) {
            return settled;
        }

        *self.write_state() = State::Initializing;
        let started_at = Instant::now();
        match self.build_engine(optional) {
            Ok(Bootstrapped::Ready(engine)) => {
                info!(
                    "event=persistence_init module=config status=ok driver={} variant={} capabilities={} entities={} duration_ms={}",
                    engine.driver_id(),
                    engine.variant().as_str(),
                    engine.capabilities(),
                    engine.entities().len(),
                    started_at.elapsed().as_millis()
                );
                *self.write_state() = State::Ready(Arc::new(engine));
                Ok(Availability::Ready)
            }
            Ok(Bootstrapped::Disabled(reason)) => {
                warn!(
                    "event=persistence_init module=config status=disabled duration_ms={} reason={}",
                    started_at.elapsed().as_millis(),
                    reason
                );
                *self.write_state() = State::Disabled(reason.clone());
                Ok(Availability::Disabled { reason })
            }
            Err(err) => {
                error!(
                    "event=persistence_init module=config status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                *self.write_state() = State::Failed(err.to_string());
                Err(err)
            }
        }
    }

    fn settled(&self, optional: bool) -> Option<Result<Availability, ConfigError>> {
        match &*self.read_state() {
            State::Ready(_) => Some(Ok(Availability::Ready)),
            State::Disabled(reason) if optional => Some(Ok(Availability::Disabled {
                reason: reason.clone(),
            })),
            State::Disabled(reason) | State::Failed(reason) => {
                Some(Err(ConfigError::InitializationFailed(reason.clone())))
            }
            State::ShutDown => Some(Err(ConfigError::ShutDown)),
            State::Uninitialized | State::Initializing => None,
        }
    }

    fn build_engine(&self, optional: bool) -> Result<Bootstrapped, ConfigError> {
        let settings = PersistenceSettings::from_source(self.settings.as_ref())?;

        let Some(driver) = self.drivers.resolve(&settings.driver) else {
            if optional {
                return Ok(Bootstrapped::Disabled(format!(
                    "driver `{}` is not registered",
                    settings.driver
                )));
            }
            return Err(ConfigError::UnknownDriver(settings.driver.clone()));
        };

        match driver.probe() {
            DriverProbe::Available { version } => info!(
                "event=driver_probe module=config status=ok driver={} version={}",
                driver.id(),
                version
            ),
            DriverProbe::Missing { reason } => {
                if optional {
                    return Ok(Bootstrapped::Disabled(format!(
                        "driver `{}` is unavailable: {reason}",
                        driver.id()
                    )));
                }
                return Err(ConfigError::DriverUnavailable {
                    driver: driver.id().to_string(),
                    reason,
                });
            }
        }

        if !driver.supports_dialect(settings.dialect) {
            return Err(ConfigError::UnsupportedDialect {
                dialect: settings.dialect,
                driver: driver.id().to_string(),
            });
        }

        let entities = self.catalog.scan(&settings.entity_package)?;
        let engine = driver.build(&settings, &entities)?;
        let capabilities = engine.dynamic.capabilities();
        let variant = if engine.sqlite.is_some() {
            ApiVariant::Static
        } else {
            ApiVariant::DynamicOnly
        };

        Ok(Bootstrapped::Ready(ReadyEngine {
            driver_id: driver.id().to_string(),
            settings,
            entities,
            engine,
            capabilities,
            variant,
        }))
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn session_error(err: PersistError) -> RepoError {
    match err {
        PersistError::EngineClosed => RepoError::ShutDown,
        other => RepoError::Session(other),
    }
}

impl SessionProvider for PersistenceConfig {
    type Session = SqliteSession;

    fn open_session(&self) -> RepoResult<SqliteSession> {
        PersistenceConfig::open_session(self)
    }

    fn is_initialized(&self) -> bool {
        PersistenceConfig::is_initialized(self)
    }
}

impl DynSessionProvider for PersistenceConfig {
    fn open_dyn_session(&self) -> RepoResult<DynDispatch> {
        PersistenceConfig::open_dyn_session(self)
    }

    fn is_initialized(&self) -> bool {
        PersistenceConfig::is_initialized(self)
    }
}

/// Assembles a `PersistenceConfig`.
pub struct PersistenceConfigBuilder {
    settings: Box<dyn SettingsSource + Send + Sync>,
    catalog: EntityCatalog,
    drivers: DriverRegistry,
}

impl Default for PersistenceConfigBuilder {
    fn default() -> Self {
        Self {
            settings: Box::new(EnvSettings),
            catalog: EntityCatalog::new(),
            drivers: DriverRegistry::with_builtin(),
        }
    }
}

impl PersistenceConfigBuilder {
    /// Settings source; defaults to process environment variables.
    pub fn settings(mut self, settings: impl SettingsSource + Send + Sync + 'static) -> Self {
        self.settings = Box::new(settings);
        self
    }

    pub fn catalog(mut self, catalog: EntityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Driver registry; defaults to the built-in SQLite driver.
    pub fn drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    /// Builds without touching the database.
    pub fn build(self) -> PersistenceConfig {
        PersistenceConfig {
            settings: self.settings,
            catalog: self.catalog,
            drivers: self.drivers,
            state: RwLock::new(State::Uninitialized),
            init_lock: Mutex::new(()),
        }
    }

    /// Builds and initializes immediately.
    pub fn build_eager(self) -> Result<PersistenceConfig, ConfigError> {
        let config = self.build();
        config.initialize()?;
        Ok(config)
    }
}
