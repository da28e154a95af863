mod common;

use common::{catalog, settings_for, Customer, TestDb, PACKAGE};
use flexidb_core::config::{
    ENTITY_PACKAGE_KEY, PASSWORD_KEY, SCHEMA_MODE_KEY, SHOW_SQL_KEY, URL_KEY,
};
use flexidb_core::driver::{BuiltEngine, DriverRegistryError};
use flexidb_core::{
    ConfigError, Dialect, DriverProbe, DriverRegistry, EntityDescriptor, Lifecycle,
    PersistenceConfig, PersistenceDriver, PersistenceSettings, RepoError, Repository,
    SimpleRepository,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// SQLite driver that counts engine builds.
struct CountingDriver {
    inner: flexidb_core::db::SqliteDriver,
    builds: Arc<AtomicUsize>,
}

impl PersistenceDriver for CountingDriver {
    fn id(&self) -> &str {
        "counting"
    }

    fn probe(&self) -> DriverProbe {
        self.inner.probe()
    }

    fn supports_dialect(&self, dialect: Dialect) -> bool {
        self.inner.supports_dialect(dialect)
    }

    fn build(
        &self,
        settings: &PersistenceSettings,
        entities: &[&'static EntityDescriptor],
    ) -> Result<BuiltEngine, ConfigError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.inner.build(settings, entities)
    }
}

fn counting_registry(builds: &Arc<AtomicUsize>) -> DriverRegistry {
    let mut drivers = DriverRegistry::with_builtin();
    drivers
        .register(Arc::new(CountingDriver {
            inner: flexidb_core::db::SqliteDriver::new(),
            builds: Arc::clone(builds),
        }))
        .unwrap();
    drivers
}

#[test]
fn concurrent_initialization_builds_one_engine() {
    let db = TestDb::new();
    let builds = Arc::new(AtomicUsize::new(0));
    let config = Arc::new(
        PersistenceConfig::builder()
            .settings(settings_for(&db.url(), "counting"))
            .catalog(catalog())
            .drivers(counting_registry(&builds))
            .build(),
    );

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let config = Arc::clone(&config);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                config.initialize()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(config.lifecycle(), Lifecycle::Ready);
    assert_eq!(config.driver_id().as_deref(), Some("counting"));
}

#[test]
fn concurrent_repositories_share_one_engine() {
    let db = TestDb::new();
    let config = db.config();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let config = Arc::clone(&config);
            thread::spawn(move || {
                let repo = SimpleRepository::<Customer, _>::try_new(config).unwrap();
                for n in 0..5 {
                    let email = format!("w{worker}-{n}@example.com");
                    repo.save(Customer::new("worker", &email)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.count_rows("customers"), 20);
}

#[test]
fn concurrent_repositories_on_a_memory_database() {
    let config = Arc::new(
        PersistenceConfig::builder()
            .settings(settings_for("sqlite::memory:", "sqlite"))
            .catalog(catalog())
            .build_eager()
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let config = Arc::clone(&config);
            thread::spawn(move || {
                let repo = SimpleRepository::<Customer, _>::try_new(config).unwrap();
                for n in 0..25 {
                    let email = format!("m{worker}-{n}@example.com");
                    repo.save(Customer::new("worker", &email)).unwrap();
                    assert!(!repo.find_all().unwrap().is_empty());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let repo = SimpleRepository::<Customer, _>::try_new(config).unwrap();
    assert_eq!(repo.count().unwrap(), 200);
}

#[test]
fn repositories_before_initialization_report_uninitialized() {
    let db = TestDb::new();
    let config = Arc::new(
        PersistenceConfig::builder()
            .settings(db.settings())
            .catalog(catalog())
            .build(),
    );
    let repo = SimpleRepository::<Customer, _>::try_new(Arc::clone(&config)).unwrap();

    let err = repo.find_all().unwrap_err();
    assert!(matches!(err, RepoError::Uninitialized));
    assert_eq!(err.code(), "uninitialized");

    config.ensure_ready().unwrap();
    assert!(repo.find_all().unwrap().is_empty());
}

#[test]
fn missing_settings_are_named() {
    let db = TestDb::new();
    let mut settings = db.settings();
    settings.remove(URL_KEY);
    let config = PersistenceConfig::builder()
        .settings(settings)
        .catalog(catalog())
        .build();

    let err = config.initialize().unwrap_err();
    assert!(matches!(err, ConfigError::MissingSetting(key) if key == URL_KEY));
    assert!(err.to_string().contains(URL_KEY));

    // The failure sticks; the engine is never retried.
    assert!(matches!(
        config.initialize(),
        Err(ConfigError::InitializationFailed(_))
    ));
}

#[test]
fn empty_password_is_accepted_but_absent_is_not() {
    let db = TestDb::new();
    let config = PersistenceConfig::builder()
        .settings(db.settings().with(PASSWORD_KEY, ""))
        .catalog(catalog())
        .build();
    config.initialize().unwrap();

    let mut settings = db.settings();
    settings.remove(PASSWORD_KEY);
    let config = PersistenceConfig::builder()
        .settings(settings)
        .catalog(catalog())
        .build();
    assert!(matches!(
        config.initialize(),
        Err(ConfigError::MissingSetting(PASSWORD_KEY))
    ));
}

#[test]
fn invalid_flags_are_rejected() {
    let db = TestDb::new();
    let config = PersistenceConfig::builder()
        .settings(db.settings().with(SHOW_SQL_KEY, "sometimes"))
        .catalog(catalog())
        .build();
    assert!(matches!(
        config.initialize(),
        Err(ConfigError::InvalidSetting { key, .. }) if key == SHOW_SQL_KEY
    ));
}

#[test]
fn unknown_entity_package_fails() {
    let db = TestDb::new();
    let config = PersistenceConfig::builder()
        .settings(db.settings().with(ENTITY_PACKAGE_KEY, "shop.missing"))
        .catalog(catalog())
        .build();
    assert!(matches!(
        config.initialize(),
        Err(ConfigError::EntityPackageNotFound(package)) if package == "shop.missing"
    ));
}

#[test]
fn validate_mode_reports_missing_tables() {
    let db = TestDb::new();
    let config = PersistenceConfig::builder()
        .settings(db.settings().with(SCHEMA_MODE_KEY, "validate"))
        .catalog(catalog())
        .build();

    let err = config.initialize().unwrap_err();
    assert!(matches!(err, ConfigError::SchemaValidation(_)));
    assert!(err.to_string().contains("customers"));

    // After `create` ran once, `validate` succeeds on the same file.
    drop(db.config());
    let config = PersistenceConfig::builder()
        .settings(db.settings().with(SCHEMA_MODE_KEY, "validate"))
        .catalog(catalog())
        .build();
    config.initialize().unwrap();
}

#[test]
fn driver_aliases_resolve_to_sqlite() {
    let db = TestDb::new();
    let config = PersistenceConfig::builder()
        .settings(settings_for(&db.url(), "org.sqlite.JDBC"))
        .catalog(catalog())
        .build_eager()
        .unwrap();
    assert_eq!(config.driver_id().as_deref(), Some("sqlite"));
    assert_eq!(config.entity_count(), 3);
}

#[test]
fn duplicate_driver_ids_are_rejected() {
    let builds = Arc::new(AtomicUsize::new(0));
    let mut drivers = counting_registry(&builds);
    let err = drivers
        .register(Arc::new(CountingDriver {
            inner: flexidb_core::db::SqliteDriver::new(),
            builds,
        }))
        .unwrap_err();
    assert_eq!(err, DriverRegistryError::DuplicateDriverId("counting".to_string()));
    assert_eq!(drivers.len(), 2);
}

#[test]
fn in_memory_database_outlives_sessions() {
    let config = Arc::new(
        PersistenceConfig::builder()
            .settings(settings_for("sqlite::memory:", "sqlite"))
            .catalog(catalog())
            .build_eager()
            .unwrap(),
    );
    let repo = SimpleRepository::<Customer, _>::try_new(Arc::clone(&config)).unwrap();

    let saved = repo.save(Customer::new("Ada", "ada@example.com")).unwrap();
    let loaded = repo.find_by_id(&saved.id.unwrap()).unwrap();
    assert_eq!(loaded, Some(saved));
    assert_eq!(repo.count().unwrap(), 1);
}

#[test]
fn shutdown_closes_every_repository() {
    let db = TestDb::new();
    let config = db.config();
    let repo = SimpleRepository::<Customer, _>::try_new(Arc::clone(&config)).unwrap();
    repo.save(Customer::new("Ada", "ada@example.com")).unwrap();

    config.shutdown().unwrap();
    config.shutdown().unwrap();

    let err = repo.find_all().unwrap_err();
    assert!(matches!(err, RepoError::ShutDown));
    assert!(matches!(config.ensure_ready(), Err(ConfigError::ShutDown)));
    assert_eq!(db.count_rows("customers"), 1);
}

#[test]
fn package_listing_follows_registration() {
    let catalog = catalog();
    assert_eq!(catalog.packages(), vec![PACKAGE]);
    assert_eq!(catalog.scan(PACKAGE).unwrap().len(), 3);
}
