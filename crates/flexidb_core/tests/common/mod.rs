#![allow(dead_code)]

use flexidb_core::config::{
    DIALECT_KEY, DRIVER_KEY, ENTITY_PACKAGE_KEY, PASSWORD_KEY, SCHEMA_MODE_KEY, URL_KEY,
    USERNAME_KEY,
};
use flexidb_core::{
    ColumnDef, Entity, EntityCatalog, EntityDescriptor, IdStrategy, MapSettings,
    PersistResult, PersistenceConfig, Record, SqlType,
};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const PACKAGE: &str = "shop.model";

static CUSTOMERS: EntityDescriptor = EntityDescriptor {
    name: "Customer",
    table: "customers",
    id_column: "id",
    id_type: SqlType::Integer,
    id_strategy: IdStrategy::Generated,
    columns: &[
        ColumnDef::new("name", SqlType::Text),
        ColumnDef::new("email", SqlType::Text).unique(),
        ColumnDef::new("tier", SqlType::Integer).nullable(),
        ColumnDef::new("active", SqlType::Integer),
    ],
};

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    pub tier: Option<i64>,
    pub active: bool,
}

impl Customer {
    pub fn new(name: &str, email: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            email: email.to_string(),
            tier: None,
            active: true,
        }
    }
}

impl Entity for Customer {
    type Id = i64;

    fn descriptor() -> &'static EntityDescriptor {
        &CUSTOMERS
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("name", self.name.clone())
            .with("email", self.email.clone())
            .with("tier", self.tier)
            .with("active", self.active)
    }

    fn from_record(record: &Record) -> PersistResult<Self> {
        Ok(Self {
            id: Some(record.integer("id")?),
            name: record.text("name")?,
            email: record.text("email")?,
            tier: record.opt_integer("tier")?,
            active: record.boolean("active")?,
        })
    }
}

static TAGS: EntityDescriptor = EntityDescriptor {
    name: "Tag",
    table: "tags",
    id_column: "code",
    id_type: SqlType::Text,
    id_strategy: IdStrategy::Assigned,
    columns: &[ColumnDef::new("label", SqlType::Text)],
};

/// Entity with a caller-assigned text id.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub code: Option<String>,
    pub label: String,
}

impl Tag {
    pub fn new(code: &str, label: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            label: label.to_string(),
        }
    }
}

impl Entity for Tag {
    type Id = String;

    fn descriptor() -> &'static EntityDescriptor {
        &TAGS
    }

    fn id(&self) -> Option<String> {
        self.code.clone()
    }

    fn set_id(&mut self, id: String) {
        self.code = Some(id);
    }

    fn to_record(&self) -> Record {
        Record::new().with("label", self.label.clone())
    }

    fn from_record(record: &Record) -> PersistResult<Self> {
        Ok(Self {
            code: Some(record.text("code")?),
            label: record.text("label")?,
        })
    }
}

static ORDERS: EntityDescriptor = EntityDescriptor {
    name: "Order",
    table: "orders",
    id_column: "id",
    id_type: SqlType::Integer,
    id_strategy: IdStrategy::Generated,
    columns: &[
        ColumnDef::new("customer_id", SqlType::Integer),
        ColumnDef::new("amount", SqlType::Integer),
    ],
};

/// Entity whose table carries a deferred foreign key, checked at commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Option<i64>,
    pub customer_id: i64,
    pub amount: i64,
}

impl Entity for Order {
    type Id = i64;

    fn descriptor() -> &'static EntityDescriptor {
        &ORDERS
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("customer_id", self.customer_id)
            .with("amount", self.amount)
    }

    fn from_record(record: &Record) -> PersistResult<Self> {
        Ok(Self {
            id: Some(record.integer("id")?),
            customer_id: record.integer("customer_id")?,
            amount: record.integer("amount")?,
        })
    }
}

pub fn catalog() -> EntityCatalog {
    EntityCatalog::new()
        .with::<Customer>(PACKAGE)
        .with::<Tag>(PACKAGE)
        .with::<Order>(PACKAGE)
}

/// File-backed database in a private temporary directory.
pub struct TestDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flexidb.sqlite3");
        let db = Self { _dir: dir, path };

        // Created ahead of bootstrap so the deferred foreign key survives
        // `CREATE TABLE IF NOT EXISTS`.
        db.raw()
            .execute_batch(
                "CREATE TABLE orders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    customer_id INTEGER NOT NULL
                        REFERENCES customers(id) DEFERRABLE INITIALLY DEFERRED,
                    amount INTEGER NOT NULL
                );",
            )
            .unwrap();
        db
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    pub fn settings(&self) -> MapSettings {
        settings_for(&self.url(), "sqlite")
    }

    /// Initialized configuration over this database.
    pub fn config(&self) -> Arc<PersistenceConfig> {
        let config = PersistenceConfig::builder()
            .settings(self.settings())
            .catalog(catalog())
            .build_eager()
            .unwrap();
        Arc::new(config)
    }

    /// Direct connection for assertions outside the repository layer.
    pub fn raw(&self) -> Connection {
        Connection::open(&self.path).unwrap()
    }

    pub fn count_rows(&self, table: &str) -> i64 {
        self.raw()
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
                row.get(0)
            })
            .unwrap()
    }
}

pub fn settings_for(url: &str, driver: &str) -> MapSettings {
    MapSettings::new()
        .with(URL_KEY, url)
        .with(USERNAME_KEY, "shop")
        .with(PASSWORD_KEY, "")
        .with(DRIVER_KEY, driver)
        .with(DIALECT_KEY, "org.hibernate.community.dialect.SQLiteDialect")
        .with(ENTITY_PACKAGE_KEY, PACKAGE)
        .with(SCHEMA_MODE_KEY, "create")
}
