mod common;

use common::{Customer, Order, TestDb};
use flexidb_core::session::SaveMode;
use flexidb_core::{
    DynamicRepository, Entity, PersistError, RepoError, Repository, SimpleRepository, UnitOfWork,
};

fn batch_with_duplicate() -> Vec<Customer> {
    vec![
        Customer::new("Ada", "ada@example.com"),
        Customer::new("Alan", "alan@example.com"),
        Customer::new("Impostor", "ada@example.com"),
    ]
}

fn assert_no_lock_left(db: &TestDb) {
    // Fails with SQLITE_BUSY if any session still holds a write transaction.
    db.raw()
        .execute(
            "INSERT INTO tags (code, label) VALUES ('probe', 'probe');",
            [],
        )
        .unwrap();
}

#[test]
fn save_all_is_all_or_nothing_static() {
    let db = TestDb::new();
    let repo = SimpleRepository::<Customer, _>::try_new(db.config()).unwrap();

    let err = repo.save_all(batch_with_duplicate()).unwrap_err();
    assert!(matches!(
        err,
        RepoError::TransactionFailed {
            source: PersistError::Sqlite(_)
        }
    ));
    assert_eq!(db.count_rows("customers"), 0);
    assert_no_lock_left(&db);

    let saved = repo
        .save_all(vec![
            Customer::new("Ada", "ada@example.com"),
            Customer::new("Alan", "alan@example.com"),
        ])
        .unwrap();
    assert!(saved.iter().all(|customer| customer.id.is_some()));
    assert_eq!(db.count_rows("customers"), 2);
}

#[test]
fn save_all_is_all_or_nothing_dynamic() {
    let db = TestDb::new();
    let repo = DynamicRepository::<Customer, _>::try_new(db.config()).unwrap();

    let err = repo.save_all(batch_with_duplicate()).unwrap_err();
    assert_eq!(err.code(), "transaction_failed");
    assert_eq!(db.count_rows("customers"), 0);
    assert_no_lock_left(&db);
}

#[test]
fn failing_work_rolls_back_earlier_writes() {
    let db = TestDb::new();
    let repo = SimpleRepository::<Customer, _>::try_new(db.config()).unwrap();

    let err = repo
        .execute_query(|session| {
            let mut customer = Customer::new("Ada", "ada@example.com");
            session.persist(&mut customer)?;
            assert!(customer.id.is_some());
            Err::<(), _>(PersistError::InvalidData("abort after insert".to_string()))
        })
        .unwrap_err();

    assert!(matches!(
        err,
        RepoError::TransactionFailed {
            source: PersistError::InvalidData(_)
        }
    ));
    assert_eq!(db.count_rows("customers"), 0);
    assert_no_lock_left(&db);
}

#[test]
fn dynamic_work_failure_rolls_back() {
    let db = TestDb::new();
    let repo = DynamicRepository::<Customer, _>::try_new(db.config()).unwrap();

    let err = repo
        .execute_query(|dispatch| {
            let customer = Customer::new("Ada", "ada@example.com");
            dispatch.save(
                Customer::descriptor(),
                &customer.to_record(),
                None,
                SaveMode::Insert,
            )?;
            Err::<(), _>(PersistError::InvalidData("abort after insert".to_string()))
        })
        .unwrap_err();

    assert_eq!(err.code(), "transaction_failed");
    assert_eq!(db.count_rows("customers"), 0);
}

#[test]
fn commit_failure_is_reported_and_rolled_back() {
    let db = TestDb::new();
    let config = db.config();
    let orders = SimpleRepository::<Order, _>::try_new(config.clone()).unwrap();

    // The foreign key is deferred, so the insert succeeds and COMMIT fails.
    let err = orders
        .save(Order {
            id: None,
            customer_id: 404,
            amount: 10,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::TransactionFailed {
            source: PersistError::Sqlite(_)
        }
    ));
    assert_eq!(db.count_rows("orders"), 0);
    assert_no_lock_left(&db);

    let dynamic_orders = DynamicRepository::<Order, _>::try_new(config).unwrap();
    let err = dynamic_orders
        .save(Order {
            id: None,
            customer_id: 404,
            amount: 10,
        })
        .unwrap_err();
    assert_eq!(err.code(), "transaction_failed");
    assert_eq!(db.count_rows("orders"), 0);
}

#[test]
fn one_transaction_spans_the_whole_unit_of_work() {
    let db = TestDb::new();
    let repo = SimpleRepository::<Customer, _>::try_new(db.config()).unwrap();

    let order_id = repo
        .execute_query(|session| {
            let mut customer = Customer::new("Ada", "ada@example.com");
            session.persist(&mut customer)?;
            let mut order = Order {
                id: None,
                customer_id: customer.id.unwrap_or_default(),
                amount: 42,
            };
            session.persist(&mut order)?;
            Ok(order.id)
        })
        .unwrap();

    assert!(order_id.is_some());
    assert_eq!(db.count_rows("customers"), 1);
    assert_eq!(db.count_rows("orders"), 1);
}

#[test]
fn operations_after_failures_still_work() {
    let db = TestDb::new();
    let repo = SimpleRepository::<Customer, _>::try_new(db.config()).unwrap();
    repo.save(Customer::new("Ada", "ada@example.com")).unwrap();

    for _ in 0..5 {
        assert!(repo.save(Customer::new("Ada", "ada@example.com")).is_err());
    }

    let alan = repo.save(Customer::new("Alan", "alan@example.com")).unwrap();
    assert!(repo.exists_by_id(&alan.id.unwrap()).unwrap());
    assert_eq!(repo.count().unwrap(), 2);
}
