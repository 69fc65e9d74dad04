mod test_utils;

use minirel::{types::TypeId, Column, DbError, Schema};

use crate::test_utils::{reopen, setup};

/// Create a table, shut the instance down, reopen, and check the catalog
/// came back from page 0 intact.
#[test]
fn test_catalog_reload() {
    let name = "catalog_reload.db";

    {
        let db = setup(name);
        let txn = db.txn_manager().begin(None);

        let schema = Schema::new(vec![
            Column::new("a", TypeId::Integer, false),
            Column::new("b", TypeId::Integer, true),
        ]);
        db.catalog().create_table("test_1", schema, &txn).unwrap();

        db.txn_manager().commit(&txn).unwrap();
        db.shutdown().unwrap();
    }

    let db = reopen(name);
    let metadata = db.catalog().get_table_by_oid(1).unwrap();
    assert_eq!(metadata.name(), "test_1");

    let column = metadata.schema().column(1);
    assert_eq!(column.name(), "b");
    assert_eq!(column.type_id(), TypeId::Integer);
    assert!(column.has_index());

    // the recovered table also carries a usable index object
    assert!(metadata.get_index(1).is_some());
    assert!(metadata.get_index(0).is_none());
}

#[test]
fn test_oids_are_dense_and_lookup_works() {
    let db = setup("catalog_oids.db");
    let txn = db.txn_manager().begin(None);

    let first = db
        .catalog()
        .create_table("first", test_utils::two_int_schema(), &txn)
        .unwrap();
    let second = db
        .catalog()
        .create_table("second", test_utils::int_varchar_schema(), &txn)
        .unwrap();

    assert_eq!(first.oid(), 1);
    assert_eq!(second.oid(), 2);

    assert_eq!(db.catalog().get_table_by_name("second").unwrap().oid(), 2);
    assert!(matches!(
        db.catalog().get_table_by_name("missing"),
        Err(DbError::TableNotFound(_))
    ));
    assert!(matches!(
        db.catalog().get_table_by_oid(9),
        Err(DbError::TableNotFound(_))
    ));

    db.txn_manager().commit(&txn).unwrap();
}

/// Several reopen cycles with schema changes in between; the registry must
/// accumulate, not reset.
#[test]
fn test_reload_preserves_across_multiple_restarts() {
    let name = "catalog_restarts.db";

    {
        let db = setup(name);
        let txn = db.txn_manager().begin(None);
        db.catalog()
            .create_table("alpha", test_utils::two_int_schema(), &txn)
            .unwrap();
        db.txn_manager().commit(&txn).unwrap();
        db.shutdown().unwrap();
    }

    {
        let db = reopen(name);
        assert_eq!(db.catalog().table_count(), 1);

        let txn = db.txn_manager().begin(None);
        db.catalog()
            .create_table("beta", test_utils::int_varchar_schema(), &txn)
            .unwrap();
        db.txn_manager().commit(&txn).unwrap();
        db.shutdown().unwrap();
    }

    let db = reopen(name);
    assert_eq!(db.catalog().table_count(), 2);
    assert_eq!(db.catalog().get_table_by_name("alpha").unwrap().oid(), 1);
    assert_eq!(db.catalog().get_table_by_name("beta").unwrap().oid(), 2);
}
