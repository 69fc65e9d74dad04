mod test_utils;

use std::sync::Arc;
use std::thread;

use minirel::{
    storage::tuple::Cell, transaction::TransactionState, Database, Tuple,
};

use crate::test_utils::{db_path, int_row, setup, two_int_schema, varchar_row};

fn live_count(table: &Arc<minirel::TableMetadata>) -> usize {
    table.table().iterator().count()
}

/// Committing a transaction with k deletes shrinks the live tuple count by
/// exactly k, because commit is what applies the tombstones physically.
#[test]
fn test_commit_applies_deletes() {
    let db = setup("txn_commit_deletes.db");
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", two_int_schema(), &txn)
        .unwrap();

    let mut rids = Vec::new();
    for i in 0..5 {
        rids.push(
            table
                .table()
                .insert_tuple(&Tuple::new(int_row(i, i)), &txn)
                .unwrap(),
        );
    }
    db.txn_manager().commit(&txn).unwrap();
    assert_eq!(live_count(&table), 5);

    let txn = db.txn_manager().begin(None);
    table.table().mark_delete(rids[1], &txn).unwrap();
    table.table().mark_delete(rids[3], &txn).unwrap();
    assert_eq!(txn.write_set_len(), 2);

    // tombstoned rows disappear from scans before the commit
    assert_eq!(live_count(&table), 3);

    db.txn_manager().commit(&txn).unwrap();
    assert_eq!(live_count(&table), 3);
    assert_eq!(txn.state(), TransactionState::Committed);

    // and the reclaimed slots are really gone
    let txn = db.txn_manager().begin(None);
    assert!(table.table().get_tuple(rids[1], &txn).unwrap().is_none());
    assert!(table.table().get_tuple(rids[3], &txn).unwrap().is_none());
    db.txn_manager().commit(&txn).unwrap();
}

/// Aborting a transaction that only inserted restores the live count, and
/// the freed slots are physically reusable by later inserts.
#[test]
fn test_abort_undoes_inserts_and_recycles_slots() {
    let db = setup("txn_abort_inserts.db");
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", two_int_schema(), &txn)
        .unwrap();

    table
        .table()
        .insert_tuple(&Tuple::new(int_row(1, 1)), &txn)
        .unwrap();
    table
        .table()
        .insert_tuple(&Tuple::new(int_row(2, 2)), &txn)
        .unwrap();
    db.txn_manager().commit(&txn).unwrap();

    let txn = db.txn_manager().begin(None);
    let doomed = table
        .table()
        .insert_tuple(&Tuple::new(int_row(3, 3)), &txn)
        .unwrap();
    assert_eq!(live_count(&table), 3);

    db.txn_manager().abort(&txn).unwrap();
    assert_eq!(live_count(&table), 2);
    assert_eq!(txn.state(), TransactionState::Aborted);

    // the slot the aborted insert occupied is handed out again
    let txn = db.txn_manager().begin(None);
    let reused = table
        .table()
        .insert_tuple(&Tuple::new(int_row(4, 4)), &txn)
        .unwrap();
    assert_eq!(reused, doomed);
    db.txn_manager().commit(&txn).unwrap();
}

#[test]
fn test_abort_undoes_delete() {
    let db = setup("txn_abort_delete.db");
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", two_int_schema(), &txn)
        .unwrap();
    let rid = table
        .table()
        .insert_tuple(&Tuple::new(int_row(7, 8)), &txn)
        .unwrap();
    db.txn_manager().commit(&txn).unwrap();

    let txn = db.txn_manager().begin(None);
    table.table().mark_delete(rid, &txn).unwrap();
    assert_eq!(live_count(&table), 0);
    db.txn_manager().abort(&txn).unwrap();

    assert_eq!(live_count(&table), 1);
    let txn = db.txn_manager().begin(None);
    let tuple = table.table().get_tuple(rid, &txn).unwrap().unwrap();
    assert_eq!(tuple.cell(0), &Cell::Integer(7));
    db.txn_manager().commit(&txn).unwrap();
}

#[test]
fn test_abort_undoes_in_place_update() {
    let db = setup("txn_abort_update.db");
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", test_utils::int_varchar_schema(), &txn)
        .unwrap();
    let rid = table
        .table()
        .insert_tuple(&Tuple::new(varchar_row(1, "original")), &txn)
        .unwrap();
    db.txn_manager().commit(&txn).unwrap();

    let txn = db.txn_manager().begin(None);
    let rid_after = table
        .table()
        .update_tuple(&Tuple::new(varchar_row(1, "new")), rid, &txn)
        .unwrap();
    // shrinking rewrite stays in place
    assert_eq!(rid_after, rid);
    db.txn_manager().abort(&txn).unwrap();

    let txn = db.txn_manager().begin(None);
    let tuple = table.table().get_tuple(rid, &txn).unwrap().unwrap();
    assert_eq!(tuple.cell(1), &Cell::Varchar("original".to_string()));
    db.txn_manager().commit(&txn).unwrap();
}

/// Four writer threads with a transaction each; every insert must survive
/// and every RID must be distinct.
#[test]
fn test_concurrent_inserts() {
    let name = "txn_concurrent.db";
    let path = db_path(name);
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(path.with_extension("log"));

    let db = Arc::new(Database::with_pool_size(&path, 32).unwrap());
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", two_int_schema(), &txn)
        .unwrap();
    db.txn_manager().commit(&txn).unwrap();

    let threads = 4;
    let rows_per_thread = 100;
    let (sender, receiver) = crossbeam::channel::unbounded();

    let mut handles = Vec::new();
    for worker in 0..threads {
        let db = Arc::clone(&db);
        let sender = sender.clone();
        handles.push(thread::spawn(move || {
            let table = db.catalog().get_table_by_name("t").unwrap();
            let txn = db.txn_manager().begin(None);
            for i in 0..rows_per_thread {
                let value = worker * rows_per_thread + i;
                let rid = table
                    .table()
                    .insert_tuple(&Tuple::new(int_row(value, worker)), &txn)
                    .unwrap();
                sender.send(rid).unwrap();
            }
            db.txn_manager().commit(&txn).unwrap();
        }));
    }
    drop(sender);

    for handle in handles {
        handle.join().unwrap();
    }

    let mut rids: Vec<_> = receiver.iter().collect();
    let total = (threads * rows_per_thread) as usize;
    assert_eq!(rids.len(), total);

    rids.sort_by_key(|rid| (rid.page_id, rid.slot));
    rids.dedup();
    assert_eq!(rids.len(), total, "duplicate rids handed out");

    let table = db.catalog().get_table_by_name("t").unwrap();
    assert_eq!(table.table().iterator().count(), total);
}

/// The global transaction latch: once the manager blocks, no transaction
/// is in flight and new ones wait for the resume.
#[test]
fn test_block_all_transactions_quiesces() {
    let db = Arc::new(setup("txn_quiesce.db"));
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", two_int_schema(), &txn)
        .unwrap();
    db.txn_manager().commit(&txn).unwrap();

    let db2 = Arc::clone(&db);
    let worker = thread::spawn(move || {
        let txn = db2.txn_manager().begin(None);
        let table = db2.catalog().get_table_by_name("t").unwrap();
        table
            .table()
            .insert_tuple(&Tuple::new(int_row(1, 1)), &txn)
            .unwrap();
        db2.txn_manager().commit(&txn).unwrap();
    });

    // blocks until the worker's transaction is done
    db.txn_manager().block_all_transactions();
    assert_eq!(db.txn_manager().active_txn_count(), 0);
    db.txn_manager().resume_transactions();

    worker.join().unwrap();
    assert_eq!(live_count(&table), 1);
}
