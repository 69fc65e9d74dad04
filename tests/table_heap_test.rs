mod test_utils;

use rand::prelude::*;

use minirel::{storage::tuple::Cell, utils::HandyRwLock, Database, Tuple};

use crate::test_utils::{db_path, int_row, reopen, setup, two_int_schema};

/// Every inserted tuple reads back identically through its RID until it is
/// touched again.
#[test]
fn test_insert_then_get() {
    let db = setup("heap_insert_get.db");
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", two_int_schema(), &txn)
        .unwrap();

    let mut rids = Vec::new();
    for i in 0..10 {
        let tuple = Tuple::new(int_row(i, i * 2));
        rids.push(table.table().insert_tuple(&tuple, &txn).unwrap());
    }

    for (i, rid) in rids.iter().enumerate() {
        let tuple = table.table().get_tuple(*rid, &txn).unwrap().unwrap();
        assert_eq!(tuple.cell(0), &Cell::Integer(i as i32));
        assert_eq!(tuple.cell(1), &Cell::Integer(i as i32 * 2));
    }

    db.txn_manager().commit(&txn).unwrap();
}

/// A dataset far larger than one page comes back in insertion (RID) order,
/// even though the scan crosses page boundaries.
#[test]
fn test_multi_page_scan_in_rid_order() {
    let db = setup("heap_multi_page.db");
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", two_int_schema(), &txn)
        .unwrap();

    let mut rng = rand::thread_rng();
    let mut expected: Vec<(i32, i32)> = Vec::new();
    for _ in 0..2000 {
        let a = rng.gen_range(i32::MIN, i32::MAX);
        let b = rng.gen_range(i32::MIN, i32::MAX);
        expected.push((a, b));
        table
            .table()
            .insert_tuple(&Tuple::new(int_row(a, b)), &txn)
            .unwrap();
    }
    db.txn_manager().commit(&txn).unwrap();

    let scanned: Vec<(i32, i32)> = table
        .table()
        .iterator()
        .map(|(_, tuple)| match (tuple.cell(0), tuple.cell(1)) {
            (Cell::Integer(a), Cell::Integer(b)) => (*a, *b),
            _ => panic!("unexpected cell types"),
        })
        .collect();

    assert_eq!(scanned, expected);
}

/// Inserts followed by a full flush survive a reopen byte for byte.
#[test]
fn test_flush_reopen_rescan() {
    let name = "heap_reopen.db";
    let expected: Vec<(i32, i32)> = (0..600).map(|i| (i, i + 1)).collect();

    {
        let db = setup(name);
        let txn = db.txn_manager().begin(None);
        let table = db
            .catalog()
            .create_table("t", two_int_schema(), &txn)
            .unwrap();
        for &(a, b) in &expected {
            table
                .table()
                .insert_tuple(&Tuple::new(int_row(a, b)), &txn)
                .unwrap();
        }
        db.txn_manager().commit(&txn).unwrap();
        db.shutdown().unwrap();
    }

    let db = reopen(name);
    let table = db.catalog().get_table_by_name("t").unwrap();
    let scanned: Vec<(i32, i32)> = table
        .table()
        .iterator()
        .map(|(_, tuple)| match (tuple.cell(0), tuple.cell(1)) {
            (Cell::Integer(a), Cell::Integer(b)) => (*a, *b),
            _ => panic!("unexpected cell types"),
        })
        .collect();
    assert_eq!(scanned, expected);
}

/// The iterator re-pins per advance: with a pool much smaller than the
/// table, a full scan forces evictions of pages the iterator has visited
/// and pages it will visit, and still sees every tuple exactly once.
#[test]
fn test_iterator_survives_eviction() {
    let name = "heap_small_pool.db";
    let path = db_path(name);
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(path.with_extension("log"));

    let db = Database::with_pool_size(&path, 4).unwrap();
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", two_int_schema(), &txn)
        .unwrap();

    let rows = 1500;
    for i in 0..rows {
        table
            .table()
            .insert_tuple(&Tuple::new(int_row(i, i)), &txn)
            .unwrap();
    }
    db.txn_manager().commit(&txn).unwrap();

    // two interleaved scans keep stealing each other's pages
    let mut scan_1 = table.table().iterator();
    let mut scan_2 = table.table().iterator();
    let mut count_1 = 0;
    let mut count_2 = 0;
    loop {
        let step_1 = scan_1.next();
        let step_2 = scan_2.next();
        if step_1.is_some() {
            count_1 += 1;
        }
        if step_2.is_some() {
            count_2 += 1;
        }
        if step_1.is_none() && step_2.is_none() {
            break;
        }
    }
    assert_eq!(count_1, rows);
    assert_eq!(count_2, rows);

    // no leaked pins: every chain page is down to the single pin we take
    // to look at it. The chain links must also be intact both ways.
    let mut prev_id = -1;
    let mut page_id = table.table().first_page_id();
    while page_id != -1 {
        let frame = db.buffer_pool().fetch_page(page_id).unwrap();
        assert_eq!(frame.rl().pin_count(), 1, "leaked pin on page {}", page_id);
        let (prev, next) = {
            let table_page = minirel::storage::page::TablePage::new(frame);
            (table_page.prev_page_id(), table_page.next_page_id())
        };
        assert_eq!(prev, prev_id, "broken back-link on page {}", page_id);
        db.buffer_pool().unpin_page(page_id, false).unwrap();
        prev_id = page_id;
        page_id = next;
    }
    assert!(prev_id != table.table().first_page_id(), "table never grew");
}

/// An update that outgrows its page moves the tuple and hands back a new
/// RID; the old RID stops resolving.
#[test]
fn test_update_relocates_when_page_is_full() {
    let db = setup("heap_relocate.db");
    let txn = db.txn_manager().begin(None);
    let table = db
        .catalog()
        .create_table("t", test_utils::int_varchar_schema(), &txn)
        .unwrap();

    // two fat rows leave no room to grow in place
    let fat = "x".repeat(1900);
    let rid_1 = table
        .table()
        .insert_tuple(
            &Tuple::new(vec![Cell::Integer(1), Cell::Varchar(fat.clone())]),
            &txn,
        )
        .unwrap();
    let _rid_2 = table
        .table()
        .insert_tuple(
            &Tuple::new(vec![Cell::Integer(2), Cell::Varchar(fat.clone())]),
            &txn,
        )
        .unwrap();

    let bigger = "y".repeat(2500);
    let new_tuple = Tuple::new(vec![Cell::Integer(1), Cell::Varchar(bigger.clone())]);
    let new_rid = table.table().update_tuple(&new_tuple, rid_1, &txn).unwrap();

    assert_ne!(new_rid, rid_1);
    assert!(table.table().get_tuple(rid_1, &txn).unwrap().is_none());
    assert_eq!(
        table.table().get_tuple(new_rid, &txn).unwrap().unwrap(),
        new_tuple
    );

    // exactly one version of the row is visible
    let count = table
        .table()
        .iterator()
        .filter(|(_, t)| t.cell(0) == &Cell::Integer(1))
        .count();
    assert_eq!(count, 1);

    db.txn_manager().commit(&txn).unwrap();
}
