mod test_utils;

use rand::prelude::*;

use minirel::{config::PAGE_SIZE, utils::HandyRwLock, DbError};

use crate::test_utils::setup;

/// Binary page data survives arbitrary eviction traffic: write random
/// bytes into one page, churn the pool far past its capacity, read the
/// page back.
#[test]
fn test_binary_data_survives_churn() {
    let db = setup("bpm_binary_data.db");
    let bpm = db.buffer_pool();

    let mut rng = rand::thread_rng();
    let mut random_data = [0u8; PAGE_SIZE];
    rng.fill_bytes(&mut random_data);

    let page_id = {
        let page = bpm.new_page().unwrap();
        let mut guard = page.wl();
        guard.data.copy_from_slice(&random_data);
        guard.id()
    };
    bpm.unpin_page(page_id, true).unwrap();

    // push several pools' worth of pages through the frames
    for _ in 0..bpm.pool_size() * 3 {
        let page = bpm.new_page().unwrap();
        let id = page.rl().id();
        bpm.unpin_page(id, false).unwrap();
    }

    let page = bpm.fetch_page(page_id).unwrap();
    assert_eq!(&page.rl().data[..], &random_data[..]);
    bpm.unpin_page(page_id, false).unwrap();

    // every allocated page occupies its slot in the file
    let pages_allocated = 1 + 1 + bpm.pool_size() as u64 * 3;
    assert!(db.disk_manager().db_size().unwrap() >= pages_allocated * PAGE_SIZE as u64 / 2);
}

/// With every frame pinned the pool refuses new work until a pin drops.
#[test]
fn test_no_victim_until_unpin() {
    let db = setup("bpm_no_victim.db");
    let bpm = db.buffer_pool();

    // the catalog page occupies one frame unpinned; fill the rest
    let mut ids = Vec::new();
    while ids.len() < bpm.pool_size() {
        match bpm.new_page() {
            Ok(page) => ids.push(page.rl().id()),
            Err(DbError::NoVictim) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert!(matches!(bpm.fetch_page(ids[0] + 10_000), Err(DbError::NoVictim)));

    for id in &ids {
        bpm.unpin_page(*id, false).unwrap();
    }
    let page = bpm.new_page().unwrap();
    let id = page.rl().id();
    bpm.unpin_page(id, false).unwrap();
}
