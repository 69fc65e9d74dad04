use std::sync::{Arc, Mutex, RwLock, Weak};

use log::debug;

use crate::{
    buffer::BufferPoolManager,
    catalog::Schema,
    config::{INVALID_LSN, INVALID_PAGE_ID},
    error::DbError,
    index::HashIndex,
    recovery::{LogManager, LogRecord},
    storage::{
        page::{Rid, TablePage, MAX_TUPLE_SIZE},
        table::TableIterator,
        tuple::Tuple,
    },
    transaction::{LockManager, Transaction, WriteRecord, WriteType},
    types::{DbResult, PageID},
    utils::HandyRwLock,
};

/// A table's tuples: a doubly linked chain of slotted pages rooted at
/// `first_page_id`.
///
/// The heap is the transactional write surface. Every modification takes
/// the RID's exclusive lock, goes through the slotted page (which writes
/// the WAL record), lands in the transaction's write set, and keeps the
/// column indexes in sync.
pub struct TableHeap {
    pub(crate) first_page_id: PageID,
    pub(crate) bpm: Arc<BufferPoolManager>,
    pub(crate) log_manager: Arc<LogManager>,
    pub(crate) lock_manager: Arc<LockManager>,
    pub(crate) schema: Arc<Schema>,
    indexes: RwLock<Vec<Option<Arc<HashIndex>>>>,
    /// Write records point back at their heap; the weak self-reference is
    /// how `&self` methods mint those `Arc`s.
    self_ref: RwLock<Weak<TableHeap>>,
    /// Serializes chain growth so two racing inserts cannot both link a
    /// fresh page behind the same tail.
    extend_latch: Mutex<()>,
}

impl TableHeap {
    /// Create an empty heap: allocate the first page and log its birth.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        log_manager: Arc<LogManager>,
        lock_manager: Arc<LockManager>,
        schema: Arc<Schema>,
        txn: &Transaction,
    ) -> Result<Arc<Self>, DbError> {
        let frame = bpm.new_page()?;
        let first_page_id = frame.rl().id();

        let table_page = TablePage::new(frame);
        table_page.init(INVALID_PAGE_ID);
        Self::log_new_page(&log_manager, &table_page, txn, INVALID_PAGE_ID);
        bpm.unpin_page(first_page_id, true)?;

        Ok(Self::into_shared(Self {
            first_page_id,
            bpm,
            log_manager,
            lock_manager,
            indexes: RwLock::new(vec![None; schema.len()]),
            schema,
            self_ref: RwLock::new(Weak::new()),
            extend_latch: Mutex::new(()),
        }))
    }

    /// Re-attach a heap that already exists on disk, e.g. after a restart.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        log_manager: Arc<LogManager>,
        lock_manager: Arc<LockManager>,
        schema: Arc<Schema>,
        first_page_id: PageID,
    ) -> Arc<Self> {
        Self::into_shared(Self {
            first_page_id,
            bpm,
            log_manager,
            lock_manager,
            indexes: RwLock::new(vec![None; schema.len()]),
            schema,
            self_ref: RwLock::new(Weak::new()),
            extend_latch: Mutex::new(()),
        })
    }

    fn into_shared(heap: TableHeap) -> Arc<TableHeap> {
        let heap = Arc::new(heap);
        *heap.self_ref.wl() = Arc::downgrade(&heap);
        heap
    }

    fn self_arc(&self) -> Arc<TableHeap> {
        self.self_ref
            .rl()
            .upgrade()
            .expect("table heap detached from its Arc")
    }

    pub fn first_page_id(&self) -> PageID {
        self.first_page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn set_index(&self, col_index: usize, index: Arc<HashIndex>) {
        self.indexes.wl()[col_index] = Some(index);
    }

    pub fn index(&self, col_index: usize) -> Option<Arc<HashIndex>> {
        self.indexes.rl().get(col_index).and_then(|i| i.clone())
    }

    /// Insert into the last page of the chain, growing it when the tuple
    /// does not fit. Returns the new tuple's RID.
    pub fn insert_tuple(&self, tuple: &Tuple, txn: &Transaction) -> Result<Rid, DbError> {
        let data = tuple.to_bytes();
        if data.len() > MAX_TUPLE_SIZE {
            // would never fit, even on an empty page
            return Err(DbError::PageFull);
        }

        let mut page_id = self.last_page_id()?;
        let rid = loop {
            let table_page = self.fetch_table_page(page_id)?;
            match table_page.insert_tuple(&data, txn, &self.log_manager) {
                Ok(rid) => {
                    self.bpm.unpin_page(page_id, true)?;
                    break rid;
                }
                Err(DbError::PageFull) => {
                    // Serialize growth: a racing insert may have linked a
                    // page behind this tail already.
                    let guard = self.extend_latch.lock().unwrap();
                    let next = table_page.next_page_id();
                    if next == INVALID_PAGE_ID {
                        let next_id = self.append_page(&table_page, txn)?;
                        drop(guard);
                        self.bpm.unpin_page(page_id, true)?;
                        page_id = next_id;
                    } else {
                        drop(guard);
                        self.bpm.unpin_page(page_id, false)?;
                        page_id = next;
                    }
                }
                Err(e) => {
                    self.bpm.unpin_page(page_id, false)?;
                    return Err(e);
                }
            }
        };

        self.lock_manager.lock_exclusive(txn, rid)?;
        txn.add_write_record(WriteRecord {
            wtype: WriteType::Insert,
            rid,
            tuple: None,
            table: self.self_arc(),
        });
        self.index_insert(tuple, rid)?;

        debug!("{} inserted {} at {}", txn, tuple, rid);
        Ok(rid)
    }

    /// Update in place when the page can hold the new version, otherwise
    /// mark-delete and re-insert elsewhere. Returns the tuple's RID after
    /// the update, which changes only on the re-insert path.
    pub fn update_tuple(
        &self,
        new_tuple: &Tuple,
        rid: Rid,
        txn: &Transaction,
    ) -> Result<Rid, DbError> {
        self.lock_manager.lock_exclusive(txn, rid)?;

        let table_page = self.fetch_table_page(rid.page_id)?;
        let old_data = match table_page.get_tuple_data(rid.slot) {
            Some(data) => data,
            None => {
                self.bpm.unpin_page(rid.page_id, false)?;
                return Err(DbError::TupleUpdateFailed(format!(
                    "no live tuple at {}",
                    rid
                )));
            }
        };
        let old_tuple = Tuple::from_bytes(&old_data, &self.schema);

        match table_page.update_tuple(&new_tuple.to_bytes(), rid, txn, &self.log_manager) {
            Ok(()) => {
                self.bpm.unpin_page(rid.page_id, true)?;
                txn.add_write_record(WriteRecord {
                    wtype: WriteType::Update,
                    rid,
                    tuple: Some(old_tuple.clone()),
                    table: self.self_arc(),
                });
                self.index_delete(&old_tuple, rid)?;
                self.index_insert(new_tuple, rid)?;
                Ok(rid)
            }
            Err(DbError::TupleUpdateFailed(_)) => {
                // Relocate: the mark-delete and the insert register their
                // own write records, so abort undoes the move pair by pair.
                self.bpm.unpin_page(rid.page_id, false)?;
                self.mark_delete(rid, txn)?;
                let new_rid = self.insert_tuple(new_tuple, txn)?;
                debug!("{} relocated {} to {}", txn, rid, new_rid);
                Ok(new_rid)
            }
            Err(e) => {
                self.bpm.unpin_page(rid.page_id, false)?;
                Err(e)
            }
        }
    }

    /// Set the tombstone and remember the intent; the physical removal
    /// happens when the transaction commits.
    pub fn mark_delete(&self, rid: Rid, txn: &Transaction) -> DbResult {
        self.lock_manager.lock_exclusive(txn, rid)?;

        let table_page = self.fetch_table_page(rid.page_id)?;
        let pre_image = match table_page.get_tuple_data(rid.slot) {
            Some(data) => data,
            None => {
                self.bpm.unpin_page(rid.page_id, false)?;
                return Err(DbError::internal(&format!("no live tuple at {}", rid)));
            }
        };

        let result = table_page.mark_delete(rid, txn, &self.log_manager);
        self.bpm.unpin_page(rid.page_id, result.is_ok())?;
        result?;

        let old_tuple = Tuple::from_bytes(&pre_image, &self.schema);
        txn.add_write_record(WriteRecord {
            wtype: WriteType::Delete,
            rid,
            tuple: Some(old_tuple.clone()),
            table: self.self_arc(),
        });
        self.index_delete(&old_tuple, rid)?;
        Ok(())
    }

    /// Commit path: physically reclaim a tombstoned tuple. The indexes
    /// were already cleaned when the delete was marked.
    pub fn apply_delete(&self, rid: Rid, txn: &Transaction) -> DbResult {
        let table_page = self.fetch_table_page(rid.page_id)?;
        let result = table_page.apply_delete(rid, txn, &self.log_manager);
        self.bpm.unpin_page(rid.page_id, result.is_ok())?;
        result
    }

    /// Abort path for an insert: drop its index entries, then physically
    /// remove the tuple.
    pub fn undo_insert(&self, rid: Rid, txn: &Transaction) -> DbResult {
        let table_page = self.fetch_table_page(rid.page_id)?;
        let data = table_page.get_tuple_data(rid.slot);
        let result = table_page.apply_delete(rid, txn, &self.log_manager);
        self.bpm.unpin_page(rid.page_id, result.is_ok())?;
        result?;

        if let Some(data) = data {
            let tuple = Tuple::from_bytes(&data, &self.schema);
            self.index_delete(&tuple, rid)?;
        }
        Ok(())
    }

    /// Abort path for a delete: clear the tombstone and restore the index
    /// entries.
    pub fn rollback_delete(&self, rid: Rid, txn: &Transaction) -> DbResult {
        let table_page = self.fetch_table_page(rid.page_id)?;
        let result = table_page.rollback_delete(rid, txn, &self.log_manager);
        let data = table_page.get_tuple_data(rid.slot);
        self.bpm.unpin_page(rid.page_id, result.is_ok())?;
        result?;

        if let Some(data) = data {
            let tuple = Tuple::from_bytes(&data, &self.schema);
            self.index_insert(&tuple, rid)?;
        }
        Ok(())
    }

    /// Abort path for an in-place update: write the pre-image back.
    pub fn rollback_update(&self, old_tuple: &Tuple, rid: Rid, txn: &Transaction) -> DbResult {
        let table_page = self.fetch_table_page(rid.page_id)?;
        let current = table_page.get_tuple_data(rid.slot);
        let result = table_page.update_tuple(&old_tuple.to_bytes(), rid, txn, &self.log_manager);
        self.bpm.unpin_page(rid.page_id, result.is_ok())?;
        result?;

        if let Some(current) = current {
            let current_tuple = Tuple::from_bytes(&current, &self.schema);
            self.index_delete(&current_tuple, rid)?;
        }
        self.index_insert(old_tuple, rid)?;
        Ok(())
    }

    /// Point read. `None` for tombstones and dead slots.
    pub fn get_tuple(&self, rid: Rid, txn: &Transaction) -> Result<Option<Tuple>, DbError> {
        self.lock_manager.lock_shared(txn, rid)?;

        let table_page = self.fetch_table_page(rid.page_id)?;
        let data = table_page.get_tuple_data(rid.slot);
        self.bpm.unpin_page(rid.page_id, false)?;

        Ok(data.map(|data| Tuple::from_bytes(&data, &self.schema)))
    }

    /// Forward scan over every live tuple in RID order.
    pub fn iterator(&self) -> TableIterator {
        TableIterator::new(self.self_arc())
    }

    pub(crate) fn fetch_table_page(&self, page_id: PageID) -> Result<TablePage, DbError> {
        let frame = self.bpm.fetch_page(page_id)?;
        Ok(TablePage::new(frame))
    }

    fn last_page_id(&self) -> Result<PageID, DbError> {
        let mut page_id = self.first_page_id;
        loop {
            let table_page = self.fetch_table_page(page_id)?;
            let next = table_page.next_page_id();
            self.bpm.unpin_page(page_id, false)?;
            if next == INVALID_PAGE_ID {
                return Ok(page_id);
            }
            page_id = next;
        }
    }

    /// Grow the chain by one page and link it behind `tail`.
    fn append_page(&self, tail: &TablePage, txn: &Transaction) -> Result<PageID, DbError> {
        let frame = self.bpm.new_page()?;
        let new_page_id = frame.rl().id();
        let tail_id = tail.page_id();

        let new_page = TablePage::new(frame);
        new_page.init(tail_id);
        tail.set_next_page_id(new_page_id);
        Self::log_new_page(&self.log_manager, &new_page, txn, tail_id);
        self.bpm.unpin_page(new_page_id, true)?;

        debug!("table grew: page {} linked after {}", new_page_id, tail_id);
        Ok(new_page_id)
    }

    fn log_new_page(
        log_manager: &LogManager,
        page: &TablePage,
        txn: &Transaction,
        prev_page_id: PageID,
    ) {
        let mut record = LogRecord::new_new_page(txn.id(), txn.prev_lsn(), prev_page_id);
        let lsn = log_manager.append_log_record(&mut record);
        if lsn != INVALID_LSN {
            txn.set_prev_lsn(lsn);
            page.set_page_lsn(lsn);
        }
    }

    fn index_insert(&self, tuple: &Tuple, rid: Rid) -> DbResult {
        let indexes = self.indexes.rl();
        for (col, index) in indexes.iter().enumerate() {
            if let Some(index) = index {
                index.insert_entry(tuple.cell(col), rid)?;
            }
        }
        Ok(())
    }

    fn index_delete(&self, tuple: &Tuple, rid: Rid) -> DbResult {
        let indexes = self.indexes.rl();
        for (col, index) in indexes.iter().enumerate() {
            if let Some(index) = index {
                index.delete_entry(tuple.cell(col), rid)?;
            }
        }
        Ok(())
    }
}
