use std::{
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    config::INVALID_LSN,
    storage::{page::Rid, table::TableHeap, tuple::Tuple},
    types::{TxnID, LSN},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WriteType {
    Insert,
    Delete,
    Update,
}

/// One logical modification remembered for commit finalization and abort
/// rollback. `tuple` is the pre-image for deletes and updates and `None`
/// for inserts (the post-image is on the page).
pub struct WriteRecord {
    pub wtype: WriteType,
    pub rid: Rid,
    pub tuple: Option<Tuple>,
    pub table: Arc<TableHeap>,
}

/// A running transaction. All fields sit behind interior mutability so the
/// same `Arc<Transaction>` can be held by the registry and by the thread
/// driving it.
pub struct Transaction {
    id: TxnID,
    state: Mutex<TransactionState>,
    prev_lsn: AtomicI32,
    write_set: Mutex<Vec<WriteRecord>>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
}

impl Transaction {
    pub fn new(id: TxnID) -> Self {
        Self {
            id,
            state: Mutex::new(TransactionState::Growing),
            prev_lsn: AtomicI32::new(INVALID_LSN),
            write_set: Mutex::new(Vec::new()),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> TxnID {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn prev_lsn(&self) -> LSN {
        self.prev_lsn.load(Ordering::SeqCst)
    }

    pub fn set_prev_lsn(&self, lsn: LSN) {
        self.prev_lsn.store(lsn, Ordering::SeqCst);
    }

    pub fn add_write_record(&self, record: WriteRecord) {
        self.write_set.lock().unwrap().push(record);
    }

    /// Drain the write set for commit/abort processing.
    pub fn take_write_set(&self) -> Vec<WriteRecord> {
        std::mem::replace(&mut *self.write_set.lock().unwrap(), Vec::new())
    }

    pub fn write_set_len(&self) -> usize {
        self.write_set.lock().unwrap().len()
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().unwrap().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        // an upgraded lock leaves the shared set
        self.shared_lock_set.lock().unwrap().remove(&rid);
        self.exclusive_lock_set.lock().unwrap().insert(rid);
    }

    pub fn is_shared_locked(&self, rid: &Rid) -> bool {
        self.shared_lock_set.lock().unwrap().contains(rid)
    }

    pub fn is_exclusive_locked(&self, rid: &Rid) -> bool {
        self.exclusive_lock_set.lock().unwrap().contains(rid)
    }

    /// Every RID this transaction holds any lock on.
    pub fn locked_rids(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = Vec::new();
        rids.extend(self.shared_lock_set.lock().unwrap().iter().cloned());
        rids.extend(self.exclusive_lock_set.lock().unwrap().iter().cloned());
        rids
    }

    pub fn clear_lock_sets(&self) {
        self.shared_lock_set.lock().unwrap().clear();
        self.exclusive_lock_set.lock().unwrap().clear();
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "txn_{}", self.id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
