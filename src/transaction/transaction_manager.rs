use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc, Mutex,
    },
};

use log::debug;

use crate::{
    config::INVALID_LSN,
    recovery::{LogManager, LogRecord, LogRecordType},
    transaction::{
        LockManager, ReaderWriterLatch, Transaction, TransactionState, WriteType,
    },
    types::{DbResult, TxnID},
};

/// Transaction lifecycle: id assignment, the registry of running
/// transactions, commit finalization and abort rollback.
///
/// Every running transaction holds the global latch in shared mode from
/// `begin` to `commit`/`abort`; checkpoint-like operations take it
/// exclusively to reach a moment with no transaction in flight.
pub struct TransactionManager {
    next_txn_id: AtomicI32,
    log_manager: Arc<LogManager>,
    lock_manager: Arc<LockManager>,
    global_txn_latch: ReaderWriterLatch,
    txn_map: Mutex<HashMap<TxnID, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(log_manager: Arc<LogManager>, lock_manager: Arc<LockManager>) -> Self {
        Self {
            next_txn_id: AtomicI32::new(1),
            log_manager,
            lock_manager,
            global_txn_latch: ReaderWriterLatch::new(),
            txn_map: Mutex::new(HashMap::new()),
        }
    }

    /// Start a transaction, or adopt `existing` if one is handed in.
    pub fn begin(&self, existing: Option<Arc<Transaction>>) -> Arc<Transaction> {
        self.global_txn_latch.rlock();

        let txn = existing.unwrap_or_else(|| {
            let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
            Arc::new(Transaction::new(id))
        });

        let mut record =
            LogRecord::new_txn(LogRecordType::Begin, txn.id(), txn.prev_lsn());
        let lsn = self.log_manager.append_log_record(&mut record);
        if lsn != INVALID_LSN {
            txn.set_prev_lsn(lsn);
        }

        self.txn_map
            .lock()
            .unwrap()
            .insert(txn.id(), Arc::clone(&txn));
        debug!("{} began", txn);
        txn
    }

    /// Commit: apply the deferred deletes in reverse write-set order,
    /// force the commit record to disk, then release locks and the global
    /// latch.
    pub fn commit(&self, txn: &Arc<Transaction>) -> DbResult {
        txn.set_state(TransactionState::Committed);

        let write_set = txn.take_write_set();
        for record in write_set.iter().rev() {
            if record.wtype == WriteType::Delete {
                record.table.apply_delete(record.rid, txn)?;
            }
        }

        let mut record =
            LogRecord::new_txn(LogRecordType::Commit, txn.id(), txn.prev_lsn());
        let lsn = self.log_manager.append_log_record(&mut record);
        if lsn != INVALID_LSN {
            txn.set_prev_lsn(lsn);
            self.log_manager.flush()?;
        }

        self.finish(txn);
        debug!("{} committed", txn);
        Ok(())
    }

    /// Abort: walk the write set backwards undoing every modification,
    /// write the abort record, then release locks and the global latch.
    pub fn abort(&self, txn: &Arc<Transaction>) -> DbResult {
        txn.set_state(TransactionState::Aborted);

        let write_set = txn.take_write_set();
        for record in write_set.iter().rev() {
            match record.wtype {
                WriteType::Insert => {
                    record.table.undo_insert(record.rid, txn)?;
                }
                WriteType::Delete => {
                    record.table.rollback_delete(record.rid, txn)?;
                }
                WriteType::Update => {
                    let pre_image = record.tuple.as_ref().ok_or_else(|| {
                        crate::error::DbError::internal(
                            "update write record lost its pre-image",
                        )
                    })?;
                    record.table.rollback_update(pre_image, record.rid, txn)?;
                }
            }
        }

        let mut record =
            LogRecord::new_txn(LogRecordType::Abort, txn.id(), txn.prev_lsn());
        let lsn = self.log_manager.append_log_record(&mut record);
        if lsn != INVALID_LSN {
            txn.set_prev_lsn(lsn);
        }

        self.finish(txn);
        debug!("{} aborted", txn);
        Ok(())
    }

    /// Quiesce the system: returns once no transaction is in flight, and
    /// keeps new ones from starting until `resume_transactions`.
    pub fn block_all_transactions(&self) {
        self.global_txn_latch.wlock();
    }

    pub fn resume_transactions(&self) {
        self.global_txn_latch.wunlock();
    }

    pub fn active_txn_count(&self) -> usize {
        self.txn_map.lock().unwrap().len()
    }

    fn finish(&self, txn: &Arc<Transaction>) {
        self.lock_manager.unlock_all(txn);
        self.txn_map.lock().unwrap().remove(&txn.id());
        self.global_txn_latch.runlock();
    }
}
