use std::{collections::HashMap, sync::Arc};

use log::{debug, info};

use crate::{
    buffer::BufferPoolManager,
    config::INVALID_LSN,
    error::DbError,
    recovery::{LogPayload, LogRecord, LogRecordType, LOG_RECORD_HEADER_SIZE},
    storage::{disk::DiskManager, page::TablePage},
    types::{DbResult, TxnID, LSN},
};

/// Replays the write-ahead log when a database opens.
///
/// One forward pass redoes every tuple operation whose LSN is newer than
/// the page it touched; a backward pass then undoes the operations of
/// transactions that never reached a commit or abort record. Reading stops
/// at the first incomplete record, the tail of an interrupted group flush.
pub struct LogRecovery {
    disk: Arc<DiskManager>,
    bpm: Arc<BufferPoolManager>,
}

impl LogRecovery {
    pub fn new(disk: Arc<DiskManager>, bpm: Arc<BufferPoolManager>) -> Self {
        Self { disk, bpm }
    }

    /// Run both passes and flush the repaired pages. Returns the next
    /// usable LSN.
    pub fn recover(&self) -> Result<LSN, DbError> {
        let records = self.read_records()?;
        if records.is_empty() {
            return Ok(1);
        }

        let mut max_lsn = INVALID_LSN;
        let mut active: HashMap<TxnID, Vec<usize>> = HashMap::new();

        for (i, record) in records.iter().enumerate() {
            max_lsn = max_lsn.max(record.lsn);
            match record.record_type {
                LogRecordType::Begin => {
                    active.insert(record.txn_id, Vec::new());
                }
                LogRecordType::Commit | LogRecordType::Abort => {
                    active.remove(&record.txn_id);
                }
                _ => {
                    active.entry(record.txn_id).or_insert_with(Vec::new).push(i);
                    self.redo(record)?;
                }
            }
        }

        for (txn_id, indices) in &active {
            debug!(
                "undoing loser transaction {} ({} records)",
                txn_id,
                indices.len()
            );
            for &i in indices.iter().rev() {
                self.undo(&records[i])?;
            }
        }

        self.bpm.flush_all_pages()?;
        info!(
            "log recovery done: {} records, {} losers, max lsn {}",
            records.len(),
            active.len(),
            max_lsn
        );
        Ok(max_lsn + 1)
    }

    fn read_records(&self) -> Result<Vec<LogRecord>, DbError> {
        let size = self.disk.log_size()? as usize;
        let mut bytes = vec![0u8; size];
        let filled = self.disk.read_log(&mut bytes, 0)?;

        let mut records = Vec::new();
        let mut offset = 0;
        while offset + LOG_RECORD_HEADER_SIZE <= filled {
            match LogRecord::decode(&bytes[offset..filled]) {
                Some(record) => {
                    offset += record.size();
                    records.push(record);
                }
                None => break,
            }
        }
        Ok(records)
    }

    /// Reapply a record to its page unless the page already saw it.
    fn redo(&self, record: &LogRecord) -> DbResult {
        let rid = match &record.payload {
            LogPayload::Tuple { rid, .. } => *rid,
            LogPayload::Update { rid, .. } => *rid,
            // page creation leaves no redo work: the links it described
            // are page content covered by the tuple records
            _ => return Ok(()),
        };

        let frame = self.bpm.fetch_page(rid.page_id)?;
        let table_page = TablePage::new(frame);

        if table_page.page_lsn() >= record.lsn {
            self.bpm.unpin_page(rid.page_id, false)?;
            return Ok(());
        }

        match (&record.record_type, &record.payload) {
            (LogRecordType::Insert, LogPayload::Tuple { data, .. }) => {
                table_page.recover_insert(rid, data, record.lsn);
            }
            (LogRecordType::MarkDelete, _) => {
                table_page.recover_mark_delete(rid, record.lsn);
            }
            (LogRecordType::ApplyDelete, _) => {
                table_page.recover_apply_delete(rid, record.lsn);
            }
            (LogRecordType::RollbackDelete, _) => {
                table_page.recover_rollback_delete(rid, record.lsn);
            }
            (LogRecordType::Update, LogPayload::Update { new_data, .. }) => {
                table_page.recover_update(rid, new_data, record.lsn);
            }
            _ => {}
        }

        self.bpm.unpin_page(rid.page_id, true)?;
        Ok(())
    }

    /// Invert a loser's record. The forward pass already brought the page
    /// up to date, so the inverse applies unconditionally.
    fn undo(&self, record: &LogRecord) -> DbResult {
        let rid = match &record.payload {
            LogPayload::Tuple { rid, .. } => *rid,
            LogPayload::Update { rid, .. } => *rid,
            _ => return Ok(()),
        };

        let frame = self.bpm.fetch_page(rid.page_id)?;
        let table_page = TablePage::new(frame);

        match (&record.record_type, &record.payload) {
            (LogRecordType::Insert, _) => {
                table_page.recover_apply_delete(rid, record.lsn);
            }
            (LogRecordType::MarkDelete, _) => {
                table_page.recover_rollback_delete(rid, record.lsn);
            }
            (LogRecordType::ApplyDelete, LogPayload::Tuple { data, .. }) => {
                table_page.recover_insert(rid, data, record.lsn);
            }
            (LogRecordType::RollbackDelete, _) => {
                table_page.recover_mark_delete(rid, record.lsn);
            }
            (LogRecordType::Update, LogPayload::Update { old_data, .. }) => {
                table_page.recover_update(rid, old_data, record.lsn);
            }
            _ => {}
        }

        self.bpm.unpin_page(rid.page_id, true)?;
        Ok(())
    }
}
