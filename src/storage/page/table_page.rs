use log::debug;

use crate::{
    config::{INVALID_LSN, INVALID_PAGE_ID, PAGE_SIZE},
    error::DbError,
    io::{read_i32_at, read_u32_at, write_i32_at, write_u32_at},
    recovery::{LogManager, LogRecord, LogRecordType},
    storage::page::{Page, Rid},
    transaction::Transaction,
    types::{DbResult, PageID, Pod, LSN},
    utils::HandyRwLock,
};

// Header fields at fixed offsets at the front of the page.
const OFFSET_PAGE_LSN: usize = 0;
const OFFSET_PREV_PAGE_ID: usize = 4;
const OFFSET_NEXT_PAGE_ID: usize = 8;
const OFFSET_FREE_SPACE_POINTER: usize = 12;
const OFFSET_TUPLE_COUNT: usize = 16;
const HEADER_SIZE: usize = 20;

// After the header, a forward-growing array of (offset, size) pairs.
const SLOT_SIZE: usize = 8;

/// The high bit of a slot size marks a tombstone. A slot size of zero means
/// the slot was never populated or its tuple was compacted away; the two
/// cases must stay distinct because undoing an insert must not shift the
/// slots after it.
const TOMBSTONE_MASK: u32 = 1 << 31;

/// The largest payload a slotted page can hold: everything but the header
/// and the tuple's own slot.
pub const MAX_TUPLE_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

/// Slotted-page view over a buffer frame.
///
/// Tuples grow backward from the end of the page while the slot array grows
/// forward; `free_space_pointer` is the boundary of the tuple area. Every
/// mutation appends a WAL record, advances the transaction's `prev_lsn` and
/// stamps the page's `page_lsn` before the page latch is released.
pub struct TablePage {
    page: Pod<Page>,
}

impl TablePage {
    pub fn new(page: Pod<Page>) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Pod<Page> {
        &self.page
    }

    pub fn page_id(&self) -> PageID {
        self.page.rl().id()
    }

    /// Zero the header except for the chain links and the free space
    /// pointer, which starts at the end of the page.
    pub fn init(&self, prev_page_id: PageID) {
        let mut page = self.page.wl();
        let data = &mut page.data;
        write_i32_at(data, OFFSET_PAGE_LSN, INVALID_LSN);
        write_i32_at(data, OFFSET_PREV_PAGE_ID, prev_page_id);
        write_i32_at(data, OFFSET_NEXT_PAGE_ID, INVALID_PAGE_ID);
        write_u32_at(data, OFFSET_FREE_SPACE_POINTER, PAGE_SIZE as u32);
        write_u32_at(data, OFFSET_TUPLE_COUNT, 0);
    }

    pub fn page_lsn(&self) -> LSN {
        read_i32_at(&self.page.rl().data, OFFSET_PAGE_LSN)
    }

    pub fn prev_page_id(&self) -> PageID {
        read_i32_at(&self.page.rl().data, OFFSET_PREV_PAGE_ID)
    }

    pub fn next_page_id(&self) -> PageID {
        read_i32_at(&self.page.rl().data, OFFSET_NEXT_PAGE_ID)
    }

    pub fn set_next_page_id(&self, page_id: PageID) {
        write_i32_at(&mut self.page.wl().data, OFFSET_NEXT_PAGE_ID, page_id);
    }

    /// Stamp a WAL position into the header outside the logged tuple
    /// operations, e.g. for the record describing the page's creation.
    pub fn set_page_lsn(&self, lsn: LSN) {
        let mut page = self.page.wl();
        Self::restamp(&mut page, lsn);
    }

    /// Number of slots, dead ones included.
    pub fn tuple_count(&self) -> u32 {
        read_u32_at(&self.page.rl().data, OFFSET_TUPLE_COUNT)
    }

    pub fn free_space(&self) -> usize {
        let page = self.page.rl();
        Self::free_space_of(&page.data)
    }

    fn free_space_of(data: &[u8]) -> usize {
        let fsp = read_u32_at(data, OFFSET_FREE_SPACE_POINTER) as usize;
        let count = read_u32_at(data, OFFSET_TUPLE_COUNT) as usize;
        fsp - (HEADER_SIZE + count * SLOT_SIZE)
    }

    fn slot_offset(data: &[u8], slot: u32) -> u32 {
        read_u32_at(data, HEADER_SIZE + slot as usize * SLOT_SIZE)
    }

    fn slot_size(data: &[u8], slot: u32) -> u32 {
        read_u32_at(data, HEADER_SIZE + slot as usize * SLOT_SIZE + 4)
    }

    fn set_slot(data: &mut [u8], slot: u32, offset: u32, size: u32) {
        write_u32_at(data, HEADER_SIZE + slot as usize * SLOT_SIZE, offset);
        write_u32_at(data, HEADER_SIZE + slot as usize * SLOT_SIZE + 4, size);
    }

    fn is_tombstone(size: u32) -> bool {
        size & TOMBSTONE_MASK != 0
    }

    fn real_size(size: u32) -> u32 {
        size & !TOMBSTONE_MASK
    }

    /// Insert a serialized tuple, reusing a compacted-away slot when one
    /// exists. Fails with `PageFull` when the payload (plus a fresh slot if
    /// needed) does not fit.
    pub fn insert_tuple(
        &self,
        tuple_data: &[u8],
        txn: &Transaction,
        log_manager: &LogManager,
    ) -> Result<Rid, DbError> {
        let mut page = self.page.wl();
        let page_id = page.id();
        let len = tuple_data.len() as u32;

        let count = read_u32_at(&page.data, OFFSET_TUPLE_COUNT);
        let reuse = (0..count).find(|slot| Self::slot_size(&page.data, *slot) == 0);

        let slot_overhead = if reuse.is_some() { 0 } else { SLOT_SIZE };
        if Self::free_space_of(&page.data) < len as usize + slot_overhead {
            return Err(DbError::PageFull);
        }

        let fsp = read_u32_at(&page.data, OFFSET_FREE_SPACE_POINTER);
        let new_fsp = fsp - len;
        page.data[new_fsp as usize..fsp as usize].copy_from_slice(tuple_data);
        write_u32_at(&mut page.data, OFFSET_FREE_SPACE_POINTER, new_fsp);

        let slot = match reuse {
            Some(slot) => slot,
            None => {
                write_u32_at(&mut page.data, OFFSET_TUPLE_COUNT, count + 1);
                count
            }
        };
        Self::set_slot(&mut page.data, slot, new_fsp, len);

        let rid = Rid::new(page_id, slot);
        let mut record = LogRecord::new_tuple(
            LogRecordType::Insert,
            txn.id(),
            txn.prev_lsn(),
            rid,
            tuple_data.to_vec(),
        );
        Self::stamp(&mut page, log_manager.append_log_record(&mut record), txn);

        debug!("inserted {} bytes at {}", len, rid);
        Ok(rid)
    }

    /// Set the tombstone bit. The tuple bytes stay in place until commit
    /// applies the delete.
    pub fn mark_delete(
        &self,
        rid: Rid,
        txn: &Transaction,
        log_manager: &LogManager,
    ) -> DbResult {
        let mut page = self.page.wl();

        let size = Self::slot_size(&page.data, rid.slot);
        if size == 0 {
            return Err(DbError::internal("mark_delete on an empty slot"));
        }
        if Self::is_tombstone(size) {
            return Err(DbError::internal("mark_delete on a deleted tuple"));
        }

        let offset = Self::slot_offset(&page.data, rid.slot) as usize;
        let pre_image = page.data[offset..offset + size as usize].to_vec();

        Self::set_slot(
            &mut page.data,
            rid.slot,
            offset as u32,
            size | TOMBSTONE_MASK,
        );

        let mut record = LogRecord::new_tuple(
            LogRecordType::MarkDelete,
            txn.id(),
            txn.prev_lsn(),
            rid,
            pre_image,
        );
        Self::stamp(&mut page, log_manager.append_log_record(&mut record), txn);
        Ok(())
    }

    /// Physically remove the tuple: compact its bytes out and zero the
    /// slot. Called at commit for delete write-set entries and when an
    /// insert is undone.
    pub fn apply_delete(
        &self,
        rid: Rid,
        txn: &Transaction,
        log_manager: &LogManager,
    ) -> DbResult {
        let mut page = self.page.wl();

        let size = Self::slot_size(&page.data, rid.slot);
        let real = Self::real_size(size);
        if real == 0 {
            return Err(DbError::internal("apply_delete on an empty slot"));
        }

        let offset = Self::slot_offset(&page.data, rid.slot) as usize;
        let pre_image = page.data[offset..offset + real as usize].to_vec();

        Self::compact_out(&mut page.data, rid.slot, offset, real);

        let mut record = LogRecord::new_tuple(
            LogRecordType::ApplyDelete,
            txn.id(),
            txn.prev_lsn(),
            rid,
            pre_image,
        );
        Self::stamp(&mut page, log_manager.append_log_record(&mut record), txn);
        Ok(())
    }

    /// Clear the tombstone bit, resurrecting a marked tuple during abort.
    pub fn rollback_delete(
        &self,
        rid: Rid,
        txn: &Transaction,
        log_manager: &LogManager,
    ) -> DbResult {
        let mut page = self.page.wl();

        let size = Self::slot_size(&page.data, rid.slot);
        if !Self::is_tombstone(size) {
            return Err(DbError::internal("rollback_delete on a live tuple"));
        }

        let offset = Self::slot_offset(&page.data, rid.slot);
        let real = Self::real_size(size);
        Self::set_slot(&mut page.data, rid.slot, offset, real);

        let pre_image =
            page.data[offset as usize..offset as usize + real as usize].to_vec();
        let mut record = LogRecord::new_tuple(
            LogRecordType::RollbackDelete,
            txn.id(),
            txn.prev_lsn(),
            rid,
            pre_image,
        );
        Self::stamp(&mut page, log_manager.append_log_record(&mut record), txn);
        Ok(())
    }

    /// Replace the tuple in place when the new payload fits into the old
    /// slot, or relocate it within this page when there is room. Fails with
    /// `TupleUpdateFailed` otherwise; the table heap then falls back to
    /// delete-then-insert on another page.
    pub fn update_tuple(
        &self,
        new_data: &[u8],
        rid: Rid,
        txn: &Transaction,
        log_manager: &LogManager,
    ) -> DbResult {
        let mut page = self.page.wl();

        let size = Self::slot_size(&page.data, rid.slot);
        if size == 0 || Self::is_tombstone(size) {
            return Err(DbError::TupleUpdateFailed(format!(
                "no live tuple at {}",
                rid
            )));
        }

        let offset = Self::slot_offset(&page.data, rid.slot) as usize;
        let old_data = page.data[offset..offset + size as usize].to_vec();
        let new_len = new_data.len() as u32;

        if new_len <= size {
            page.data[offset..offset + new_data.len()].copy_from_slice(new_data);
            Self::set_slot(&mut page.data, rid.slot, offset as u32, new_len);
        } else if (new_len as usize) <= Self::free_space_of(&page.data) {
            let fsp = read_u32_at(&page.data, OFFSET_FREE_SPACE_POINTER);
            let new_fsp = fsp - new_len;
            page.data[new_fsp as usize..fsp as usize].copy_from_slice(new_data);
            write_u32_at(&mut page.data, OFFSET_FREE_SPACE_POINTER, new_fsp);
            Self::set_slot(&mut page.data, rid.slot, new_fsp, new_len);
        } else {
            return Err(DbError::TupleUpdateFailed(format!(
                "tuple at {} grew past the page's free space",
                rid
            )));
        }

        let mut record = LogRecord::new_update(
            txn.id(),
            txn.prev_lsn(),
            rid,
            old_data,
            new_data.to_vec(),
        );
        Self::stamp(&mut page, log_manager.append_log_record(&mut record), txn);
        Ok(())
    }

    /// Serialized bytes of a live tuple; `None` for tombstones and dead
    /// slots.
    pub fn get_tuple_data(&self, slot: u32) -> Option<Vec<u8>> {
        let page = self.page.rl();

        if slot >= read_u32_at(&page.data, OFFSET_TUPLE_COUNT) {
            return None;
        }
        let size = Self::slot_size(&page.data, slot);
        if size == 0 || Self::is_tombstone(size) {
            return None;
        }

        let offset = Self::slot_offset(&page.data, slot) as usize;
        Some(page.data[offset..offset + size as usize].to_vec())
    }

    /// Like `get_tuple_data` but also reads through tombstones. The abort
    /// path needs the bytes of a marked tuple to restore its index entries.
    pub fn get_tuple_data_ignore_delete(&self, slot: u32) -> Option<Vec<u8>> {
        let page = self.page.rl();

        if slot >= read_u32_at(&page.data, OFFSET_TUPLE_COUNT) {
            return None;
        }
        let size = Self::slot_size(&page.data, slot);
        let real = Self::real_size(size);
        if real == 0 {
            return None;
        }

        let offset = Self::slot_offset(&page.data, slot) as usize;
        Some(page.data[offset..offset + real as usize].to_vec())
    }

    /// Shift the tuple area to close the gap left by the removed tuple and
    /// fix up every slot that pointed below it. The removed slot keeps its
    /// position with a zero size so the RIDs after it stay valid.
    fn compact_out(data: &mut [u8], slot: u32, offset: usize, real: u32) {
        let fsp = read_u32_at(data, OFFSET_FREE_SPACE_POINTER) as usize;

        data.copy_within(fsp..offset, fsp + real as usize);
        write_u32_at(data, OFFSET_FREE_SPACE_POINTER, (fsp + real as usize) as u32);
        Self::set_slot(data, slot, 0, 0);

        let count = read_u32_at(data, OFFSET_TUPLE_COUNT);
        for other in 0..count {
            if other == slot {
                continue;
            }
            let other_size = Self::slot_size(data, other);
            if Self::real_size(other_size) == 0 {
                continue;
            }
            let other_offset = Self::slot_offset(data, other);
            if (other_offset as usize) < offset {
                Self::set_slot(data, other, other_offset + real, other_size);
            }
        }
    }

    fn stamp(page: &mut Page, lsn: LSN, txn: &Transaction) {
        page.set_dirty(true);
        if lsn == INVALID_LSN {
            // logging is disabled
            return;
        }
        txn.set_prev_lsn(lsn);
        write_i32_at(&mut page.data, OFFSET_PAGE_LSN, lsn);
        page.set_lsn(lsn);
    }

    // Recovery applies log records without writing new ones; these raw
    // variants mirror the logged operations above.

    /// Redo an insert at its original RID. A page that was never flushed
    /// reads back as zeroes, so a zero free space pointer means the header
    /// has to be rebuilt first.
    pub fn recover_insert(&self, rid: Rid, tuple_data: &[u8], lsn: LSN) {
        if read_u32_at(&self.page.rl().data, OFFSET_FREE_SPACE_POINTER) == 0 {
            self.init(INVALID_PAGE_ID);
        }

        let mut page = self.page.wl();
        let len = tuple_data.len() as u32;

        let fsp = read_u32_at(&page.data, OFFSET_FREE_SPACE_POINTER);
        let new_fsp = fsp - len;
        page.data[new_fsp as usize..fsp as usize].copy_from_slice(tuple_data);
        write_u32_at(&mut page.data, OFFSET_FREE_SPACE_POINTER, new_fsp);

        let count = read_u32_at(&page.data, OFFSET_TUPLE_COUNT);
        if rid.slot >= count {
            write_u32_at(&mut page.data, OFFSET_TUPLE_COUNT, rid.slot + 1);
        }
        Self::set_slot(&mut page.data, rid.slot, new_fsp, len);
        Self::restamp(&mut page, lsn);
    }

    pub fn recover_mark_delete(&self, rid: Rid, lsn: LSN) {
        let mut page = self.page.wl();
        let size = Self::slot_size(&page.data, rid.slot);
        let offset = Self::slot_offset(&page.data, rid.slot);
        Self::set_slot(&mut page.data, rid.slot, offset, size | TOMBSTONE_MASK);
        Self::restamp(&mut page, lsn);
    }

    pub fn recover_rollback_delete(&self, rid: Rid, lsn: LSN) {
        let mut page = self.page.wl();
        let size = Self::slot_size(&page.data, rid.slot);
        let offset = Self::slot_offset(&page.data, rid.slot);
        Self::set_slot(&mut page.data, rid.slot, offset, Self::real_size(size));
        Self::restamp(&mut page, lsn);
    }

    pub fn recover_apply_delete(&self, rid: Rid, lsn: LSN) {
        let mut page = self.page.wl();
        let size = Self::slot_size(&page.data, rid.slot);
        let real = Self::real_size(size);
        if real > 0 {
            let offset = Self::slot_offset(&page.data, rid.slot) as usize;
            Self::compact_out(&mut page.data, rid.slot, offset, real);
        }
        Self::restamp(&mut page, lsn);
    }

    /// Replay or undo an update by writing `data` over the slot. The slot
    /// is guaranteed to hold the other image of the same update, so a
    /// payload that no longer fits in place falls back to the relocation
    /// path.
    pub fn recover_update(&self, rid: Rid, data: &[u8], lsn: LSN) {
        let mut page = self.page.wl();
        let size = Self::slot_size(&page.data, rid.slot);
        let real = Self::real_size(size);
        let offset = Self::slot_offset(&page.data, rid.slot) as usize;
        let len = data.len() as u32;

        if len <= real {
            page.data[offset..offset + data.len()].copy_from_slice(data);
            Self::set_slot(&mut page.data, rid.slot, offset as u32, len);
        } else {
            let fsp = read_u32_at(&page.data, OFFSET_FREE_SPACE_POINTER);
            let new_fsp = fsp - len;
            page.data[new_fsp as usize..fsp as usize].copy_from_slice(data);
            write_u32_at(&mut page.data, OFFSET_FREE_SPACE_POINTER, new_fsp);
            Self::set_slot(&mut page.data, rid.slot, new_fsp, len);
        }
        Self::restamp(&mut page, lsn);
    }

    fn restamp(page: &mut Page, lsn: LSN) {
        page.set_dirty(true);
        write_i32_at(&mut page.data, OFFSET_PAGE_LSN, lsn);
        page.set_lsn(lsn);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, RwLock};

    use super::*;
    use crate::storage::disk::DiskManager;

    fn test_setup(name: &str) -> (TablePage, Transaction, LogManager) {
        let path = std::env::temp_dir().join(name);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("log"));

        let disk = Arc::new(DiskManager::new(&path).unwrap());
        let log_manager = LogManager::new(disk);

        let page = Arc::new(RwLock::new(Page::new(1)));
        let table_page = TablePage::new(page);
        table_page.init(INVALID_PAGE_ID);

        (table_page, Transaction::new(1), log_manager)
    }

    #[test]
    fn test_insert_and_get() {
        let (page, txn, log) = test_setup("table_page_insert.db");

        let rid_1 = page.insert_tuple(b"hello", &txn, &log).unwrap();
        let rid_2 = page.insert_tuple(b"world!", &txn, &log).unwrap();

        assert_eq!(rid_1.slot, 0);
        assert_eq!(rid_2.slot, 1);
        assert_eq!(page.get_tuple_data(0).unwrap(), b"hello");
        assert_eq!(page.get_tuple_data(1).unwrap(), b"world!");
        assert_eq!(page.tuple_count(), 2);
    }

    #[test]
    fn test_page_full() {
        let (page, txn, log) = test_setup("table_page_full.db");

        let big = vec![0xabu8; 2000];
        page.insert_tuple(&big, &txn, &log).unwrap();
        page.insert_tuple(&big, &txn, &log).unwrap();
        assert_eq!(
            page.insert_tuple(&big, &txn, &log).unwrap_err(),
            DbError::PageFull
        );
    }

    #[test]
    fn test_tombstone_then_rollback() {
        let (page, txn, log) = test_setup("table_page_tombstone.db");

        let rid = page.insert_tuple(b"doomed", &txn, &log).unwrap();
        page.mark_delete(rid, &txn, &log).unwrap();

        assert!(page.get_tuple_data(rid.slot).is_none());
        assert_eq!(
            page.get_tuple_data_ignore_delete(rid.slot).unwrap(),
            b"doomed"
        );

        page.rollback_delete(rid, &txn, &log).unwrap();
        assert_eq!(page.get_tuple_data(rid.slot).unwrap(), b"doomed");
    }

    #[test]
    fn test_apply_delete_compacts_and_keeps_rids() {
        let (page, txn, log) = test_setup("table_page_compact.db");

        let rid_1 = page.insert_tuple(b"first", &txn, &log).unwrap();
        let rid_2 = page.insert_tuple(b"second", &txn, &log).unwrap();
        let rid_3 = page.insert_tuple(b"third", &txn, &log).unwrap();

        let free_before = page.free_space();
        page.mark_delete(rid_2, &txn, &log).unwrap();
        page.apply_delete(rid_2, &txn, &log).unwrap();

        // the other tuples survive under their original rids
        assert_eq!(page.get_tuple_data(rid_1.slot).unwrap(), b"first");
        assert_eq!(page.get_tuple_data(rid_3.slot).unwrap(), b"third");
        assert!(page.get_tuple_data(rid_2.slot).is_none());

        // the freed bytes are reclaimed, the slot itself is not
        assert_eq!(page.free_space(), free_before + b"second".len());
        assert_eq!(page.tuple_count(), 3);

        // a new insert reuses the dead slot
        let rid_4 = page.insert_tuple(b"fourth", &txn, &log).unwrap();
        assert_eq!(rid_4.slot, rid_2.slot);
        assert_eq!(page.get_tuple_data(rid_4.slot).unwrap(), b"fourth");
    }

    #[test]
    fn test_update_in_place_and_grow() {
        let (page, txn, log) = test_setup("table_page_update.db");

        let rid = page.insert_tuple(b"abcdef", &txn, &log).unwrap();

        // shrink: stays at the same offset
        page.update_tuple(b"abc", rid, &txn, &log).unwrap();
        assert_eq!(page.get_tuple_data(rid.slot).unwrap(), b"abc");

        // grow within the page: relocated but same rid
        page.update_tuple(b"abcdefghij", rid, &txn, &log).unwrap();
        assert_eq!(page.get_tuple_data(rid.slot).unwrap(), b"abcdefghij");

        // grow past the page
        let huge = vec![1u8; PAGE_SIZE];
        assert!(matches!(
            page.update_tuple(&huge, rid, &txn, &log),
            Err(DbError::TupleUpdateFailed(_))
        ));
    }
}
