use crate::{
    config::{INVALID_LSN, INVALID_PAGE_ID, PAGE_SIZE},
    types::{PageID, LSN},
};

/// An in-memory frame of the buffer pool: the raw page bytes plus the
/// bookkeeping the pin/dirty protocol needs.
///
/// The on-disk and in-memory byte layouts coincide; the buffer pool writes
/// `data` verbatim. The RW-latch of a page is the `RwLock` wrapping it
/// (see `Pod<Page>`), not a field here.
pub struct Page {
    id: PageID,
    pin_count: u32,
    is_dirty: bool,
    /// Highest LSN stamped into this page since it was loaded. Mirrors the
    /// `page_lsn` header field of table pages so the buffer pool can check
    /// the WAL rule without knowing the page layout.
    lsn: LSN,
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    /// A freshly loaded frame starts pinned by its requester.
    pub fn new(id: PageID) -> Self {
        Self {
            id,
            pin_count: 1,
            is_dirty: false,
            lsn: INVALID_LSN,
            data: [0u8; PAGE_SIZE],
        }
    }

    pub fn empty() -> Self {
        let mut page = Self::new(INVALID_PAGE_ID);
        page.pin_count = 0;
        page
    }

    /// Re-initialize the frame for a new page, keeping the allocation.
    pub fn reset(&mut self, id: PageID) {
        self.id = id;
        self.pin_count = 1;
        self.is_dirty = false;
        self.lsn = INVALID_LSN;
        self.data = [0u8; PAGE_SIZE];
    }

    pub fn id(&self) -> PageID {
        self.id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn inc_pin_count(&mut self) {
        self.pin_count += 1;
    }

    /// Decrement the pin count, never below zero.
    pub fn dec_pin_count(&mut self) {
        if self.pin_count > 0 {
            self.pin_count -= 1;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    pub fn lsn(&self) -> LSN {
        self.lsn
    }

    pub fn set_lsn(&mut self, lsn: LSN) {
        self.lsn = lsn;
    }
}
