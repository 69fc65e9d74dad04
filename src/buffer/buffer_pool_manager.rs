use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use log::debug;

use crate::{
    buffer::ClockReplacer,
    error::DbError,
    recovery::LogManager,
    storage::{disk::DiskManager, page::Page},
    types::{DbResult, FrameID, PageID, Pod},
    utils::HandyRwLock,
};

struct PoolInner {
    frames: Vec<Pod<Page>>,
    page_table: HashMap<PageID, FrameID>,
    free_list: Vec<FrameID>,
}

/// Cache of fixed-size frames between the table layer and the disk.
///
/// One mutex serializes fetch/unpin/new/flush/delete; holding it across
/// disk I/O is tolerated because the pool is small. Page latches are the
/// `RwLock` around each frame and are only taken after the pool mutex,
/// never the other way around.
///
/// Invariants: a page id maps to a frame iff that frame holds it; a frame
/// with a positive pin count is never evicted; a dirty frame reaches disk
/// before it is reused; and the WAL covering a page's `page_lsn` reaches
/// disk before the page does.
pub struct BufferPoolManager {
    inner: Mutex<PoolInner>,
    replacer: ClockReplacer,
    disk: Arc<DiskManager>,
    log_manager: Arc<LogManager>,
    pool_size: usize,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk: Arc<DiskManager>, log_manager: Arc<LogManager>) -> Self {
        let frames = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Page::empty())))
            .collect();
        let free_list = (0..pool_size).collect();

        Self {
            inner: Mutex::new(PoolInner {
                frames,
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: ClockReplacer::new(),
            disk,
            log_manager,
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Return the requested page pinned. Loads it from disk if it is not
    /// resident, evicting a victim frame when necessary.
    pub fn fetch_page(&self, page_id: PageID) -> Result<Pod<Page>, DbError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = Arc::clone(&inner.frames[frame_id]);
            frame.wl().inc_pin_count();
            self.replacer.pin(frame_id);
            return Ok(frame);
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = Arc::clone(&inner.frames[frame_id]);
        {
            let mut page = frame.wl();
            page.reset(page_id);
            self.disk.read_page(page_id, &mut page.data)?;
        }
        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        debug!("fetched page {} into frame {}", page_id, frame_id);
        Ok(frame)
    }

    /// Drop one pin. The dirty flag is OR-ed in, never cleared here. A
    /// frame whose pin count reaches zero becomes an eviction candidate.
    pub fn unpin_page(&self, page_id: PageID, is_dirty: bool) -> DbResult {
        let inner = self.inner.lock().unwrap();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => {
                return Err(DbError::internal(&format!(
                    "unpin of non-resident page {}",
                    page_id
                )))
            }
        };

        let frame = &inner.frames[frame_id];
        let mut page = frame.wl();
        if is_dirty {
            page.set_dirty(true);
        }
        page.dec_pin_count();
        if page.pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Allocate a brand-new page on disk and return it pinned and zeroed.
    pub fn new_page(&self) -> Result<Pod<Page>, DbError> {
        let mut inner = self.inner.lock().unwrap();

        let frame_id = self.acquire_frame(&mut inner)?;
        let page_id = self.disk.allocate_page();

        let frame = Arc::clone(&inner.frames[frame_id]);
        {
            let mut page = frame.wl();
            page.reset(page_id);
            page.set_dirty(true);
        }
        inner.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        debug!("new page {} in frame {}", page_id, frame_id);
        Ok(frame)
    }

    /// Write the page to disk regardless of its dirty bit and clear it.
    pub fn flush_page(&self, page_id: PageID) -> DbResult {
        let inner = self.inner.lock().unwrap();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => {
                return Err(DbError::internal(&format!(
                    "flush of non-resident page {}",
                    page_id
                )))
            }
        };

        let frame = Arc::clone(&inner.frames[frame_id]);
        self.write_frame(&frame)
    }

    /// Flush every resident page; used on shutdown and at checkpoints.
    pub fn flush_all_pages(&self) -> DbResult {
        let inner = self.inner.lock().unwrap();

        let frames: Vec<Pod<Page>> = inner
            .page_table
            .values()
            .map(|&frame_id| Arc::clone(&inner.frames[frame_id]))
            .collect();

        for frame in frames {
            self.write_frame(&frame)?;
        }
        Ok(())
    }

    /// Drop a page from the pool. Fails while anyone holds a pin on it.
    pub fn delete_page(&self, page_id: PageID) -> DbResult {
        let mut inner = self.inner.lock().unwrap();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(()),
        };

        {
            let frame = &inner.frames[frame_id];
            let mut page = frame.wl();
            if page.pin_count() > 0 {
                return Err(DbError::internal(&format!(
                    "delete of pinned page {} (pin count {})",
                    page_id,
                    page.pin_count()
                )));
            }
            *page = Page::empty();
        }

        inner.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        inner.free_list.push(frame_id);
        self.disk.deallocate_page(page_id);
        Ok(())
    }

    /// Take a frame from the free list, or evict a victim. The caller
    /// still holds the pool mutex, so the victim cannot be re-pinned
    /// between selection and eviction.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameID, DbError> {
        if let Some(frame_id) = inner.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(DbError::NoVictim)?;
        let frame = Arc::clone(&inner.frames[frame_id]);

        let old_page_id = {
            let page = frame.rl();
            if page.is_dirty() {
                drop(page);
                self.write_frame(&frame)?;
                frame.rl().id()
            } else {
                page.id()
            }
        };
        inner.page_table.remove(&old_page_id);

        debug!("evicted page {} from frame {}", old_page_id, frame_id);
        Ok(frame_id)
    }

    /// Flush one frame, honoring the WAL rule: the log must cover the
    /// page's LSN before the page bytes may reach disk.
    fn write_frame(&self, frame: &Pod<Page>) -> DbResult {
        let mut page = frame.wl();

        if self.log_manager.is_enabled() && page.lsn() > self.log_manager.persistent_lsn() {
            self.log_manager.flush()?;
        }

        self.disk.write_page(page.id(), &page.data)?;
        page.set_dirty(false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(name: &str, pool_size: usize) -> BufferPoolManager {
        let path = std::env::temp_dir().join(name);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("log"));

        let disk = Arc::new(DiskManager::new(&path).unwrap());
        let log_manager = Arc::new(LogManager::new(Arc::clone(&disk)));
        BufferPoolManager::new(pool_size, disk, log_manager)
    }

    #[test]
    fn test_pin_saturation_and_release() {
        let bpm = test_pool("bpm_saturation.db", 3);

        let mut pages = Vec::new();
        for _ in 0..3 {
            pages.push(bpm.new_page().unwrap());
        }
        assert!(matches!(bpm.new_page(), Err(DbError::NoVictim)));

        let first_id = pages[0].rl().id();
        bpm.unpin_page(first_id, false).unwrap();

        // the released frame is reused
        let page = bpm.new_page().unwrap();
        assert_ne!(page.rl().id(), first_id);
    }

    #[test]
    fn test_eviction_roundtrip() {
        let bpm = test_pool("bpm_eviction.db", 2);

        let page_id = {
            let page = bpm.new_page().unwrap();
            let mut guard = page.wl();
            guard.data[0] = 0x5a;
            guard.id()
        };
        bpm.unpin_page(page_id, true).unwrap();

        // force the dirty page out
        for _ in 0..2 {
            let page = bpm.new_page().unwrap();
            let id = page.rl().id();
            bpm.unpin_page(id, false).unwrap();
        }

        // refetching reads it back from disk
        let page = bpm.fetch_page(page_id).unwrap();
        assert_eq!(page.rl().data[0], 0x5a);
        bpm.unpin_page(page_id, false).unwrap();
    }

    #[test]
    fn test_fetch_bumps_pin() {
        let bpm = test_pool("bpm_pins.db", 2);

        let page = bpm.new_page().unwrap();
        let page_id = page.rl().id();

        let again = bpm.fetch_page(page_id).unwrap();
        assert_eq!(again.rl().pin_count(), 2);

        bpm.unpin_page(page_id, false).unwrap();
        bpm.unpin_page(page_id, false).unwrap();
        assert_eq!(page.rl().pin_count(), 0);
    }

    #[test]
    fn test_delete_refuses_pinned() {
        let bpm = test_pool("bpm_delete.db", 2);

        let page = bpm.new_page().unwrap();
        let page_id = page.rl().id();
        assert!(bpm.delete_page(page_id).is_err());

        bpm.unpin_page(page_id, false).unwrap();
        bpm.delete_page(page_id).unwrap();
    }
}
