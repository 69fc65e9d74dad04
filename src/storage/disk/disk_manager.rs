use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI32, Ordering},
        Mutex, MutexGuard,
    },
};

use log::debug;

use crate::{
    config::PAGE_SIZE,
    error::DbError,
    types::{DbResult, PageID},
};

/// Fixed-size page I/O against a single database file, plus an append-only
/// log file next to it.
///
/// The disk manager knows nothing about page contents; it moves `PAGE_SIZE`
/// byte blocks and hands out page ids. Page ids are never reused, so
/// `deallocate_page` is a no-op.
pub struct DiskManager {
    db_file: Mutex<File>,
    log_file: Mutex<File>,
    next_page_id: AtomicI32,
    db_path: PathBuf,
}

impl DiskManager {
    /// Open the database at `db_path`, creating it if absent. The log file
    /// lives at the same path with a `.log` extension.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, DbError> {
        let db_path = db_path.as_ref().to_path_buf();
        let log_path = db_path.with_extension("log");

        let db_file = Self::open_file(&db_path)?;
        let log_file = Self::open_file(&log_path)?;

        // Page ids continue where the file ends, so a reopened database
        // never hands out an id that is already occupied.
        let file_len = db_file.metadata().map_err(DbError::io)?.len();
        let next_page_id = (file_len as usize / PAGE_SIZE) as PageID;

        debug!(
            "open database {:?}, {} pages on disk",
            db_path, next_page_id
        );

        Ok(Self {
            db_file: Mutex::new(db_file),
            log_file: Mutex::new(log_file),
            next_page_id: AtomicI32::new(next_page_id),
            db_path,
        })
    }

    fn open_file(path: &Path) -> Result<File, DbError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(DbError::io)
    }

    /// Fill `buf` with the content of the page. A short read at the end of
    /// the file is not an error; the page simply has never been written and
    /// the trailing bytes of `buf` are left untouched.
    pub fn read_page(&self, page_id: PageID, buf: &mut [u8; PAGE_SIZE]) -> DbResult {
        let mut file = self.db();
        file.seek(SeekFrom::Start(Self::page_offset(page_id)))
            .map_err(DbError::io)?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = file.read(&mut buf[filled..]).map_err(DbError::io)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(())
    }

    pub fn write_page(&self, page_id: PageID, data: &[u8; PAGE_SIZE]) -> DbResult {
        let mut file = self.db();
        file.seek(SeekFrom::Start(Self::page_offset(page_id)))
            .map_err(DbError::io)?;
        file.write_all(data).map_err(DbError::io)?;
        Ok(())
    }

    /// Hand out the next page id. The page content stays whatever the file
    /// holds there; callers zero it if they need a fresh page.
    pub fn allocate_page(&self) -> PageID {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Space is not reused in this design.
    pub fn deallocate_page(&self, _page_id: PageID) {}

    /// Append bytes to the log file. Durability comes from `flush_log`,
    /// which the log manager calls after each group write.
    pub fn write_log(&self, data: &[u8]) -> DbResult {
        let mut file = self.log();
        file.seek(SeekFrom::End(0)).map_err(DbError::io)?;
        file.write_all(data).map_err(DbError::io)?;
        Ok(())
    }

    /// Read log bytes starting at `offset`; returns how many bytes were
    /// actually available.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> Result<usize, DbError> {
        let mut file = self.log();
        file.seek(SeekFrom::Start(offset)).map_err(DbError::io)?;

        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).map_err(DbError::io)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    pub fn flush_log(&self) -> DbResult {
        self.log().sync_all().map_err(DbError::io)?;
        Ok(())
    }

    pub fn db_size(&self) -> Result<u64, DbError> {
        let metadata = self.db().metadata().map_err(DbError::io)?;
        Ok(metadata.len())
    }

    pub fn log_size(&self) -> Result<u64, DbError> {
        let metadata = self.log().metadata().map_err(DbError::io)?;
        Ok(metadata.len())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn page_offset(page_id: PageID) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }

    fn db(&self) -> MutexGuard<'_, File> {
        self.db_file.lock().unwrap()
    }

    fn log(&self) -> MutexGuard<'_, File> {
        self.log_file.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("log"));
        path
    }

    #[test]
    fn test_read_write_page() {
        let dm = DiskManager::new(test_path("disk_manager_rw.db")).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        let mut buf = [0u8; PAGE_SIZE];
        data[..14].copy_from_slice(b"A test string.");

        // a read of a page that was never written is tolerated
        dm.read_page(0, &mut buf).unwrap();

        dm.write_page(0, &data).unwrap();
        dm.read_page(0, &mut buf).unwrap();
        assert_eq!(&data[..], &buf[..]);

        buf = [0u8; PAGE_SIZE];
        data[..20].copy_from_slice(b"Another test string.");
        dm.write_page(5, &data).unwrap();
        dm.read_page(5, &mut buf).unwrap();
        assert_eq!(&data[..], &buf[..]);

        // six pages exist because page 5 was written
        assert_eq!(dm.db_size().unwrap(), 6 * PAGE_SIZE as u64);
    }

    #[test]
    fn test_allocate_continues_after_reopen() {
        let path = test_path("disk_manager_alloc.db");

        {
            let dm = DiskManager::new(&path).unwrap();
            assert_eq!(dm.allocate_page(), 0);
            assert_eq!(dm.allocate_page(), 1);
            dm.write_page(1, &[7u8; PAGE_SIZE]).unwrap();
        }

        let dm = DiskManager::new(&path).unwrap();
        assert_eq!(dm.allocate_page(), 2);
    }

    #[test]
    fn test_log_roundtrip() {
        let dm = DiskManager::new(test_path("disk_manager_log.db")).unwrap();

        dm.write_log(b"hello ").unwrap();
        dm.write_log(b"wal").unwrap();
        dm.flush_log().unwrap();

        let mut buf = [0u8; 16];
        let n = dm.read_log(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hello wal");
    }
}
