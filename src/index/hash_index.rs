use std::{
    collections::hash_map::DefaultHasher,
    hash::Hasher,
    sync::{Arc, Mutex},
};

use log::debug;

use crate::{
    buffer::BufferPoolManager,
    config::{BUCKET_SIZE, PAGE_SIZE},
    error::DbError,
    io::{read_i32_at, read_u32_at, read_u64_at, write_i32_at, write_u32_at, write_u64_at},
    storage::{page::Rid, tuple::Cell},
    types::{DbResult, PageID},
    utils::HandyRwLock,
};

// Directory page: global depth followed by 2^depth bucket page ids.
const DIR_OFFSET_GLOBAL_DEPTH: usize = 0;
const DIR_OFFSET_BUCKETS: usize = 4;
const MAX_GLOBAL_DEPTH: u32 = 9;

// Bucket page: local depth, entry count, then fixed-size entries of
// (key hash: u64, page id: i32, slot: u32).
const BUCKET_OFFSET_LOCAL_DEPTH: usize = 0;
const BUCKET_OFFSET_COUNT: usize = 4;
const BUCKET_OFFSET_ENTRIES: usize = 8;
const ENTRY_SIZE: usize = 16;

/// Secondary key-to-RID index backed by an extendible hash structure over
/// buffer pool pages.
///
/// Buckets hold `BUCKET_SIZE` entries; an overflowing bucket splits, and
/// the directory doubles when the splitting bucket is at the global depth.
/// Entries store the key's hash rather than the key itself, so lookups can
/// return hash-collision false positives; callers re-check the candidate
/// tuples. Deletes disambiguate by RID.
pub struct HashIndex {
    bpm: Arc<BufferPoolManager>,
    directory_page_id: PageID,
    latch: Mutex<()>,
}

impl HashIndex {
    /// Create an empty index: a one-entry directory pointing at a single
    /// empty bucket.
    pub fn new(bpm: Arc<BufferPoolManager>) -> Result<Arc<Self>, DbError> {
        let bucket = bpm.new_page()?;
        let bucket_id = {
            let mut page = bucket.wl();
            write_u32_at(&mut page.data, BUCKET_OFFSET_LOCAL_DEPTH, 0);
            write_u32_at(&mut page.data, BUCKET_OFFSET_COUNT, 0);
            page.id()
        };
        bpm.unpin_page(bucket_id, true)?;

        let directory = bpm.new_page()?;
        let directory_page_id = {
            let mut page = directory.wl();
            write_u32_at(&mut page.data, DIR_OFFSET_GLOBAL_DEPTH, 0);
            write_i32_at(&mut page.data, DIR_OFFSET_BUCKETS, bucket_id);
            page.id()
        };
        bpm.unpin_page(directory_page_id, true)?;

        Ok(Arc::new(Self {
            bpm,
            directory_page_id,
            latch: Mutex::new(()),
        }))
    }

    pub fn directory_page_id(&self) -> PageID {
        self.directory_page_id
    }

    pub fn hash_key(key: &Cell) -> u64 {
        let mut writer = crate::io::ByteWriter::new();
        key.encode(&mut writer);
        let mut hasher = DefaultHasher::new();
        hasher.write(&writer.into_bytes());
        hasher.finish()
    }

    pub fn insert_entry(&self, key: &Cell, rid: Rid) -> DbResult {
        let _guard = self.latch.lock().unwrap();
        let hash = Self::hash_key(key);

        loop {
            let bucket_id = self.bucket_for(hash)?;
            let inserted = self.try_insert_into(bucket_id, hash, rid)?;
            if inserted {
                return Ok(());
            }
            self.split_bucket(bucket_id)?;
        }
    }

    pub fn delete_entry(&self, key: &Cell, rid: Rid) -> DbResult {
        let _guard = self.latch.lock().unwrap();
        let hash = Self::hash_key(key);
        let bucket_id = self.bucket_for(hash)?;

        let frame = self.bpm.fetch_page(bucket_id)?;
        {
            let mut page = frame.wl();
            let count = read_u32_at(&page.data, BUCKET_OFFSET_COUNT) as usize;

            let mut found = None;
            for i in 0..count {
                let (entry_hash, entry_rid) = Self::entry_at(&page.data, i);
                if entry_hash == hash && entry_rid == rid {
                    found = Some(i);
                    break;
                }
            }

            if let Some(i) = found {
                // move the last entry into the hole
                let (last_hash, last_rid) = Self::entry_at(&page.data, count - 1);
                Self::set_entry(&mut page.data, i, last_hash, last_rid);
                write_u32_at(&mut page.data, BUCKET_OFFSET_COUNT, (count - 1) as u32);
            }
        }
        self.bpm.unpin_page(bucket_id, true)?;
        Ok(())
    }

    /// Candidate RIDs whose key hashes to the same value as `key`.
    pub fn get_rids(&self, key: &Cell) -> Result<Vec<Rid>, DbError> {
        let _guard = self.latch.lock().unwrap();
        let hash = Self::hash_key(key);
        let bucket_id = self.bucket_for(hash)?;

        let frame = self.bpm.fetch_page(bucket_id)?;
        let mut rids = Vec::new();
        {
            let page = frame.rl();
            let count = read_u32_at(&page.data, BUCKET_OFFSET_COUNT) as usize;
            for i in 0..count {
                let (entry_hash, entry_rid) = Self::entry_at(&page.data, i);
                if entry_hash == hash {
                    rids.push(entry_rid);
                }
            }
        }
        self.bpm.unpin_page(bucket_id, false)?;
        Ok(rids)
    }

    fn bucket_for(&self, hash: u64) -> Result<PageID, DbError> {
        let frame = self.bpm.fetch_page(self.directory_page_id)?;
        let bucket_id = {
            let page = frame.rl();
            let depth = read_u32_at(&page.data, DIR_OFFSET_GLOBAL_DEPTH);
            let index = (hash & ((1u64 << depth) - 1)) as usize;
            read_i32_at(&page.data, DIR_OFFSET_BUCKETS + index * 4)
        };
        self.bpm.unpin_page(self.directory_page_id, false)?;
        Ok(bucket_id)
    }

    fn try_insert_into(&self, bucket_id: PageID, hash: u64, rid: Rid) -> Result<bool, DbError> {
        let frame = self.bpm.fetch_page(bucket_id)?;
        let inserted = {
            let mut page = frame.wl();
            let count = read_u32_at(&page.data, BUCKET_OFFSET_COUNT) as usize;
            if count < BUCKET_SIZE {
                Self::set_entry(&mut page.data, count, hash, rid);
                write_u32_at(&mut page.data, BUCKET_OFFSET_COUNT, (count + 1) as u32);
                true
            } else {
                false
            }
        };
        self.bpm.unpin_page(bucket_id, inserted)?;
        Ok(inserted)
    }

    /// Split a full bucket, doubling the directory first when the bucket
    /// already sits at the global depth.
    ///
    /// The replacement bucket is allocated before any page latch is taken;
    /// the buffer pool mutex must never be requested while a latch is held.
    fn split_bucket(&self, bucket_id: PageID) -> DbResult {
        let new_frame = self.bpm.new_page()?;
        let new_id = new_frame.rl().id();

        let dir_frame = self.bpm.fetch_page(self.directory_page_id)?;
        let old_frame = self.bpm.fetch_page(bucket_id)?;

        let result = (|| -> DbResult {
            let mut dir = dir_frame.wl();
            let mut old = old_frame.wl();
            let mut new = new_frame.wl();

            let mut depth = read_u32_at(&dir.data, DIR_OFFSET_GLOBAL_DEPTH);
            let local = read_u32_at(&old.data, BUCKET_OFFSET_LOCAL_DEPTH);

            if local == depth {
                if depth >= MAX_GLOBAL_DEPTH {
                    return Err(DbError::internal("hash index directory is full"));
                }
                let slots = 1usize << depth;
                for i in 0..slots {
                    let target = read_i32_at(&dir.data, DIR_OFFSET_BUCKETS + i * 4);
                    write_i32_at(&mut dir.data, DIR_OFFSET_BUCKETS + (slots + i) * 4, target);
                }
                depth += 1;
                write_u32_at(&mut dir.data, DIR_OFFSET_GLOBAL_DEPTH, depth);
            }

            // the new bucket takes every entry whose split bit is set
            write_u32_at(&mut new.data, BUCKET_OFFSET_LOCAL_DEPTH, local + 1);
            write_u32_at(&mut new.data, BUCKET_OFFSET_COUNT, 0);
            write_u32_at(&mut old.data, BUCKET_OFFSET_LOCAL_DEPTH, local + 1);

            let split_bit = 1u64 << local;
            let count = read_u32_at(&old.data, BUCKET_OFFSET_COUNT) as usize;
            let mut kept = 0usize;
            let mut moved = 0usize;
            for i in 0..count {
                let (entry_hash, entry_rid) = Self::entry_at(&old.data, i);
                if entry_hash & split_bit != 0 {
                    Self::set_entry(&mut new.data, moved, entry_hash, entry_rid);
                    moved += 1;
                } else {
                    Self::set_entry(&mut old.data, kept, entry_hash, entry_rid);
                    kept += 1;
                }
            }
            write_u32_at(&mut old.data, BUCKET_OFFSET_COUNT, kept as u32);
            write_u32_at(&mut new.data, BUCKET_OFFSET_COUNT, moved as u32);

            let slots = 1usize << depth;
            for i in 0..slots {
                let target = read_i32_at(&dir.data, DIR_OFFSET_BUCKETS + i * 4);
                if target == bucket_id && (i as u64) & split_bit != 0 {
                    write_i32_at(&mut dir.data, DIR_OFFSET_BUCKETS + i * 4, new_id);
                }
            }

            debug!(
                "split bucket {} into {} ({} kept, {} moved), depth {}",
                bucket_id, new_id, kept, moved, depth
            );
            Ok(())
        })();

        self.bpm.unpin_page(bucket_id, true)?;
        self.bpm.unpin_page(self.directory_page_id, true)?;
        self.bpm.unpin_page(new_id, true)?;
        result
    }

    fn entry_at(data: &[u8], index: usize) -> (u64, Rid) {
        let base = BUCKET_OFFSET_ENTRIES + index * ENTRY_SIZE;
        let hash = read_u64_at(data, base);
        let page_id = read_i32_at(data, base + 8);
        let slot = read_u32_at(data, base + 12);
        (hash, Rid::new(page_id, slot))
    }

    fn set_entry(data: &mut [u8], index: usize, hash: u64, rid: Rid) {
        let base = BUCKET_OFFSET_ENTRIES + index * ENTRY_SIZE;
        debug_assert!(base + ENTRY_SIZE <= PAGE_SIZE);
        write_u64_at(data, base, hash);
        write_i32_at(data, base + 8, rid.page_id);
        write_u32_at(data, base + 12, rid.slot);
    }
}
