use std::{
    mem,
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc, Mutex,
    },
};

use log::debug;

use crate::{
    config::{INVALID_LSN, LOG_BUFFER_SIZE},
    recovery::{LogRecord, LOG_RECORD_HEADER_SIZE},
    storage::disk::DiskManager,
    types::{DbResult, LSN},
};

struct LogBuffer {
    bytes: Vec<u8>,
    /// LSN of the last record appended into `bytes`.
    last_lsn: LSN,
}

impl LogBuffer {
    fn new() -> Self {
        Self {
            bytes: Vec::with_capacity(LOG_BUFFER_SIZE),
            last_lsn: INVALID_LSN,
        }
    }
}

/// Append-only, group-flushing WAL writer.
///
/// `append_log_record` copies the serialized record into an in-memory
/// buffer and returns the assigned LSN; nothing reaches disk until the
/// buffer would overflow or someone calls `flush`. The flush path swaps the
/// filled buffer out under the buffer mutex and performs the write under a
/// separate flush mutex, so appenders keep running while the disk works.
pub struct LogManager {
    disk: Arc<DiskManager>,
    next_lsn: AtomicI32,
    /// Highest LSN known to be on stable storage.
    persistent_lsn: AtomicI32,
    enabled: AtomicBool,
    buffer: Mutex<LogBuffer>,
    flush_latch: Mutex<()>,
}

impl LogManager {
    pub fn new(disk: Arc<DiskManager>) -> Self {
        Self {
            disk,
            // LSN 0 is never assigned: a never-written page reads back as
            // zeroes, and recovery must see its page_lsn as older than any
            // real record.
            next_lsn: AtomicI32::new(1),
            persistent_lsn: AtomicI32::new(INVALID_LSN),
            enabled: AtomicBool::new(false),
            buffer: Mutex::new(LogBuffer::new()),
            flush_latch: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Recovery seeds the LSN counter so fresh records sort after every
    /// replayed one.
    pub fn reset_lsn(&self, next_lsn: LSN) {
        self.next_lsn.store(next_lsn, Ordering::SeqCst);
        self.persistent_lsn.store(next_lsn - 1, Ordering::SeqCst);
    }

    pub fn next_lsn(&self) -> LSN {
        self.next_lsn.load(Ordering::SeqCst)
    }

    pub fn persistent_lsn(&self) -> LSN {
        self.persistent_lsn.load(Ordering::SeqCst)
    }

    /// Assign an LSN to `record`, serialize it into the log buffer and
    /// return the LSN. Returns `INVALID_LSN` without touching anything when
    /// logging is disabled.
    pub fn append_log_record(&self, record: &mut LogRecord) -> LSN {
        if !self.is_enabled() {
            return INVALID_LSN;
        }

        loop {
            {
                let mut buffer = self.buffer.lock().unwrap();
                if buffer.bytes.len() + record.size() <= LOG_BUFFER_SIZE {
                    record.lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
                    buffer.bytes.extend_from_slice(&record.encode());
                    buffer.last_lsn = record.lsn;
                    return record.lsn;
                }
            }

            // The record would overflow the buffer: drain it and retry.
            // Every record fits an empty buffer, so this terminates.
            if let Err(e) = self.flush() {
                e.show_backtrace();
            }
        }
    }

    /// Force everything appended so far to stable storage. After this
    /// returns, `persistent_lsn` covers every previously assigned LSN.
    ///
    /// The flush latch is taken before the buffer swap, which keeps
    /// concurrent flushes from writing their buffers out of LSN order.
    /// Lock order is flush latch first, buffer mutex second, everywhere.
    pub fn flush(&self) -> DbResult {
        let _guard = self.flush_latch.lock().unwrap();

        let filled = {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.bytes.is_empty() {
                return Ok(());
            }
            mem::replace(&mut *buffer, LogBuffer::new())
        };

        self.disk.write_log(&filled.bytes)?;
        self.disk.flush_log()?;
        self.persistent_lsn.store(filled.last_lsn, Ordering::SeqCst);

        debug!(
            "log flushed through lsn {}, {} bytes",
            filled.last_lsn,
            filled.bytes.len()
        );
        Ok(())
    }

    /// Render the on-disk log for debugging, one line per record.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let size = match self.disk.log_size() {
            Ok(size) => size as usize,
            Err(_) => return out,
        };

        let mut bytes = vec![0u8; size];
        if self.disk.read_log(&mut bytes, 0).is_err() {
            return out;
        }

        let mut offset = 0;
        while offset + LOG_RECORD_HEADER_SIZE <= bytes.len() {
            match LogRecord::decode(&bytes[offset..]) {
                Some(record) => {
                    out.push_str(&format!("[{:>6}] {:?}\n", offset, record));
                    offset += record.size();
                }
                None => {
                    let tail = &bytes[offset..(offset + 16).min(bytes.len())];
                    out.push_str(&format!(
                        "[{:>6}] unreadable tail: {}\n",
                        offset,
                        hex::encode(tail)
                    ));
                    break;
                }
            }
        }
        out
    }
}
