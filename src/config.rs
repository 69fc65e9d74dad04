use std::time::Duration;

use crate::types::{PageID, TxnID, LSN};

/// Size of a data page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of frames in the buffer pool. Tests override this through
/// `Database::with_pool_size`.
pub const BUFFER_POOL_SIZE: usize = 10;

/// Size of the in-memory log buffer in bytes.
pub const LOG_BUFFER_SIZE: usize = (BUFFER_POOL_SIZE + 1) * PAGE_SIZE;

/// Capacity of a single hash index bucket, in entries.
pub const BUCKET_SIZE: usize = 50;

pub const INVALID_PAGE_ID: PageID = -1;
pub const INVALID_TXN_ID: TxnID = -1;
pub const INVALID_LSN: LSN = -1;

/// The catalog lives on the first page of the database file.
pub const CATALOG_PAGE_ID: PageID = 0;

/// How long a log flush may be delayed before a waiter forces it.
pub const LOG_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a lock request waits before giving up.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// Interval between deadlock detection sweeps. The current lock manager
/// relies on timeouts instead of running a detector thread.
pub const CYCLE_DETECTION_INTERVAL: Duration = Duration::from_millis(50);
