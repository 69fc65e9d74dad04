use std::{path::Path, sync::Arc};

use log::info;

use crate::{
    buffer::BufferPoolManager,
    catalog::Catalog,
    config::BUFFER_POOL_SIZE,
    error::DbError,
    recovery::{LogManager, LogRecovery},
    storage::disk::DiskManager,
    transaction::{DeadlockPolicy, LockManager, TransactionManager, TwoPhaseLockingMode},
    types::DbResult,
};

/// One database instance: the aggregate owning the disk manager, buffer
/// pool, log manager, lock manager, transaction manager and catalog.
///
/// Nothing here is process-global; two instances over different files can
/// coexist, and tests open and drop them freely. Executors receive the
/// pieces they need by reference.
pub struct Database {
    disk: Arc<DiskManager>,
    log_manager: Arc<LogManager>,
    buffer_pool: Arc<BufferPoolManager>,
    lock_manager: Arc<LockManager>,
    txn_manager: Arc<TransactionManager>,
    catalog: Arc<Catalog>,
}

impl Database {
    /// Open the database at `path`, bootstrapping an empty file and
    /// recovering an existing one (WAL replay, then the catalog reload
    /// from page 0).
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Database, DbError> {
        Self::with_pool_size(path, BUFFER_POOL_SIZE)
    }

    pub fn with_pool_size<P: AsRef<Path>>(
        path: P,
        pool_size: usize,
    ) -> Result<Database, DbError> {
        let disk = Arc::new(DiskManager::new(path)?);
        let existing = disk.db_size()? > 0;

        let log_manager = Arc::new(LogManager::new(Arc::clone(&disk)));
        let buffer_pool = Arc::new(BufferPoolManager::new(
            pool_size,
            Arc::clone(&disk),
            Arc::clone(&log_manager),
        ));
        let lock_manager = Arc::new(LockManager::new(
            TwoPhaseLockingMode::Strict,
            DeadlockPolicy::Prevention,
        ));
        let txn_manager = Arc::new(TransactionManager::new(
            Arc::clone(&log_manager),
            Arc::clone(&lock_manager),
        ));

        let catalog = if existing {
            let recovery = LogRecovery::new(Arc::clone(&disk), Arc::clone(&buffer_pool));
            let next_lsn = recovery.recover()?;
            log_manager.reset_lsn(next_lsn);

            Catalog::recover(
                Arc::clone(&buffer_pool),
                Arc::clone(&log_manager),
                Arc::clone(&lock_manager),
            )?
        } else {
            Catalog::bootstrap(
                Arc::clone(&buffer_pool),
                Arc::clone(&log_manager),
                Arc::clone(&lock_manager),
            )?
        };

        log_manager.set_enabled(true);
        info!(
            "database open at {:?} ({})",
            disk.db_path(),
            if existing { "recovered" } else { "bootstrapped" }
        );

        Ok(Database {
            disk,
            log_manager,
            buffer_pool,
            lock_manager,
            txn_manager,
            catalog: Arc::new(catalog),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.buffer_pool
    }

    pub fn txn_manager(&self) -> &Arc<TransactionManager> {
        &self.txn_manager
    }

    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log_manager
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk
    }

    pub fn set_logging_enabled(&self, enabled: bool) {
        self.log_manager.set_enabled(enabled);
    }

    /// Push everything to disk: the log first (WAL rule), then the pages.
    pub fn shutdown(&self) -> DbResult {
        self.log_manager.flush()?;
        self.buffer_pool.flush_all_pages()?;
        Ok(())
    }
}
