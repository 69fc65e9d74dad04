mod lock_manager;
mod rw_latch;
mod transaction;
mod transaction_manager;

pub use lock_manager::{DeadlockPolicy, LockManager, TwoPhaseLockingMode};
pub use rw_latch::ReaderWriterLatch;
pub use transaction::{Transaction, TransactionState, WriteRecord, WriteType};
pub use transaction_manager::TransactionManager;
