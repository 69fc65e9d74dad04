mod log_manager;
mod log_record;
mod log_recovery;

pub use log_manager::LogManager;
pub use log_record::{LogPayload, LogRecord, LogRecordType, LOG_RECORD_HEADER_SIZE};
pub use log_recovery::LogRecovery;
