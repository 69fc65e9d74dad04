use std::{error::Error, fmt};

use backtrace::Backtrace;

#[derive(Clone, PartialEq)]
pub enum DbError {
    /// An underlying file operation failed. Fatal for the operation.
    Io(String),

    /// Every frame in the buffer pool is pinned; the caller has to release
    /// a pin and retry.
    NoVictim,

    /// The tuple does not fit into the page's remaining free space.
    PageFull,

    /// An in-place update was impossible on the tuple's page.
    TupleUpdateFailed(String),

    /// Unknown table oid or name.
    TableNotFound(String),

    /// A lock request timed out.
    LockTimeout(String),

    /// A violated internal invariant.
    Internal(String),
}

impl DbError {
    pub fn io(err: std::io::Error) -> DbError {
        DbError::Io(err.to_string())
    }

    pub fn internal(msg: &str) -> DbError {
        DbError::Internal(msg.to_string())
    }

    /// Print the current backtrace to stderr, used when an error escapes to
    /// a place where the call path is no longer obvious.
    pub fn show_backtrace(&self) {
        let bt = Backtrace::new();
        eprintln!("{}\n{:?}", self, bt);
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbError::Io(msg) => write!(f, "io error: {}", msg),
            DbError::NoVictim => write!(f, "all frames are pinned"),
            DbError::PageFull => write!(f, "not enough free space on page"),
            DbError::TupleUpdateFailed(msg) => {
                write!(f, "tuple update failed: {}", msg)
            }
            DbError::TableNotFound(name) => {
                write!(f, "table not found: {}", name)
            }
            DbError::LockTimeout(msg) => write!(f, "lock timeout: {}", msg),
            DbError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl fmt::Debug for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::io(err)
    }
}
