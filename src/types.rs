use std::sync::{Arc, RwLock};

use crate::error::DbError;

/// Shared, latch-protected ownership of a value. Frames in the buffer pool
/// are handed out as `Pod<Page>`; the inner `RwLock` is the page latch.
pub type Pod<T> = Arc<RwLock<T>>;

pub type DbResult = Result<(), DbError>;

/// Page identifier. Negative values are invalid; page 0 is the catalog.
pub type PageID = i32;

/// Index of a frame inside the buffer pool.
pub type FrameID = usize;

/// Transaction identifier, assigned monotonically starting at 1.
pub type TxnID = i32;

/// Log sequence number.
pub type LSN = i32;

/// Object (table) identifier, assigned monotonically starting at 1.
pub type OID = u32;

/// Column type tags. The discriminants are the on-disk encoding used by the
/// catalog page, so they must not be renumbered.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypeId {
    Boolean = 1,
    Tinyint = 2,
    Smallint = 3,
    Integer = 4,
    Bigint = 5,
    Decimal = 6,
    Timestamp = 7,
    Varchar = 8,
}

impl TypeId {
    pub fn from_u32(value: u32) -> Option<TypeId> {
        match value {
            1 => Some(TypeId::Boolean),
            2 => Some(TypeId::Tinyint),
            3 => Some(TypeId::Smallint),
            4 => Some(TypeId::Integer),
            5 => Some(TypeId::Bigint),
            6 => Some(TypeId::Decimal),
            7 => Some(TypeId::Timestamp),
            8 => Some(TypeId::Varchar),
            _ => None,
        }
    }
}
