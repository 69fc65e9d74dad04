use std::fmt;

use crate::{
    config::INVALID_LSN,
    io::{ByteReader, ByteWriter, Encodeable},
    storage::page::Rid,
    types::{PageID, TxnID, LSN},
};

/// Every log record starts with a fixed header:
/// `{size: u32, lsn: i32, txn_id: i32, prev_lsn: i32, type: u32}`.
pub const LOG_RECORD_HEADER_SIZE: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LogRecordType {
    Invalid = 0,
    Insert = 1,
    MarkDelete = 2,
    ApplyDelete = 3,
    RollbackDelete = 4,
    Update = 5,
    Begin = 6,
    Commit = 7,
    Abort = 8,
    NewPage = 9,
}

impl LogRecordType {
    pub fn from_u32(value: u32) -> Option<LogRecordType> {
        match value {
            1 => Some(LogRecordType::Insert),
            2 => Some(LogRecordType::MarkDelete),
            3 => Some(LogRecordType::ApplyDelete),
            4 => Some(LogRecordType::RollbackDelete),
            5 => Some(LogRecordType::Update),
            6 => Some(LogRecordType::Begin),
            7 => Some(LogRecordType::Commit),
            8 => Some(LogRecordType::Abort),
            9 => Some(LogRecordType::NewPage),
            _ => None,
        }
    }
}

/// Type-dependent payload carried after the record header.
#[derive(Clone, PartialEq, Debug)]
pub enum LogPayload {
    /// Insert / MarkDelete / ApplyDelete / RollbackDelete: the affected
    /// tuple. For the delete family this is the pre-image used by physical
    /// undo.
    Tuple { rid: Rid, data: Vec<u8> },

    /// Update: pre- and post-image.
    Update {
        rid: Rid,
        old_data: Vec<u8>,
        new_data: Vec<u8>,
    },

    /// NewPage: the page the fresh page was linked after.
    NewPage { prev_page_id: PageID },

    /// Begin / Commit / Abort carry nothing.
    Txn,
}

#[derive(Clone, PartialEq)]
pub struct LogRecord {
    pub lsn: LSN,
    pub txn_id: TxnID,
    pub prev_lsn: LSN,
    pub record_type: LogRecordType,
    pub payload: LogPayload,
}

impl LogRecord {
    pub fn new_txn(record_type: LogRecordType, txn_id: TxnID, prev_lsn: LSN) -> Self {
        Self {
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            record_type,
            payload: LogPayload::Txn,
        }
    }

    pub fn new_tuple(
        record_type: LogRecordType,
        txn_id: TxnID,
        prev_lsn: LSN,
        rid: Rid,
        data: Vec<u8>,
    ) -> Self {
        Self {
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            record_type,
            payload: LogPayload::Tuple { rid, data },
        }
    }

    pub fn new_update(
        txn_id: TxnID,
        prev_lsn: LSN,
        rid: Rid,
        old_data: Vec<u8>,
        new_data: Vec<u8>,
    ) -> Self {
        Self {
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            record_type: LogRecordType::Update,
            payload: LogPayload::Update {
                rid,
                old_data,
                new_data,
            },
        }
    }

    pub fn new_new_page(txn_id: TxnID, prev_lsn: LSN, prev_page_id: PageID) -> Self {
        Self {
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            record_type: LogRecordType::NewPage,
            payload: LogPayload::NewPage { prev_page_id },
        }
    }

    /// Total serialized size, header included.
    pub fn size(&self) -> usize {
        let payload = match &self.payload {
            LogPayload::Tuple { data, .. } => 8 + 4 + data.len(),
            LogPayload::Update {
                old_data, new_data, ..
            } => 8 + 4 + old_data.len() + 4 + new_data.len(),
            LogPayload::NewPage { .. } => 4,
            LogPayload::Txn => 0,
        };
        LOG_RECORD_HEADER_SIZE + payload
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write(&(self.size() as u32));
        writer.write(&self.lsn);
        writer.write(&self.txn_id);
        writer.write(&self.prev_lsn);
        writer.write(&(self.record_type as u32));

        match &self.payload {
            LogPayload::Tuple { rid, data } => {
                writer.write(rid);
                writer.write(&(data.len() as u32));
                writer.write_bytes(data);
            }
            LogPayload::Update {
                rid,
                old_data,
                new_data,
            } => {
                writer.write(rid);
                writer.write(&(old_data.len() as u32));
                writer.write_bytes(old_data);
                writer.write(&(new_data.len() as u32));
                writer.write_bytes(new_data);
            }
            LogPayload::NewPage { prev_page_id } => {
                writer.write(prev_page_id);
            }
            LogPayload::Txn => {}
        }

        writer.into_bytes()
    }

    /// Decode one record from `buf`. Returns `None` when `buf` holds no
    /// complete record, which recovery treats as the end of an interrupted
    /// group flush.
    pub fn decode(buf: &[u8]) -> Option<LogRecord> {
        if buf.len() < LOG_RECORD_HEADER_SIZE {
            return None;
        }

        let mut reader = ByteReader::new(buf);
        let size = reader.read::<u32>() as usize;
        if size < LOG_RECORD_HEADER_SIZE || size > buf.len() {
            return None;
        }

        let lsn = reader.read::<i32>();
        let txn_id = reader.read::<i32>();
        let prev_lsn = reader.read::<i32>();
        let record_type = LogRecordType::from_u32(reader.read::<u32>())?;

        let payload = match record_type {
            LogRecordType::Insert
            | LogRecordType::MarkDelete
            | LogRecordType::ApplyDelete
            | LogRecordType::RollbackDelete => {
                if reader.remaining() < 12 {
                    return None;
                }
                let rid = reader.read::<Rid>();
                let len = reader.read::<u32>() as usize;
                if reader.remaining() < len {
                    return None;
                }
                let data = reader.read_bytes(len).to_vec();
                LogPayload::Tuple { rid, data }
            }
            LogRecordType::Update => {
                if reader.remaining() < 12 {
                    return None;
                }
                let rid = reader.read::<Rid>();
                let old_len = reader.read::<u32>() as usize;
                if reader.remaining() < old_len + 4 {
                    return None;
                }
                let old_data = reader.read_bytes(old_len).to_vec();
                let new_len = reader.read::<u32>() as usize;
                if reader.remaining() < new_len {
                    return None;
                }
                let new_data = reader.read_bytes(new_len).to_vec();
                LogPayload::Update {
                    rid,
                    old_data,
                    new_data,
                }
            }
            LogRecordType::NewPage => {
                if reader.remaining() < 4 {
                    return None;
                }
                LogPayload::NewPage {
                    prev_page_id: reader.read::<i32>(),
                }
            }
            _ => LogPayload::Txn,
        };

        Some(LogRecord {
            lsn,
            txn_id,
            prev_lsn,
            record_type,
            payload,
        })
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:?}(lsn={}, txn={}, prev={})",
            self.record_type, self.lsn, self.txn_id, self.prev_lsn
        )
    }
}
