use std::{cmp::Ordering, fmt};

use crate::{
    io::{ByteReader, ByteWriter},
    types::TypeId,
};

/// A single typed column value.
///
/// Wire formats: `Boolean` is one byte, `Integer` four bytes little-endian,
/// `Varchar` a u32 length prefix followed by UTF-8 bytes.
#[derive(Clone, PartialEq)]
pub enum Cell {
    Boolean(bool),
    Integer(i32),
    Varchar(String),
}

impl Cell {
    pub fn type_id(&self) -> TypeId {
        match self {
            Cell::Boolean(_) => TypeId::Boolean,
            Cell::Integer(_) => TypeId::Integer,
            Cell::Varchar(_) => TypeId::Varchar,
        }
    }

    pub fn encode(&self, writer: &mut ByteWriter) {
        match self {
            Cell::Boolean(v) => writer.write(v),
            Cell::Integer(v) => writer.write(v),
            Cell::Varchar(v) => writer.write(v),
        }
    }

    pub fn decode(reader: &mut ByteReader<'_>, type_id: TypeId) -> Cell {
        match type_id {
            TypeId::Boolean => Cell::Boolean(reader.read::<bool>()),
            TypeId::Integer => Cell::Integer(reader.read::<i32>()),
            TypeId::Varchar => Cell::Varchar(reader.read::<String>()),
            other => panic!("unsupported column type: {:?}", other),
        }
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Cell::Boolean(_) => 1,
            Cell::Integer(_) => 4,
            Cell::Varchar(v) => 4 + v.len(),
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Cell::Boolean(v) => *v,
            Cell::Integer(v) => *v != 0,
            Cell::Varchar(v) => !v.is_empty(),
        }
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Cell::Boolean(a), Cell::Boolean(b)) => a.partial_cmp(b),
            (Cell::Integer(a), Cell::Integer(b)) => a.partial_cmp(b),
            (Cell::Varchar(a), Cell::Varchar(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Boolean(v) => write!(f, "{}", v),
            Cell::Integer(v) => write!(f, "{}", v),
            Cell::Varchar(v) => write!(f, "'{}'", v),
        }
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
