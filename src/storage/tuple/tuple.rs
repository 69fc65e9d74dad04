use std::fmt;

use crate::{
    catalog::Schema,
    io::{ByteReader, ByteWriter},
    storage::tuple::Cell,
};

/// A schema-typed row: cells in the schema's column order, serialized by
/// packing each cell's wire form back to back.
#[derive(Clone, PartialEq)]
pub struct Tuple {
    cells: Vec<Cell>,
}

impl Tuple {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn from_bytes(bytes: &[u8], schema: &Schema) -> Self {
        let mut reader = ByteReader::new(bytes);
        let cells = schema
            .columns()
            .iter()
            .map(|column| Cell::decode(&mut reader, column.type_id()))
            .collect();
        Self { cells }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        for cell in &self.cells {
            cell.encode(&mut writer);
        }
        writer.into_bytes()
    }

    pub fn cell(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn size(&self) -> usize {
        self.cells.iter().map(Cell::size).sum()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", cell)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
