use std::fmt;

use crate::{
    io::{ByteReader, ByteWriter, Decodeable, Encodeable},
    types::PageID,
};

/// Record identifier: the page a tuple lives on and its slot there. Stable
/// across in-place updates; a relocated tuple gets a new Rid.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page_id: PageID,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageID, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl Encodeable for Rid {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&self.page_id);
        writer.write(&self.slot);
    }
}

impl Decodeable for Rid {
    fn decode(reader: &mut ByteReader<'_>) -> Self {
        let page_id = reader.read::<i32>();
        let slot = reader.read::<u32>();
        Self { page_id, slot }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

impl fmt::Debug for Rid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
