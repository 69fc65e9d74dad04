use std::convert::TryInto;
use std::mem::size_of;

/// A value that knows how to serialize itself into a [`ByteWriter`].
///
/// All on-disk formats of the crate (tuples, page headers, the catalog
/// page, log records) go through this trait, so the byte order is
/// little-endian in exactly one place.
pub trait Encodeable {
    fn encode(&self, writer: &mut ByteWriter);
}

/// The inverse of [`Encodeable`].
pub trait Decodeable: Sized {
    fn decode(reader: &mut ByteReader<'_>) -> Self;
}

/// Append-only byte buffer used to build serialized values.
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, value: &T) {
        value.encode(self);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Return the content padded with zeroes up to `size` bytes. Panics if
    /// the content is already larger, since a fixed-size frame cannot hold
    /// it.
    pub fn into_padded_bytes(mut self, size: usize) -> Vec<u8> {
        if self.buf.len() > size {
            panic!(
                "serialized content exceeds the frame: {} > {}",
                self.buf.len(),
                size
            );
        }
        self.buf.resize(size, 0);
        self.buf
    }
}

/// Cursor over a byte slice. Reading past the end is a caller bug and
/// panics; length checks belong to the caller (see `remaining`).
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn read<T: Decodeable>(&mut self) -> T {
        T::decode(self)
    }

    pub fn read_bytes(&mut self, count: usize) -> &'a [u8] {
        let start = self.pos;
        self.pos += count;
        &self.buf[start..self.pos]
    }

    pub fn skip(&mut self, count: usize) {
        self.pos += count;
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

macro_rules! impl_codec {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode(&self, writer: &mut ByteWriter) {
                    writer.write_bytes(&self.to_le_bytes());
                }
            }

            impl Decodeable for $t {
                fn decode(reader: &mut ByteReader<'_>) -> Self {
                    let bytes = reader.read_bytes(size_of::<Self>());
                    Self::from_le_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    }
}

impl_codec!(for u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Encodeable for bool {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_bytes(&[*self as u8]);
    }
}

impl Decodeable for bool {
    fn decode(reader: &mut ByteReader<'_>) -> Self {
        reader.read::<u8>() == 1
    }
}

/// Strings are a u32 length prefix followed by UTF-8 bytes, the same shape
/// varchar cells and catalog names use on disk.
impl Encodeable for String {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write(&(self.len() as u32));
        writer.write_bytes(self.as_bytes());
    }
}

impl Decodeable for String {
    fn decode(reader: &mut ByteReader<'_>) -> Self {
        let len = reader.read::<u32>() as usize;
        let bytes = reader.read_bytes(len);
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}

/// Write a little-endian u32 into a page buffer at a fixed offset.
pub fn write_u32_at(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

pub fn write_u64_at(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn read_u64_at(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

pub fn write_i32_at(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn read_i32_at(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}
