use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, Serializer};

use crate::codes::HeaderCode;
use crate::error::Result;
use crate::value::Value;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Appends MessagePack values to an in-memory message buffer.
///
/// Each `write_*` call emits exactly one value. Structure is left to the caller;
/// [`Protocol`](crate::Protocol) uses this to lay out frames.
#[derive(Debug)]
pub struct ValueEncoder {
    buf: BytesMut,
    values: usize,
}

impl Default for ValueEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueEncoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            values: 0,
        }
    }

    fn put<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let mut writer = (&mut self.buf).writer();
        rmp_serde::encode::write(&mut writer, value)?;
        self.values += 1;
        Ok(())
    }

    pub fn write_header_code(&mut self, code: HeaderCode) -> Result<()> {
        self.put(&code.code())
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.put(value)
    }

    pub fn write_boolean(&mut self, value: bool) -> Result<()> {
        self.put(&value)
    }

    pub fn write_integer(&mut self, value: i64) -> Result<()> {
        self.put(&value)
    }

    /// Counts travel as unsigned integers.
    pub fn write_count(&mut self, value: usize) -> Result<()> {
        self.put(&(value as u64))
    }

    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.put(&value)
    }

    pub fn write_double(&mut self, value: f64) -> Result<()> {
        self.put(&value)
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.put(&value)
    }

    /// Enum values travel as their ordinal.
    pub fn write_enum(&mut self, ordinal: i64) -> Result<()> {
        self.put(&ordinal)
    }

    pub fn write_binary(&mut self, value: &[u8]) -> Result<()> {
        self.put(&Binary(value))
    }

    pub fn write_nil(&mut self) -> Result<()> {
        self.put(&())
    }

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.put(value)
    }

    /// Number of values written so far.
    pub fn value_count(&self) -> usize {
        self.values
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Forces the MessagePack bin family instead of an array of integers.
struct Binary<'a>(&'a [u8]);

impl Serialize for Binary<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_write_is_one_value() {
        let mut enc = ValueEncoder::new();
        enc.write_header_code(HeaderCode::RequestStart).unwrap();
        enc.write_string("add").unwrap();
        enc.write_count(2).unwrap();
        enc.write_boolean(true).unwrap();
        assert_eq!(enc.value_count(), 4);
    }

    #[test]
    fn header_code_is_positive_fixint() {
        let mut enc = ValueEncoder::new();
        enc.write_header_code(HeaderCode::IndefiniteEnd).unwrap();
        assert_eq!(enc.as_bytes(), &[0x0d]);
    }

    #[test]
    fn binary_uses_bin_family() {
        let mut enc = ValueEncoder::new();
        enc.write_binary(&[1, 2, 3]).unwrap();
        assert_eq!(enc.as_bytes(), &[0xc4, 0x03, 1, 2, 3]);
    }

    #[test]
    fn nil_and_string_layout() {
        let mut enc = ValueEncoder::new();
        enc.write_nil().unwrap();
        enc.write_string("a").unwrap();
        assert_eq!(enc.finish().as_ref(), &[0xc0, 0xa1, b'a']);
    }

    #[test]
    fn float_and_double_keep_width() {
        let mut enc = ValueEncoder::new();
        enc.write_float(1.0).unwrap();
        assert_eq!(enc.as_bytes()[0], 0xca);
        let mut enc = ValueEncoder::new();
        enc.write_double(1.0).unwrap();
        assert_eq!(enc.as_bytes()[0], 0xcb);
    }
}
