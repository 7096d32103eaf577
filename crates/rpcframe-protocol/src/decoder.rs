use std::io::{Cursor, ErrorKind};

use bytes::{Buf, BytesMut};
use serde::Deserialize;

use crate::codes::HeaderCode;
use crate::error::{ProtocolError, Result};
use crate::value::Value;

/// Incremental MessagePack decoder.
///
/// Bytes are pushed in arbitrary chunks; [`ValueDecoder::decode_next`] yields a
/// value once all of its bytes have arrived and leaves partial values buffered.
#[derive(Debug, Default)]
pub struct ValueDecoder {
    buf: BytesMut,
}

impl ValueDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder over one complete message.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(bytes),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete value, or `None` if more bytes are needed.
    pub fn decode_next(&mut self) -> Result<Option<Value>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&self.buf[..]);
        let decoded = {
            let mut de = rmp_serde::Deserializer::new(&mut cursor);
            Value::deserialize(&mut de)
        };

        match decoded {
            Ok(value) => {
                let consumed = cursor.position() as usize;
                self.buf.advance(consumed);
                Ok(Some(value))
            }
            Err(err) if is_incomplete(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

fn is_incomplete(err: &rmp_serde::decode::Error) -> bool {
    use rmp_serde::decode::Error;
    match err {
        Error::InvalidMarkerRead(io) | Error::InvalidDataRead(io) => {
            io.kind() == ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

/// A sequential source of decoded values.
///
/// Typed reads consume exactly one value and fail with
/// [`ProtocolError::TypeMismatch`] when its shape is wrong.
pub trait ValueSource {
    /// The next value, or [`ProtocolError::TruncatedMessage`] when none remain.
    fn next_value(&mut self) -> Result<Value>;

    fn read_string(&mut self) -> Result<String> {
        self.next_value()?.into_string()
    }

    fn read_boolean(&mut self) -> Result<bool> {
        self.next_value()?.as_boolean()
    }

    fn read_integer(&mut self) -> Result<i64> {
        self.next_value()?.as_integer()
    }

    /// A non-negative element count.
    fn read_count(&mut self) -> Result<usize> {
        let count = self.read_integer()?;
        usize::try_from(count).map_err(|_| ProtocolError::InvalidCount(count))
    }

    fn read_float(&mut self) -> Result<f32> {
        self.next_value()?.as_float()
    }

    fn read_double(&mut self) -> Result<f64> {
        self.next_value()?.as_double()
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.next_value()?.as_byte()
    }

    fn read_enum(&mut self) -> Result<i64> {
        self.read_integer()
    }

    fn read_binary(&mut self) -> Result<Vec<u8>> {
        self.next_value()?.into_binary()
    }

    fn read_nil(&mut self) -> Result<()> {
        self.next_value()?.expect_nil()
    }

    /// Read a header code and check it is `expected`.
    fn expect_header_code(&mut self, expected: HeaderCode) -> Result<()> {
        let found = self.read_integer()?;
        if found != i64::from(expected.code()) {
            return Err(ProtocolError::UnexpectedHeaderCode { expected, found });
        }
        Ok(())
    }
}

impl<S: ValueSource + ?Sized> ValueSource for &mut S {
    fn next_value(&mut self) -> Result<Value> {
        (**self).next_value()
    }
}

impl ValueSource for ValueDecoder {
    fn next_value(&mut self) -> Result<Value> {
        self.decode_next()?.ok_or(ProtocolError::TruncatedMessage)
    }
}

impl Iterator for ValueDecoder {
    type Item = Result<Value>;

    /// Yields values until the buffer is drained. Leftover partial bytes end
    /// the iteration with [`ProtocolError::TruncatedMessage`].
    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        match self.decode_next() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.buf.clear();
                Some(Err(ProtocolError::TruncatedMessage))
            }
            Err(err) => {
                self.buf.clear();
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ValueEncoder;

    fn sample() -> Vec<u8> {
        let mut enc = ValueEncoder::new();
        enc.write_header_code(HeaderCode::RequestStart).unwrap();
        enc.write_string("a fairly long method name for chunking").unwrap();
        enc.write_count(2).unwrap();
        enc.write_double(3.25).unwrap();
        enc.write_binary(&[9; 40]).unwrap();
        enc.finish().to_vec()
    }

    #[test]
    fn decodes_complete_buffer() {
        let mut dec = ValueDecoder::from_bytes(&sample());
        assert_eq!(dec.read_integer().unwrap(), 0);
        assert_eq!(
            dec.read_string().unwrap(),
            "a fairly long method name for chunking"
        );
        assert_eq!(dec.read_count().unwrap(), 2);
        assert_eq!(dec.read_double().unwrap(), 3.25);
        assert_eq!(dec.read_binary().unwrap(), vec![9; 40]);
        assert!(matches!(
            dec.next_value(),
            Err(ProtocolError::TruncatedMessage)
        ));
    }

    #[test]
    fn partial_values_wait_for_more_bytes() {
        let bytes = sample();
        let mut dec = ValueDecoder::new();
        let mut values = Vec::new();
        for byte in &bytes {
            dec.push(std::slice::from_ref(byte));
            while let Some(value) = dec.decode_next().unwrap() {
                values.push(value);
            }
        }
        assert_eq!(values.len(), 5);
        assert_eq!(dec.buffered(), 0);
    }

    #[test]
    fn negative_count_rejected() {
        let mut enc = ValueEncoder::new();
        enc.write_integer(-3).unwrap();
        let mut dec = ValueDecoder::from_bytes(enc.as_bytes());
        assert!(matches!(
            dec.read_count(),
            Err(ProtocolError::InvalidCount(-3))
        ));
    }

    #[test]
    fn unexpected_header_code_reported() {
        let mut enc = ValueEncoder::new();
        enc.write_header_code(HeaderCode::ModelEnd).unwrap();
        let mut dec = ValueDecoder::from_bytes(enc.as_bytes());
        let err = dec.expect_header_code(HeaderCode::PropertyStart).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnexpectedHeaderCode {
                expected: HeaderCode::PropertyStart,
                found: 7
            }
        ));
    }

    #[test]
    fn iterator_flags_truncated_tail() {
        let mut bytes = sample();
        bytes.truncate(bytes.len() - 3);
        let results: Vec<_> = ValueDecoder::from_bytes(&bytes).collect();
        assert_eq!(results.len(), 5);
        assert!(results[..4].iter().all(|r| r.is_ok()));
        assert!(matches!(
            results[4],
            Err(ProtocolError::TruncatedMessage)
        ));
    }

    #[test]
    fn reserved_marker_is_a_decode_error() {
        let mut dec = ValueDecoder::from_bytes(&[0xc1]);
        assert!(matches!(dec.decode_next(), Err(ProtocolError::Decode(_))));
    }
}
