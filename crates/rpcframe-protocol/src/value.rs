//! Owned MessagePack values.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{ProtocolError, Result};

/// One self-describing MessagePack value as it appears on the wire.
///
/// Integers that fit in `i64` always decode as [`Value::Integer`]; only unsigned
/// values above `i64::MAX` use [`Value::UInteger`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    UInteger(u64),
    F32(f32),
    F64(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Short MessagePack type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::UInteger(_) => "integer",
            Value::F32(_) => "float32",
            Value::F64(_) => "float64",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }

    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(mismatch("boolean", other)),
        }
    }

    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::UInteger(u) => Err(ProtocolError::OutOfRange {
                expected: "i64",
                value: u.to_string(),
            }),
            other => Err(mismatch("integer", other)),
        }
    }

    /// Accepts any numeric value. Doubles and integers are narrowed.
    pub fn as_float(&self) -> Result<f32> {
        match self {
            Value::F32(f) => Ok(*f),
            Value::F64(d) => Ok(*d as f32),
            Value::Integer(i) => Ok(*i as f32),
            Value::UInteger(u) => Ok(*u as f32),
            other => Err(mismatch("float", other)),
        }
    }

    /// Accepts any numeric value.
    pub fn as_double(&self) -> Result<f64> {
        match self {
            Value::F64(d) => Ok(*d),
            Value::F32(f) => Ok(f64::from(*f)),
            Value::Integer(i) => Ok(*i as f64),
            Value::UInteger(u) => Ok(*u as f64),
            other => Err(mismatch("double", other)),
        }
    }

    pub fn as_byte(&self) -> Result<u8> {
        let value = self.as_integer()?;
        u8::try_from(value).map_err(|_| ProtocolError::OutOfRange {
            expected: "byte",
            value: value.to_string(),
        })
    }

    pub fn into_binary(self) -> Result<Vec<u8>> {
        match self {
            Value::Binary(b) => Ok(b),
            other => Err(mismatch("binary", &other)),
        }
    }

    pub fn expect_nil(&self) -> Result<()> {
        match self {
            Value::Nil => Ok(()),
            other => Err(mismatch("nil", other)),
        }
    }
}

fn mismatch(expected: &'static str, found: &Value) -> ProtocolError {
    ProtocolError::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::UInteger(u) => write!(f, "{u}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::UInteger(value),
        }
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::UInteger(u) => serializer.serialize_u64(*u),
            Value::F32(f) => serializer.serialize_f32(*f),
            Value::F64(d) => serializer.serialize_f64(*d),
            Value::String(s) => serializer.serialize_str(s),
            Value::Binary(b) => serializer.serialize_bytes(b),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any MessagePack value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_f32<E: de::Error>(self, v: f32) -> std::result::Result<Value, E> {
        Ok(Value::F32(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::F64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Value, E> {
        Ok(Value::Binary(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Value, E> {
        Ok(Value::Binary(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Nil)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Nil)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Value, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0).min(4096));
        while let Some(entry) = map.next_entry()? {
            entries.push(entry);
        }
        Ok(Value::Map(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_values_fold_into_integer_when_they_fit() {
        assert_eq!(Value::from(7u64), Value::Integer(7));
        assert_eq!(Value::from(u64::MAX), Value::UInteger(u64::MAX));
    }

    #[test]
    fn integer_accessor_rejects_oversized_unsigned() {
        let err = Value::UInteger(u64::MAX).as_integer().unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfRange { expected: "i64", .. }));
    }

    #[test]
    fn byte_accessor_checks_range() {
        assert_eq!(Value::Integer(255).as_byte().unwrap(), 255);
        assert!(matches!(
            Value::Integer(256).as_byte(),
            Err(ProtocolError::OutOfRange { expected: "byte", .. })
        ));
        assert!(Value::Integer(-1).as_byte().is_err());
    }

    #[test]
    fn floats_accept_any_number() {
        assert_eq!(Value::Integer(3).as_double().unwrap(), 3.0);
        assert_eq!(Value::F32(1.5).as_double().unwrap(), 1.5);
        assert_eq!(Value::F64(2.5).as_float().unwrap(), 2.5);
        assert!(Value::String("1.0".into()).as_double().is_err());
    }

    #[test]
    fn mismatch_reports_found_type() {
        let err = Value::Boolean(true).into_string().unwrap_err();
        match err {
            ProtocolError::TypeMismatch { expected, found } => {
                assert_eq!(expected, "string");
                assert_eq!(found, "boolean");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn msgpack_roundtrip_preserves_shape() {
        let value = Value::Map(vec![
            (Value::from("name"), Value::from("add")),
            (Value::from("bin"), Value::Binary(vec![0, 1, 2])),
            (
                Value::from("items"),
                Value::Array(vec![Value::Nil, Value::F32(0.5), Value::F64(-2.25)]),
            ),
            (Value::from("big"), Value::UInteger(u64::MAX)),
            (Value::from("neg"), Value::Integer(-40_000)),
        ]);

        let bytes = rmp_serde::to_vec(&value).unwrap();
        let decoded: Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn small_integers_encode_compactly() {
        assert_eq!(rmp_serde::to_vec(&Value::Integer(3)).unwrap(), vec![0x03]);
        assert_eq!(rmp_serde::to_vec(&Value::Nil).unwrap(), vec![0xc0]);
    }

    #[test]
    fn display_is_readable() {
        let value = Value::Array(vec![Value::from(1i64), Value::from("x")]);
        assert_eq!(value.to_string(), "[1, \"x\"]");
    }
}
