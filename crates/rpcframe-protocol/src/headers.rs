//! Frame headers.
//!
//! A header body is the fixed sequence of values written right after a frame's
//! start code. Every header writes its fields in one order and reads them back
//! in that same order.

use std::collections::BTreeMap;
use std::fmt;

use crate::codes::FrameKind;
use crate::decoder::ValueSource;
use crate::encoder::ValueEncoder;
use crate::error::{ProtocolError, RemoteError, Result};
use crate::value::Value;

/// Number of direct children (values or nested frames) a frame may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildBounds {
    pub min: usize,
    pub max: usize,
}

impl ChildBounds {
    pub const fn exactly(count: usize) -> Self {
        Self {
            min: count,
            max: count,
        }
    }

    pub const fn at_most(count: usize) -> Self {
        Self { min: 0, max: count }
    }
}

/// Contract shared by every frame header.
pub trait HeaderBody: Sized {
    const KIND: FrameKind;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()>;

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self>;

    /// How many children the frame opened by this header must contain.
    fn child_bounds(&self) -> Result<ChildBounds>;

    /// The payload an indefinite frame announced; `None` for every other frame.
    fn payload(&self) -> Option<IndefiniteKind> {
        None
    }
}

/// Starts a call: method name, argument count and free-form tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestHeader {
    pub method_name: String,
    pub argument_count: usize,
    pub tags: BTreeMap<String, String>,
}

impl RequestHeader {
    pub fn new(method_name: impl Into<String>, argument_count: usize) -> Self {
        Self {
            method_name: method_name.into(),
            argument_count,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

impl HeaderBody for RequestHeader {
    const KIND: FrameKind = FrameKind::Request;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        encoder.write_string(&self.method_name)?;
        encoder.write_count(self.argument_count)?;
        encoder.write_count(self.tags.len())?;
        for (key, value) in &self.tags {
            encoder.write_string(key)?;
            encoder.write_string(value)?;
        }
        Ok(())
    }

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        let method_name = source.read_string()?;
        let argument_count = source.read_count()?;
        let tag_count = source.read_count()?;
        let mut tags = BTreeMap::new();
        for _ in 0..tag_count {
            let key = source.read_string()?;
            let value = source.read_string()?;
            tags.insert(key, value);
        }
        Ok(Self {
            method_name,
            argument_count,
            tags,
        })
    }

    fn child_bounds(&self) -> Result<ChildBounds> {
        Ok(ChildBounds::exactly(self.argument_count))
    }
}

/// Starts a reply. An invalid response carries an error envelope instead of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub is_valid: bool,
}

impl HeaderBody for ResponseHeader {
    const KIND: FrameKind = FrameKind::Response;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        encoder.write_boolean(self.is_valid)
    }

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        Ok(Self {
            is_valid: source.read_boolean()?,
        })
    }

    fn child_bounds(&self) -> Result<ChildBounds> {
        Ok(ChildBounds::at_most(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentHeader {
    pub name: String,
}

impl ArgumentHeader {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl HeaderBody for ArgumentHeader {
    const KIND: FrameKind = FrameKind::Argument;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        encoder.write_string(&self.name)
    }

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        Ok(Self {
            name: source.read_string()?,
        })
    }

    fn child_bounds(&self) -> Result<ChildBounds> {
        Ok(ChildBounds::exactly(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelHeader {
    pub property_count: usize,
}

impl HeaderBody for ModelHeader {
    const KIND: FrameKind = FrameKind::Model;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        encoder.write_count(self.property_count)
    }

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        Ok(Self {
            property_count: source.read_count()?,
        })
    }

    fn child_bounds(&self) -> Result<ChildBounds> {
        Ok(ChildBounds::exactly(self.property_count))
    }
}

/// One model property. A null property has no value between its start and end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyHeader {
    pub name: String,
    pub is_null: bool,
}

impl PropertyHeader {
    pub fn new(name: impl Into<String>, is_null: bool) -> Self {
        Self {
            name: name.into(),
            is_null,
        }
    }
}

impl HeaderBody for PropertyHeader {
    const KIND: FrameKind = FrameKind::Property;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        encoder.write_string(&self.name)?;
        encoder.write_boolean(self.is_null)
    }

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        let name = source.read_string()?;
        let is_null = source.read_boolean()?;
        Ok(Self { name, is_null })
    }

    fn child_bounds(&self) -> Result<ChildBounds> {
        Ok(ChildBounds::exactly(if self.is_null { 0 } else { 1 }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHeader {
    pub item_count: usize,
}

impl HeaderBody for ListHeader {
    const KIND: FrameKind = FrameKind::List;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        encoder.write_count(self.item_count)
    }

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        Ok(Self {
            item_count: source.read_count()?,
        })
    }

    fn child_bounds(&self) -> Result<ChildBounds> {
        Ok(ChildBounds::exactly(self.item_count))
    }
}

/// A map frame holds `item_count` key/value pairs, key first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub item_count: usize,
}

impl HeaderBody for MapHeader {
    const KIND: FrameKind = FrameKind::Map;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        encoder.write_count(self.item_count)
    }

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        Ok(Self {
            item_count: source.read_count()?,
        })
    }

    fn child_bounds(&self) -> Result<ChildBounds> {
        let children = self
            .item_count
            .checked_mul(2)
            .ok_or_else(|| ProtocolError::InvalidCount(i64::try_from(self.item_count).unwrap_or(i64::MAX)))?;
        Ok(ChildBounds::exactly(children))
    }
}

/// Runtime kind of a polymorphic value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndefiniteKind {
    Primitive = 0,
    Enum = 1,
    Model = 2,
    List = 3,
    Map = 4,
    Null = 5,
}

impl IndefiniteKind {
    pub const fn discriminant(self) -> u8 {
        self as u8
    }

    pub fn from_discriminant(value: i64) -> Result<Self> {
        Ok(match value {
            0 => Self::Primitive,
            1 => Self::Enum,
            2 => Self::Model,
            3 => Self::List,
            4 => Self::Map,
            5 => Self::Null,
            other => return Err(ProtocolError::InvalidDiscriminant(other)),
        })
    }

    /// Enum and model values name their declared type.
    pub const fn has_declared_type(self) -> bool {
        matches!(self, Self::Enum | Self::Model)
    }
}

impl fmt::Display for IndefiniteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Primitive => "primitive",
            Self::Enum => "enum",
            Self::Model => "model",
            Self::List => "list",
            Self::Map => "map",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

/// Wraps a value whose kind is only known at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndefiniteHeader {
    pub kind: IndefiniteKind,
    pub declared_type: Option<String>,
}

impl IndefiniteHeader {
    /// Build a header, rejecting a declared type on kinds that have none and
    /// a missing one on enum and model kinds.
    pub fn new(kind: IndefiniteKind, declared_type: Option<String>) -> Result<Self> {
        let header = Self {
            kind,
            declared_type,
        };
        header.validate()?;
        Ok(header)
    }

    pub fn primitive() -> Self {
        Self::untyped(IndefiniteKind::Primitive)
    }

    pub fn null() -> Self {
        Self::untyped(IndefiniteKind::Null)
    }

    pub fn list() -> Self {
        Self::untyped(IndefiniteKind::List)
    }

    pub fn map() -> Self {
        Self::untyped(IndefiniteKind::Map)
    }

    pub fn enumeration(type_name: impl Into<String>) -> Self {
        Self {
            kind: IndefiniteKind::Enum,
            declared_type: Some(type_name.into()),
        }
    }

    pub fn model(type_name: impl Into<String>) -> Self {
        Self {
            kind: IndefiniteKind::Model,
            declared_type: Some(type_name.into()),
        }
    }

    fn untyped(kind: IndefiniteKind) -> Self {
        Self {
            kind,
            declared_type: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.kind.has_declared_type() != self.declared_type.is_some() {
            return Err(ProtocolError::DeclaredTypeMismatch { kind: self.kind });
        }
        Ok(())
    }
}

impl HeaderBody for IndefiniteHeader {
    const KIND: FrameKind = FrameKind::Indefinite;

    fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        self.validate()?;
        encoder.write_integer(i64::from(self.kind.discriminant()))?;
        if let Some(name) = &self.declared_type {
            encoder.write_string(name)?;
        }
        Ok(())
    }

    fn read_body<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        let kind = IndefiniteKind::from_discriminant(source.read_integer()?)?;
        let declared_type = if kind.has_declared_type() {
            Some(source.read_string()?)
        } else {
            None
        };
        Ok(Self {
            kind,
            declared_type,
        })
    }

    fn child_bounds(&self) -> Result<ChildBounds> {
        Ok(ChildBounds::exactly(match self.kind {
            IndefiniteKind::Null => 0,
            _ => 1,
        }))
    }

    fn payload(&self) -> Option<IndefiniteKind> {
        Some(self.kind)
    }
}

const MESSAGE_KEY: &str = "message";

/// Error envelope: one MessagePack map `{"message": text}` in place of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorHeader {
    pub message: String,
}

impl ErrorHeader {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn from_error(err: &dyn std::error::Error) -> Self {
        Self::new(err.to_string())
    }

    /// The local error equivalent of the remote failure.
    pub fn into_error(self) -> RemoteError {
        RemoteError::new(self.message)
    }

    pub fn write(&self, encoder: &mut ValueEncoder) -> Result<()> {
        let envelope = Value::Map(vec![(
            Value::from(MESSAGE_KEY),
            Value::String(self.message.clone()),
        )]);
        encoder.write_value(&envelope)
    }

    pub fn read<S: ValueSource + ?Sized>(source: &mut S) -> Result<Self> {
        match source.next_value()? {
            Value::Map(entries) => entries
                .into_iter()
                .find_map(|(key, value)| match (key, value) {
                    (Value::String(key), Value::String(message)) if key == MESSAGE_KEY => {
                        Some(message)
                    }
                    _ => None,
                })
                .map(Self::new)
                .ok_or(ProtocolError::MissingErrorMessage),
            other => Err(ProtocolError::TypeMismatch {
                expected: "map",
                found: other.type_name(),
            }),
        }
    }
}

/// Any frame header, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Request(RequestHeader),
    Response(ResponseHeader),
    Argument(ArgumentHeader),
    Model(ModelHeader),
    Property(PropertyHeader),
    List(ListHeader),
    Map(MapHeader),
    Indefinite(IndefiniteHeader),
}

impl Header {
    pub fn kind(&self) -> FrameKind {
        match self {
            Header::Request(_) => FrameKind::Request,
            Header::Response(_) => FrameKind::Response,
            Header::Argument(_) => FrameKind::Argument,
            Header::Model(_) => FrameKind::Model,
            Header::Property(_) => FrameKind::Property,
            Header::List(_) => FrameKind::List,
            Header::Map(_) => FrameKind::Map,
            Header::Indefinite(_) => FrameKind::Indefinite,
        }
    }

    pub fn write_body(&self, encoder: &mut ValueEncoder) -> Result<()> {
        match self {
            Header::Request(h) => h.write_body(encoder),
            Header::Response(h) => h.write_body(encoder),
            Header::Argument(h) => h.write_body(encoder),
            Header::Model(h) => h.write_body(encoder),
            Header::Property(h) => h.write_body(encoder),
            Header::List(h) => h.write_body(encoder),
            Header::Map(h) => h.write_body(encoder),
            Header::Indefinite(h) => h.write_body(encoder),
        }
    }

    /// Decode the body that follows a start code of `kind`.
    pub fn read_body<S: ValueSource + ?Sized>(kind: FrameKind, source: &mut S) -> Result<Self> {
        Ok(match kind {
            FrameKind::Request => Header::Request(RequestHeader::read_body(source)?),
            FrameKind::Response => Header::Response(ResponseHeader::read_body(source)?),
            FrameKind::Argument => Header::Argument(ArgumentHeader::read_body(source)?),
            FrameKind::Model => Header::Model(ModelHeader::read_body(source)?),
            FrameKind::Property => Header::Property(PropertyHeader::read_body(source)?),
            FrameKind::List => Header::List(ListHeader::read_body(source)?),
            FrameKind::Map => Header::Map(MapHeader::read_body(source)?),
            FrameKind::Indefinite => Header::Indefinite(IndefiniteHeader::read_body(source)?),
        })
    }

    pub fn child_bounds(&self) -> Result<ChildBounds> {
        match self {
            Header::Request(h) => h.child_bounds(),
            Header::Response(h) => h.child_bounds(),
            Header::Argument(h) => h.child_bounds(),
            Header::Model(h) => h.child_bounds(),
            Header::Property(h) => h.child_bounds(),
            Header::List(h) => h.child_bounds(),
            Header::Map(h) => h.child_bounds(),
            Header::Indefinite(h) => h.child_bounds(),
        }
    }

    pub fn payload(&self) -> Option<IndefiniteKind> {
        match self {
            Header::Indefinite(h) => h.payload(),
            _ => None,
        }
    }
}

macro_rules! header_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Header {
                fn from(header: $ty) -> Self {
                    Header::$variant(header)
                }
            }
        )*
    };
}

header_from!(
    Request(RequestHeader),
    Response(ResponseHeader),
    Argument(ArgumentHeader),
    Model(ModelHeader),
    Property(PropertyHeader),
    List(ListHeader),
    Map(MapHeader),
    Indefinite(IndefiniteHeader),
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ValueDecoder;

    fn roundtrip<H: HeaderBody + PartialEq + fmt::Debug>(header: &H) -> (H, usize) {
        let mut enc = ValueEncoder::new();
        header.write_body(&mut enc).unwrap();
        let values = enc.value_count();
        let mut dec = ValueDecoder::from_bytes(enc.as_bytes());
        let decoded = H::read_body(&mut dec).unwrap();
        assert_eq!(dec.buffered(), 0);
        (decoded, values)
    }

    #[test]
    fn request_roundtrip_with_tags() {
        let header = RequestHeader::new("add", 2)
            .with_tag("trace", "abc")
            .with_tag("auth", "token");
        let (decoded, values) = roundtrip(&header);
        assert_eq!(decoded, header);
        assert_eq!(values, 3 + 4);
    }

    #[test]
    fn request_roundtrip_empty() {
        let header = RequestHeader::new("", 0);
        let (decoded, values) = roundtrip(&header);
        assert_eq!(decoded, header);
        assert_eq!(values, 3);
    }

    #[test]
    fn tag_order_does_not_matter_on_read() {
        let mut enc = ValueEncoder::new();
        enc.write_string("m").unwrap();
        enc.write_count(0).unwrap();
        enc.write_count(2).unwrap();
        for (k, v) in [("z", "1"), ("a", "2")] {
            enc.write_string(k).unwrap();
            enc.write_string(v).unwrap();
        }
        let decoded = RequestHeader::read_body(&mut ValueDecoder::from_bytes(enc.as_bytes())).unwrap();
        assert_eq!(decoded, RequestHeader::new("m", 0).with_tag("a", "2").with_tag("z", "1"));
    }

    #[test]
    fn simple_headers_roundtrip() {
        assert_eq!(roundtrip(&ResponseHeader { is_valid: false }).0.is_valid, false);
        assert_eq!(roundtrip(&ArgumentHeader::new("a")).0.name, "a");
        assert_eq!(roundtrip(&ModelHeader { property_count: 0 }).0.property_count, 0);
        assert_eq!(roundtrip(&ListHeader { item_count: 9 }).0.item_count, 9);
        assert_eq!(roundtrip(&MapHeader { item_count: 3 }).0.item_count, 3);
        let prop = PropertyHeader::new("sum", true);
        assert_eq!(roundtrip(&prop).0, prop);
    }

    #[test]
    fn indefinite_declared_type_only_for_enum_and_model() {
        for header in [
            IndefiniteHeader::primitive(),
            IndefiniteHeader::null(),
            IndefiniteHeader::list(),
            IndefiniteHeader::map(),
        ] {
            let (decoded, values) = roundtrip(&header);
            assert_eq!(decoded, header);
            assert_eq!(values, 1, "{} must not carry a type name", header.kind);
        }

        for header in [
            IndefiniteHeader::enumeration("Color"),
            IndefiniteHeader::model("Point"),
        ] {
            let (decoded, values) = roundtrip(&header);
            assert_eq!(decoded, header);
            assert_eq!(values, 2);
        }
    }

    #[test]
    fn indefinite_discriminants() {
        let kinds = [
            (IndefiniteKind::Primitive, 0),
            (IndefiniteKind::Enum, 1),
            (IndefiniteKind::Model, 2),
            (IndefiniteKind::List, 3),
            (IndefiniteKind::Map, 4),
            (IndefiniteKind::Null, 5),
        ];
        for (kind, raw) in kinds {
            assert_eq!(kind.discriminant(), raw);
            assert_eq!(IndefiniteKind::from_discriminant(i64::from(raw)).unwrap(), kind);
        }
        assert!(matches!(
            IndefiniteKind::from_discriminant(6),
            Err(ProtocolError::InvalidDiscriminant(6))
        ));
    }

    #[test]
    fn inconsistent_indefinite_rejected() {
        assert!(matches!(
            IndefiniteHeader::new(IndefiniteKind::Model, None),
            Err(ProtocolError::DeclaredTypeMismatch { kind: IndefiniteKind::Model })
        ));
        assert!(IndefiniteHeader::new(IndefiniteKind::List, Some("X".into())).is_err());

        let bad = IndefiniteHeader {
            kind: IndefiniteKind::Primitive,
            declared_type: Some("X".into()),
        };
        let mut enc = ValueEncoder::new();
        assert!(bad.write_body(&mut enc).is_err());
    }

    #[test]
    fn child_bounds_follow_header_fields() {
        assert_eq!(
            MapHeader { item_count: 3 }.child_bounds().unwrap(),
            ChildBounds::exactly(6)
        );
        assert_eq!(
            PropertyHeader::new("p", true).child_bounds().unwrap(),
            ChildBounds::exactly(0)
        );
        assert_eq!(
            IndefiniteHeader::null().child_bounds().unwrap(),
            ChildBounds::exactly(0)
        );
        assert_eq!(
            ResponseHeader { is_valid: true }.child_bounds().unwrap(),
            ChildBounds::at_most(1)
        );
        assert!(MapHeader { item_count: usize::MAX }.child_bounds().is_err());
    }

    #[test]
    fn error_envelope_roundtrip() {
        let header = ErrorHeader::new("division by zero");
        let mut enc = ValueEncoder::new();
        header.write(&mut enc).unwrap();
        assert_eq!(enc.value_count(), 1);

        let decoded = ErrorHeader::read(&mut ValueDecoder::from_bytes(enc.as_bytes())).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.into_error().to_string(), "division by zero");
    }

    #[test]
    fn error_envelope_without_message() {
        let mut enc = ValueEncoder::new();
        enc.write_value(&Value::Map(vec![(Value::from("code"), Value::from(3i64))]))
            .unwrap();
        let err = ErrorHeader::read(&mut ValueDecoder::from_bytes(enc.as_bytes())).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingErrorMessage));
    }

    #[test]
    fn header_enum_dispatch() {
        let header = Header::from(RequestHeader::new("ping", 0));
        assert_eq!(header.kind(), FrameKind::Request);
        let mut enc = ValueEncoder::new();
        header.write_body(&mut enc).unwrap();
        let decoded = Header::read_body(FrameKind::Request, &mut ValueDecoder::from_bytes(enc.as_bytes())).unwrap();
        assert_eq!(decoded, header);
    }
}
