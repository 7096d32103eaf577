//! Self-describing value trees.
//!
//! A [`Datum`] travels as nested indefinite frames: every value, including each
//! list item, map key, map value and model property, carries its own runtime
//! kind so a reader needs nothing but the registry to rebuild it.

use std::fmt;

use crate::error::{ProtocolError, Result};
use crate::headers::{IndefiniteHeader, IndefiniteKind};
use crate::registry::DeclaredKind;
use crate::session::Protocol;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Primitive(Value),
    Enum(EnumValue),
    Model(ModelValue),
    List(Vec<Datum>),
    Map(Vec<(Datum, Datum)>),
}

/// An enum value, sent as its ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub type_name: String,
    pub ordinal: i64,
}

impl EnumValue {
    pub fn new(type_name: impl Into<String>, ordinal: i64) -> Self {
        Self {
            type_name: type_name.into(),
            ordinal,
        }
    }
}

/// A model instance. Properties keep their declaration order; `None` is a null property.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelValue {
    pub type_name: String,
    pub properties: Vec<(String, Option<Datum>)>,
}

impl ModelValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Datum>) -> Self {
        self.properties.push((name.into(), Some(value.into())));
        self
    }

    pub fn with_null(mut self, name: impl Into<String>) -> Self {
        self.properties.push((name.into(), None));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_ref())
    }
}

impl Datum {
    /// The indefinite kind this value is framed with.
    pub fn kind(&self) -> IndefiniteKind {
        match self {
            Datum::Null => IndefiniteKind::Null,
            Datum::Primitive(_) => IndefiniteKind::Primitive,
            Datum::Enum(_) => IndefiniteKind::Enum,
            Datum::Model(_) => IndefiniteKind::Model,
            Datum::List(_) => IndefiniteKind::List,
            Datum::Map(_) => IndefiniteKind::Map,
        }
    }

    pub fn as_primitive(&self) -> Option<&Value> {
        match self {
            Datum::Primitive(value) => Some(value),
            _ => None,
        }
    }

    fn header(&self) -> IndefiniteHeader {
        match self {
            Datum::Null => IndefiniteHeader::null(),
            Datum::Primitive(_) => IndefiniteHeader::primitive(),
            Datum::Enum(value) => IndefiniteHeader::enumeration(&value.type_name),
            Datum::Model(value) => IndefiniteHeader::model(&value.type_name),
            Datum::List(_) => IndefiniteHeader::list(),
            Datum::Map(_) => IndefiniteHeader::map(),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("null"),
            Datum::Primitive(value) => write!(f, "{value}"),
            Datum::Enum(value) => write!(f, "{}({})", value.type_name, value.ordinal),
            Datum::Model(model) => {
                write!(f, "{} {{", model.type_name)?;
                for (i, (name, value)) in model.properties.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match value {
                        Some(value) => write!(f, " {name}: {value}")?,
                        None => write!(f, " {name}: null")?,
                    }
                }
                f.write_str(" }")
            }
            Datum::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Datum::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<Value> for Datum {
    fn from(value: Value) -> Self {
        Datum::Primitive(value)
    }
}

impl From<EnumValue> for Datum {
    fn from(value: EnumValue) -> Self {
        Datum::Enum(value)
    }
}

impl From<ModelValue> for Datum {
    fn from(value: ModelValue) -> Self {
        Datum::Model(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Primitive(Value::Integer(value))
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Primitive(Value::F64(value))
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Primitive(Value::Boolean(value))
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::Primitive(Value::from(value))
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::Primitive(Value::String(value))
    }
}

impl<T> Protocol<T> {
    /// Write `datum` as the current value, wrapped in an indefinite frame.
    pub fn write_datum(&mut self, datum: &Datum) -> Result<()> {
        if let Datum::Enum(value) = datum {
            self.check_enum(&value.type_name, value.ordinal)?;
        }

        self.write_indefinite_start(&datum.header())?;
        match datum {
            Datum::Null => {}
            Datum::Primitive(value) => self.write_value(value)?,
            Datum::Enum(value) => self.write_enum(value.ordinal)?,
            Datum::Model(model) => {
                self.write_model_start(model.properties.len())?;
                for (name, value) in &model.properties {
                    self.write_property_start(name, value.is_none())?;
                    if let Some(value) = value {
                        self.write_datum(value)?;
                    }
                    self.write_property_end()?;
                }
                self.write_model_end()?;
            }
            Datum::List(items) => {
                self.write_list_start(items.len())?;
                for item in items {
                    self.write_datum(item)?;
                }
                self.write_list_end()?;
            }
            Datum::Map(entries) => {
                self.write_map_start(entries.len())?;
                for (key, value) in entries {
                    self.write_datum(key)?;
                    self.write_datum(value)?;
                }
                self.write_map_end()?;
            }
        }
        self.write_indefinite_end()
    }

    /// Read one indefinite-framed value written by [`Protocol::write_datum`].
    pub fn read_datum(&mut self) -> Result<Datum> {
        let header = self.read_indefinite_start()?;
        let datum = match header.kind {
            IndefiniteKind::Null => Datum::Null,
            IndefiniteKind::Primitive => Datum::Primitive(self.read_value()?),
            IndefiniteKind::Enum => {
                let type_name = declared_name(header.declared_type, header.kind)?;
                let ordinal = self.read_enum()?;
                self.check_enum(&type_name, ordinal)?;
                Datum::Enum(EnumValue { type_name, ordinal })
            }
            IndefiniteKind::Model => {
                let type_name = declared_name(header.declared_type, header.kind)?;
                let model = self.read_model_start()?;
                let mut properties = Vec::with_capacity(model.property_count.min(1024));
                for _ in 0..model.property_count {
                    let property = self.read_property_start()?;
                    let value = if property.is_null {
                        None
                    } else {
                        Some(self.read_datum()?)
                    };
                    self.read_property_end()?;
                    properties.push((property.name, value));
                }
                self.read_model_end()?;
                Datum::Model(ModelValue {
                    type_name,
                    properties,
                })
            }
            IndefiniteKind::List => {
                let list = self.read_list_start()?;
                let mut items = Vec::with_capacity(list.item_count.min(1024));
                for _ in 0..list.item_count {
                    items.push(self.read_datum()?);
                }
                self.read_list_end()?;
                Datum::List(items)
            }
            IndefiniteKind::Map => {
                let map = self.read_map_start()?;
                let mut entries = Vec::with_capacity(map.item_count.min(1024));
                for _ in 0..map.item_count {
                    let key = self.read_datum()?;
                    let value = self.read_datum()?;
                    entries.push((key, value));
                }
                self.read_map_end()?;
                Datum::Map(entries)
            }
        };
        self.read_indefinite_end()?;
        Ok(datum)
    }

    /// Resolve the variant name of an enum value, if the registry knows it.
    pub fn enum_variant_name(&self, value: &EnumValue) -> Option<&str> {
        let id = self.registry().resolve_discriminant(&value.type_name)?;
        self.registry().enum_variant(id, value.ordinal)
    }

    fn check_enum(&mut self, type_name: &str, ordinal: i64) -> Result<()> {
        self.guarded(|p| {
            let id = p.resolve_name(type_name)?;
            match p.registry().kind_of(id) {
                Some(DeclaredKind::Enum) => {}
                Some(actual) => {
                    return Err(ProtocolError::DeclaredKindMismatch {
                        name: type_name.to_string(),
                        expected: DeclaredKind::Enum,
                        actual,
                    })
                }
                None => return Err(ProtocolError::UnknownDeclaredType(type_name.to_string())),
            }
            p.registry()
                .enum_variant(id, ordinal)
                .map(|_| ())
                .ok_or_else(|| ProtocolError::InvalidEnumOrdinal {
                    name: type_name.to_string(),
                    ordinal,
                })
        })
    }
}

fn declared_name(declared_type: Option<String>, kind: IndefiniteKind) -> Result<String> {
    declared_type.ok_or(ProtocolError::DeclaredTypeMismatch { kind })
}
