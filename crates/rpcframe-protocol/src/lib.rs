//! Header-code framing of RPC calls over MessagePack.
//!
//! Every logical field travels as one self-describing MessagePack value. Structure
//! is added by integer header codes: each frame starts with its start code and a
//! fixed-shape header body, holds zero or more nested frames or values, and ends
//! with the matching end code. A reader classifies a frame by reading one integer
//! before deciding which header body follows.
//!
//! # Layers
//!
//! - [`codes`]: the wire-visible header code table
//! - [`headers`]: request, response, argument, model, property, list, map,
//!   indefinite and error headers
//! - [`encoder`] / [`decoder`] / [`pipeline`]: MessagePack value plumbing
//! - [`session`]: [`Protocol`], the read/write session state machine
//! - [`registry`] / [`datum`]: declared types and self-describing values

pub mod codes;
pub mod config;
pub mod datum;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod headers;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod value;

mod stack;

pub use codes::{FrameKind, HeaderCode};
pub use config::ProtocolConfig;
pub use datum::{Datum, EnumValue, ModelValue};
pub use decoder::{ValueDecoder, ValueSource};
pub use encoder::ValueEncoder;
pub use error::{ProtocolError, RemoteError, Result};
pub use headers::{
    ArgumentHeader, ChildBounds, ErrorHeader, Header, HeaderBody, IndefiniteHeader,
    IndefiniteKind, ListHeader, MapHeader, ModelHeader, PropertyHeader, RequestHeader,
    ResponseHeader,
};
pub use pipeline::DecodePipeline;
pub use registry::{DeclaredKind, DeclaredTypeId, DeclaredTypes, TypeRegistry};
pub use session::{Protocol, SessionState};
pub use value::Value;
