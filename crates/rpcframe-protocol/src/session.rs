//! Read and write sessions over a transport.
//!
//! A [`Protocol`] runs at most one session at a time. A write session
//! accumulates a message in memory and hands it to the transport when it ends.
//! A read session receives one message and consumes it through the decode
//! pipeline. Every start, value and end passes the same structural checks in
//! both directions.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rpcframe_transport::Transport;
use tracing::{debug, trace, warn};

use crate::codes::{FrameKind, HeaderCode};
use crate::config::ProtocolConfig;
use crate::decoder::ValueSource;
use crate::encoder::ValueEncoder;
use crate::error::{ProtocolError, Result};
use crate::headers::{
    ArgumentHeader, ErrorHeader, Header, HeaderBody, IndefiniteHeader, IndefiniteKind, ListHeader,
    MapHeader, ModelHeader, PropertyHeader, RequestHeader, ResponseHeader,
};
use crate::pipeline::DecodePipeline;
use crate::registry::{DeclaredKind, DeclaredTypeId, DeclaredTypes, TypeRegistry};
use crate::stack::FrameStack;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Writing,
    Reading,
    /// A failure interrupted the last session. Only [`Protocol::reset`] leaves this state.
    Abandoned,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Writing | SessionState::Reading)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Writing => "writing",
            SessionState::Reading => "reading",
            SessionState::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Frames RPC messages onto a transport.
///
/// ```no_run
/// use rpcframe_protocol::{Protocol, RequestHeader};
/// use rpcframe_transport::MemoryTransport;
///
/// # fn main() -> rpcframe_protocol::Result<()> {
/// let mut protocol = Protocol::new(MemoryTransport::new());
/// protocol.write_request_start(&RequestHeader::new("add", 2))?;
/// for (name, value) in [("a", 3), ("b", 4)] {
///     protocol.write_argument_start(name)?;
///     protocol.write_integer(value)?;
///     protocol.write_argument_end()?;
/// }
/// protocol.write_request_end()?;
/// # Ok(())
/// # }
/// ```
pub struct Protocol<T> {
    transport: T,
    registry: Arc<dyn DeclaredTypes>,
    config: ProtocolConfig,
    state: SessionState,
    encoder: Option<ValueEncoder>,
    pipeline: Option<DecodePipeline>,
    frames: FrameStack,
}

impl<T> Protocol<T> {
    /// Protocol with an empty type registry and default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_registry(transport, Arc::new(TypeRegistry::new()))
    }

    pub fn with_registry(transport: T, registry: Arc<dyn DeclaredTypes>) -> Self {
        Self::with_config(transport, registry, ProtocolConfig::default())
    }

    pub fn with_config(transport: T, registry: Arc<dyn DeclaredTypes>, config: ProtocolConfig) -> Self {
        Self {
            transport,
            registry,
            config,
            state: SessionState::Idle,
            encoder: None,
            pipeline: None,
            frames: FrameStack::default(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn registry(&self) -> &Arc<dyn DeclaredTypes> {
        &self.registry
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of currently open frames.
    pub fn depth(&self) -> usize {
        self.frames.depth()
    }

    /// Discard any session in progress, abandoned or not, and return to idle.
    pub fn reset(&mut self) {
        if self.state != SessionState::Idle {
            debug!(state = %self.state, "resetting protocol session");
        }
        self.clear_session();
        self.state = SessionState::Idle;
    }

    fn clear_session(&mut self) {
        self.encoder = None;
        self.pipeline = None;
        self.frames.clear();
    }

    fn check_usable(&self) -> Result<()> {
        if self.state == SessionState::Abandoned {
            return Err(ProtocolError::SessionAbandoned);
        }
        Ok(())
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        self.check_usable()?;
        if self.state != expected {
            return Err(ProtocolError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Abandon the active session if `result` failed.
    fn settle<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            let misuse = matches!(err, ProtocolError::InvalidState { .. });
            if self.state.is_active() && !misuse {
                warn!(state = %self.state, error = %err, "abandoning protocol session");
                self.clear_session();
                self.state = SessionState::Abandoned;
            }
        }
        result
    }

    pub(crate) fn guarded<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.check_usable()?;
        let result = op(self);
        self.settle(result)
    }

    fn writing(&mut self) -> Result<(&mut ValueEncoder, &mut FrameStack)> {
        match (self.state, self.encoder.as_mut()) {
            (SessionState::Writing, Some(encoder)) => Ok((encoder, &mut self.frames)),
            (actual, _) => Err(ProtocolError::InvalidState {
                expected: SessionState::Writing,
                actual,
            }),
        }
    }

    fn reading(&mut self) -> Result<(&mut DecodePipeline, &mut FrameStack)> {
        match (self.state, self.pipeline.as_mut()) {
            (SessionState::Reading, Some(pipeline)) => Ok((pipeline, &mut self.frames)),
            (actual, _) => Err(ProtocolError::InvalidState {
                expected: SessionState::Reading,
                actual,
            }),
        }
    }

    // ----- write side -----

    /// Open a write session with an empty message buffer.
    pub fn begin_write(&mut self) -> Result<()> {
        self.expect_state(SessionState::Idle)?;
        self.clear_session();
        self.encoder = Some(ValueEncoder::new());
        self.state = SessionState::Writing;
        debug!("write session started");
        Ok(())
    }

    /// Start a write session with a request frame.
    pub fn write_request_start(&mut self, header: &RequestHeader) -> Result<()> {
        self.begin_write()?;
        self.start_frame(header)
    }

    /// Start a write session with a response frame.
    pub fn write_response_start(&mut self, is_valid: bool) -> Result<()> {
        self.begin_write()?;
        self.start_frame(&ResponseHeader { is_valid })
    }

    fn start_frame<H: HeaderBody>(&mut self, header: &H) -> Result<()> {
        self.guarded(|p| {
            let bounds = header.child_bounds()?;
            let (encoder, frames) = p.writing()?;
            frames.admit(H::KIND)?;
            encoder.write_header_code(H::KIND.start_code())?;
            header.write_body(encoder)?;
            frames.push(H::KIND, bounds, header.payload());
            trace!(kind = %H::KIND, depth = frames.depth(), "wrote frame start");
            Ok(())
        })
    }

    fn end_frame(&mut self, kind: FrameKind) -> Result<()> {
        self.guarded(|p| {
            let (encoder, frames) = p.writing()?;
            frames.close(kind)?;
            encoder.write_header_code(kind.end_code())?;
            trace!(%kind, depth = frames.depth(), "wrote frame end");
            Ok(())
        })
    }

    fn write_item(&mut self, op: impl FnOnce(&mut ValueEncoder) -> Result<()>) -> Result<()> {
        self.guarded(|p| {
            let (encoder, frames) = p.writing()?;
            frames.admit_value()?;
            op(encoder)
        })
    }

    /// Write the start code and body of any frame header.
    pub fn write_frame_start(&mut self, header: &Header) -> Result<()> {
        match header {
            Header::Request(h) => self.start_frame(h),
            Header::Response(h) => self.start_frame(h),
            Header::Argument(h) => self.start_frame(h),
            Header::Model(h) => self.start_frame(h),
            Header::Property(h) => self.start_frame(h),
            Header::List(h) => self.start_frame(h),
            Header::Map(h) => self.start_frame(h),
            Header::Indefinite(h) => self.write_indefinite_start(h),
        }
    }

    /// Write the end code of the innermost frame, which must be of `kind`.
    pub fn write_frame_end(&mut self, kind: FrameKind) -> Result<()> {
        self.end_frame(kind)
    }

    /// Open a named argument inside the current request.
    pub fn write_argument_start(&mut self, name: &str) -> Result<()> {
        self.start_frame(&ArgumentHeader::new(name))
    }

    /// Close the current argument.
    pub fn write_argument_end(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Argument)
    }

    /// Open a model frame holding `property_count` properties.
    pub fn write_model_start(&mut self, property_count: usize) -> Result<()> {
        self.start_frame(&ModelHeader { property_count })
    }

    /// Close the current model.
    pub fn write_model_end(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Model)
    }

    /// Open a model property. A null property holds no value.
    pub fn write_property_start(&mut self, name: &str, is_null: bool) -> Result<()> {
        self.start_frame(&PropertyHeader::new(name, is_null))
    }

    /// Close the current property.
    pub fn write_property_end(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Property)
    }

    /// Open a list frame holding `item_count` items.
    pub fn write_list_start(&mut self, item_count: usize) -> Result<()> {
        self.start_frame(&ListHeader { item_count })
    }

    /// Close the current list.
    pub fn write_list_end(&mut self) -> Result<()> {
        self.end_frame(FrameKind::List)
    }

    /// Open a map frame holding `item_count` key/value pairs.
    pub fn write_map_start(&mut self, item_count: usize) -> Result<()> {
        self.start_frame(&MapHeader { item_count })
    }

    /// Close the current map.
    pub fn write_map_end(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Map)
    }

    /// Start a polymorphic value. Enum and model headers must name a registered type.
    pub fn write_indefinite_start(&mut self, header: &IndefiniteHeader) -> Result<()> {
        self.guarded(|p| p.resolve_declared(header).map(|_| ()))?;
        self.start_frame(header)
    }

    /// Close the current polymorphic value.
    pub fn write_indefinite_end(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Indefinite)
    }

    /// Write an error envelope as the current value, normally the body of an
    /// invalid response.
    pub fn write_error(&mut self, error: &ErrorHeader) -> Result<()> {
        self.write_item(|enc| error.write(enc))
    }

    /// Write a UTF-8 string value.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_item(|enc| enc.write_string(value))
    }

    /// Write a boolean value.
    pub fn write_boolean(&mut self, value: bool) -> Result<()> {
        self.write_item(|enc| enc.write_boolean(value))
    }

    /// Write a signed integer value.
    pub fn write_integer(&mut self, value: i64) -> Result<()> {
        self.write_item(|enc| enc.write_integer(value))
    }

    /// Write a single precision float.
    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.write_item(|enc| enc.write_float(value))
    }

    /// Write a double precision float.
    pub fn write_double(&mut self, value: f64) -> Result<()> {
        self.write_item(|enc| enc.write_double(value))
    }

    /// Write one unsigned byte.
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write_item(|enc| enc.write_byte(value))
    }

    /// Write an enum ordinal.
    pub fn write_enum(&mut self, ordinal: i64) -> Result<()> {
        self.write_item(|enc| enc.write_enum(ordinal))
    }

    /// Write an opaque byte string.
    pub fn write_binary(&mut self, value: &[u8]) -> Result<()> {
        self.write_item(|enc| enc.write_binary(value))
    }

    /// Write an explicit nil.
    pub fn write_null(&mut self) -> Result<()> {
        self.write_item(|enc| enc.write_nil())
    }

    /// Write any flat value as is.
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.write_item(|enc| enc.write_value(value))
    }

    /// Check the finished message and take it out of the session. The state
    /// stays `Writing` until the transport accepted it.
    fn finish_write(&mut self) -> Result<Bytes> {
        self.guarded(|p| {
            let max = p.config.max_message_size;
            let (encoder, frames) = p.writing()?;
            if let Some(kind) = frames.innermost() {
                return Err(ProtocolError::UnclosedFrame(kind));
            }
            if encoder.len() > max {
                return Err(ProtocolError::MessageTooLarge {
                    size: encoder.len(),
                    max,
                });
            }
            let message = p
                .encoder
                .take()
                .map(ValueEncoder::finish)
                .unwrap_or_default();
            Ok(message)
        })
    }

    fn complete_write(&mut self, len: usize) {
        self.state = SessionState::Idle;
        debug!(len, "write session finished");
    }

    // ----- read side -----

    fn start_pipeline(&mut self, message: Bytes) -> Result<()> {
        if message.len() > self.config.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: message.len(),
                max: self.config.max_message_size,
            });
        }
        let len = message.len();
        let pipeline =
            DecodePipeline::from_message(message, self.config.chunk_size, self.config.queue_capacity)?;
        self.clear_session();
        self.pipeline = Some(pipeline);
        self.state = SessionState::Reading;
        debug!(len, "read session started");
        Ok(())
    }

    /// Open a read session over an already received message.
    pub fn begin_read_message(&mut self, message: Bytes) -> Result<()> {
        self.expect_state(SessionState::Idle)?;
        self.start_pipeline(message)
    }

    fn read_start<H: HeaderBody>(&mut self) -> Result<H> {
        self.guarded(|p| {
            let (pipeline, frames) = p.reading()?;
            frames.admit(H::KIND)?;
            pipeline.expect_header_code(H::KIND.start_code())?;
            let header = H::read_body(pipeline)?;
            frames.push(H::KIND, header.child_bounds()?, header.payload());
            trace!(kind = %H::KIND, depth = frames.depth(), "read frame start");
            Ok(header)
        })
    }

    fn read_end(&mut self, kind: FrameKind) -> Result<()> {
        self.guarded(|p| {
            let (pipeline, frames) = p.reading()?;
            frames.close(kind)?;
            pipeline.expect_header_code(kind.end_code())?;
            trace!(%kind, depth = frames.depth(), "read frame end");
            Ok(())
        })
    }

    fn read_item<R>(&mut self, op: impl FnOnce(&mut DecodePipeline) -> Result<R>) -> Result<R> {
        self.guarded(|p| {
            let (pipeline, frames) = p.reading()?;
            frames.admit_value()?;
            op(pipeline)
        })
    }

    /// Read whichever frame starts next, classified by its start code.
    pub fn read_frame_start(&mut self) -> Result<Header> {
        self.guarded(|p| {
            let (pipeline, frames) = p.reading()?;
            let raw = pipeline.read_integer()?;
            let code = HeaderCode::from_code(raw)
                .filter(|code| code.is_start())
                .ok_or(ProtocolError::UnknownHeaderCode(raw))?;
            let kind = code.kind();
            frames.admit(kind)?;
            let header = Header::read_body(kind, pipeline)?;
            frames.push(kind, header.child_bounds()?, header.payload());
            trace!(%kind, depth = frames.depth(), "read frame start");
            if let Header::Indefinite(indefinite) = &header {
                p.resolve_declared(indefinite)?;
            }
            Ok(header)
        })
    }

    pub fn read_frame_end(&mut self, kind: FrameKind) -> Result<()> {
        self.read_end(kind)
    }

    /// Read the next argument header of the current request.
    pub fn read_argument_start(&mut self) -> Result<ArgumentHeader> {
        self.read_start()
    }

    /// Read the end of the current argument.
    pub fn read_argument_end(&mut self) -> Result<()> {
        self.read_end(FrameKind::Argument)
    }

    /// Read a model header.
    pub fn read_model_start(&mut self) -> Result<ModelHeader> {
        self.read_start()
    }

    /// Read the end of the current model.
    pub fn read_model_end(&mut self) -> Result<()> {
        self.read_end(FrameKind::Model)
    }

    /// Read a property header. A null property holds no value.
    pub fn read_property_start(&mut self) -> Result<PropertyHeader> {
        self.read_start()
    }

    /// Read the end of the current property.
    pub fn read_property_end(&mut self) -> Result<()> {
        self.read_end(FrameKind::Property)
    }

    /// Read a list header.
    pub fn read_list_start(&mut self) -> Result<ListHeader> {
        self.read_start()
    }

    /// Read the end of the current list.
    pub fn read_list_end(&mut self) -> Result<()> {
        self.read_end(FrameKind::List)
    }

    /// Read a map header.
    pub fn read_map_start(&mut self) -> Result<MapHeader> {
        self.read_start()
    }

    /// Read the end of the current map.
    pub fn read_map_end(&mut self) -> Result<()> {
        self.read_end(FrameKind::Map)
    }

    /// Read a polymorphic value header, resolving enum and model type names
    /// through the registry.
    pub fn read_indefinite_start(&mut self) -> Result<IndefiniteHeader> {
        let header: IndefiniteHeader = self.read_start()?;
        self.guarded(|p| p.resolve_declared(&header))?;
        Ok(header)
    }

    /// Read the end of the current polymorphic value.
    pub fn read_indefinite_end(&mut self) -> Result<()> {
        self.read_end(FrameKind::Indefinite)
    }

    /// Read the error envelope of an invalid response.
    pub fn read_error(&mut self) -> Result<ErrorHeader> {
        self.read_item(ErrorHeader::read)
    }

    /// Read a UTF-8 string value.
    pub fn read_string(&mut self) -> Result<String> {
        self.read_item(|src| src.read_string())
    }

    /// Read a boolean value.
    pub fn read_boolean(&mut self) -> Result<bool> {
        self.read_item(|src| src.read_boolean())
    }

    /// Read a signed integer value.
    pub fn read_integer(&mut self) -> Result<i64> {
        self.read_item(|src| src.read_integer())
    }

    /// Read a single precision float.
    pub fn read_float(&mut self) -> Result<f32> {
        self.read_item(|src| src.read_float())
    }

    /// Read a double precision float.
    pub fn read_double(&mut self) -> Result<f64> {
        self.read_item(|src| src.read_double())
    }

    /// Read one unsigned byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        self.read_item(|src| src.read_byte())
    }

    /// Read an enum ordinal.
    pub fn read_enum(&mut self) -> Result<i64> {
        self.read_item(|src| src.read_enum())
    }

    /// Read an opaque byte string.
    pub fn read_binary(&mut self) -> Result<Vec<u8>> {
        self.read_item(|src| src.read_binary())
    }

    /// Read an explicit nil.
    pub fn read_null(&mut self) -> Result<()> {
        self.read_item(|src| src.read_nil())
    }

    /// Read the next value whatever its type.
    pub fn read_value(&mut self) -> Result<Value> {
        self.read_item(|src| src.next_value())
    }

    /// Close the read session. Every frame must be closed and every value consumed.
    pub fn end_read(&mut self) -> Result<()> {
        self.guarded(|p| {
            let (pipeline, frames) = p.reading()?;
            if let Some(kind) = frames.innermost() {
                return Err(ProtocolError::UnclosedFrame(kind));
            }
            let consumed = pipeline.consumed();
            let remaining = match p.pipeline.take() {
                Some(pipeline) => pipeline.finish()?,
                None => 0,
            };
            if remaining > 0 {
                return Err(ProtocolError::TrailingData(remaining));
            }
            p.state = SessionState::Idle;
            debug!(values = consumed, "read session finished");
            Ok(())
        })
    }

    /// Read the request end code and close the session.
    pub fn read_request_end(&mut self) -> Result<()> {
        self.read_end(FrameKind::Request)?;
        self.end_read()
    }

    /// Read the response end code and close the session.
    pub fn read_response_end(&mut self) -> Result<()> {
        self.read_end(FrameKind::Response)?;
        self.end_read()
    }

    // ----- registry -----

    /// Check an indefinite header's declared type against the registry.
    fn resolve_declared(&self, header: &IndefiniteHeader) -> Result<Option<DeclaredTypeId>> {
        let expected = match header.kind {
            IndefiniteKind::Enum => DeclaredKind::Enum,
            IndefiniteKind::Model => DeclaredKind::Model,
            _ => return Ok(None),
        };
        let name = header
            .declared_type
            .as_deref()
            .ok_or(ProtocolError::DeclaredTypeMismatch { kind: header.kind })?;
        let id = self.resolve_name(name)?;
        let actual = self
            .registry
            .kind_of(id)
            .ok_or_else(|| ProtocolError::UnknownDeclaredType(name.to_string()))?;
        if actual != expected {
            let canonical = self.registry.resolve_type_name(id).unwrap_or(name);
            return Err(ProtocolError::DeclaredKindMismatch {
                name: canonical.to_string(),
                expected,
                actual,
            });
        }
        Ok(Some(id))
    }

    pub(crate) fn resolve_name(&self, name: &str) -> Result<DeclaredTypeId> {
        self.registry
            .resolve_discriminant(name)
            .ok_or_else(|| ProtocolError::UnknownDeclaredType(name.to_string()))
    }
}

impl<T: Transport> Protocol<T> {
    /// Close the request frame and send the message.
    pub fn write_request_end(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Request)?;
        self.end_write()
    }

    /// Close the response frame and send the message.
    pub fn write_response_end(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Response)?;
        self.end_write()
    }

    /// Hand the finished message to the transport.
    pub fn end_write(&mut self) -> Result<()> {
        let message = self.finish_write()?;
        let sent = self.transport.send(&message).map_err(ProtocolError::from);
        self.settle(sent)?;
        self.complete_write(message.len());
        Ok(())
    }

    /// Receive one message and open a read session over it. Blocks until the
    /// transport delivers.
    pub fn begin_read(&mut self) -> Result<()> {
        self.expect_state(SessionState::Idle)?;
        let message = self.transport.receive()?;
        self.start_pipeline(message)
    }

    /// Receive a message and read its request header.
    pub fn read_request_start(&mut self) -> Result<RequestHeader> {
        self.begin_read()?;
        self.read_start()
    }

    /// Receive a message and read its response header.
    pub fn read_response_start(&mut self) -> Result<ResponseHeader> {
        self.begin_read()?;
        self.read_start()
    }
}

#[cfg(feature = "async")]
impl<T: rpcframe_transport::AsyncTransport> Protocol<T> {
    /// Like [`Protocol::begin_read`], but awaits the transport instead of
    /// blocking. Later reads in the session are synchronous.
    pub async fn begin_read_async(&mut self) -> Result<()> {
        self.expect_state(SessionState::Idle)?;
        let message = self.transport.receive_async().await?;
        self.start_pipeline(message)
    }

    pub async fn read_request_start_async(&mut self) -> Result<RequestHeader> {
        self.begin_read_async().await?;
        self.read_start()
    }

    pub async fn read_response_start_async(&mut self) -> Result<ResponseHeader> {
        self.begin_read_async().await?;
        self.read_start()
    }

    /// Hand the finished message to the transport without blocking.
    pub async fn end_write_async(&mut self) -> Result<()> {
        let message = self.finish_write()?;
        let sent = self
            .transport
            .send_async(&message)
            .await
            .map_err(ProtocolError::from);
        self.settle(sent)?;
        self.complete_write(message.len());
        Ok(())
    }

    pub async fn write_request_end_async(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Request)?;
        self.end_write_async().await
    }

    pub async fn write_response_end_async(&mut self) -> Result<()> {
        self.end_frame(FrameKind::Response)?;
        self.end_write_async().await
    }
}

impl<T> fmt::Debug for Protocol<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("state", &self.state)
            .field("depth", &self.frames.depth())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
