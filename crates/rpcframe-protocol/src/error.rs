use rpcframe_transport::TransportError;

use crate::codes::{FrameKind, HeaderCode};
use crate::headers::IndefiniteKind;
use crate::registry::DeclaredKind;
use crate::session::SessionState;

/// Errors raised while encoding, decoding or sequencing frames.
///
/// Anything other than [`ProtocolError::InvalidState`] raised inside an active
/// session leaves that session abandoned; see [`Protocol::reset`](crate::Protocol::reset).
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The transport failed to send or receive a message.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A value could not be encoded as MessagePack.
    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The message contains malformed MessagePack.
    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// A different header code was read than the structural position requires.
    #[error("invalid message: expected {expected}, found code {found}")]
    UnexpectedHeaderCode { expected: HeaderCode, found: i64 },

    /// A header code outside the code table, or an end code where a frame start belongs.
    #[error("invalid message: {0} is not a frame start code")]
    UnknownHeaderCode(i64),

    /// A frame end does not match the innermost open frame.
    #[error("unbalanced frame end: closing {requested} while {open:?} is open")]
    UnbalancedEnd {
        requested: FrameKind,
        open: Option<FrameKind>,
    },

    /// A frame was opened somewhere its kind cannot appear.
    #[error("{kind} frame not allowed inside {parent:?}")]
    MisplacedFrame {
        kind: FrameKind,
        parent: Option<FrameKind>,
    },

    /// A bare value was written or read where no value belongs.
    #[error("value not allowed inside {parent:?}")]
    MisplacedValue { parent: Option<FrameKind> },

    /// A frame holds more or fewer children than its header declared.
    #[error("{kind} frame declared {expected} children, found {actual}")]
    CountMismatch {
        kind: FrameKind,
        expected: usize,
        actual: usize,
    },

    /// An indefinite frame holds something other than what its kind announced.
    #[error(
        "indefinite {kind} value cannot hold {}",
        .found.map_or_else(|| "a bare value".to_string(), |child| format!("a {child} frame"))
    )]
    IndefinitePayload {
        kind: IndefiniteKind,
        found: Option<FrameKind>,
    },

    /// Frames nest deeper than the protocol accepts.
    #[error("frames nested deeper than {0}")]
    NestingTooDeep(usize),

    /// A frame is still open at the end of a session.
    #[error("{0} frame still open at end of message")]
    UnclosedFrame(FrameKind),

    /// A value has a different MessagePack type than the field requires.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A numeric value does not fit the field's range.
    #[error("{expected} out of range: {value}")]
    OutOfRange { expected: &'static str, value: String },

    /// A negative or oversized count in a header.
    #[error("invalid count: {0}")]
    InvalidCount(i64),

    /// An indefinite header carries an unknown kind discriminant.
    #[error("invalid indefinite kind discriminant {0}")]
    InvalidDiscriminant(i64),

    /// An indefinite header's declared type name is missing or superfluous.
    #[error("declared type name must be present exactly for enum and model values (kind {kind})")]
    DeclaredTypeMismatch { kind: IndefiniteKind },

    /// The registry does not know a declared type name.
    #[error("unknown declared type {0:?}")]
    UnknownDeclaredType(String),

    /// A declared type is registered with a different kind.
    #[error("declared type {name:?} is a {actual}, expected {expected}")]
    DeclaredKindMismatch {
        name: String,
        expected: DeclaredKind,
        actual: DeclaredKind,
    },

    /// An enum value's ordinal is not one of the declared variants.
    #[error("enum {name:?} has no variant with ordinal {ordinal}")]
    InvalidEnumOrdinal { name: String, ordinal: i64 },

    /// An error envelope without a message string.
    #[error("error envelope has no message field")]
    MissingErrorMessage,

    /// The message ended while a value was still expected.
    #[error("message ended before the expected value")]
    TruncatedMessage,

    /// Unread values remain once the outermost frame was closed.
    #[error("{0} unread values left at end of message")]
    TrailingData(usize),

    /// An encoded message exceeds the configured limit.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The operation requires a different session state.
    #[error("invalid session state: expected {expected}, found {actual}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// An earlier failure left the session unusable.
    #[error("session abandoned after an earlier failure")]
    SessionAbandoned,

    /// The decode pipeline thread could not be started or crashed.
    #[error("decode pipeline failure: {0}")]
    Pipeline(String),
}

impl ProtocolError {
    /// True for errors that mean the byte stream no longer matches the expected structure.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedHeaderCode { .. }
                | Self::UnknownHeaderCode(_)
                | Self::UnbalancedEnd { .. }
                | Self::MisplacedFrame { .. }
                | Self::MisplacedValue { .. }
                | Self::IndefinitePayload { .. }
                | Self::CountMismatch { .. }
                | Self::UnclosedFrame(_)
                | Self::NestingTooDeep(_)
                | Self::TrailingData(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// A failure reported by the remote side through an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
