/// Errors that can occur while moving messages across a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message envelope does not start with the expected magic bytes.
    #[error("invalid message magic (expected 0x5246 \"RF\")")]
    InvalidMagic,

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,

    /// The other endpoint of an in-process transport was dropped.
    #[error("peer endpoint disconnected")]
    Disconnected,

    /// No message is queued on a loopback transport.
    #[error("no message available")]
    NoMessage,

    /// Sending or receiving took longer than the configured deadline.
    #[error("timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, TransportError>;
