//! Message transports for rpcframe.
//!
//! A transport moves complete message buffers between peers:
//! - [`MemoryTransport`] loops sent messages back to its own receive side
//! - [`ChannelTransport`] connects two endpoints inside one process
//! - [`StreamTransport`] delimits messages on any `Read + Write` byte stream
//! - `AsyncStreamTransport` does the same over tokio I/O (behind `async`)
//!
//! The protocol layer only depends on the [`Transport`] and `AsyncTransport` traits.

pub mod codec;
pub mod error;
pub mod memory;
pub mod stream;
pub mod traits;

#[cfg(feature = "async")]
pub mod async_stream;

pub use codec::{decode_message, encode_message, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC};
pub use error::{Result, TransportError};
pub use memory::{channel_pair, ChannelTransport, MemoryTransport};
pub use stream::{StreamConfig, StreamTransport};
pub use traits::Transport;

#[cfg(feature = "async")]
pub use async_stream::AsyncStreamTransport;
#[cfg(feature = "async")]
pub use codec::MessageCodec;
#[cfg(feature = "async")]
pub use traits::AsyncTransport;
