//! Header-code framing of RPC calls over MessagePack.
//!
//! Requests, responses, nested models, lists, maps, polymorphic values and
//! error envelopes are laid out as a sequence of MessagePack values delimited
//! by integer header codes, and carried by any message transport.
//!
//! # Crate Structure
//!
//! - [`transport`]: message transports (loopback, in-process channel, byte streams)
//! - [`protocol`]: header codes, headers, value codec and the read/write session

/// Re-export transport types.
pub mod transport {
    pub use rpcframe_transport::*;
}

/// Re-export protocol types.
pub mod protocol {
    pub use rpcframe_protocol::*;
}
