use rpcframe_transport::DEFAULT_MAX_PAYLOAD;

/// Default size of the chunks a received message is fed to the decoder in.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Default number of decoded values buffered ahead of the reader.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Tuning for a [`Protocol`](crate::Protocol) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Bytes handed to the decoder per step. Values may straddle chunks.
    pub chunk_size: usize,
    /// Decoded values the pipeline may queue before it waits for the reader.
    pub queue_capacity: usize,
    /// Largest encoded message accepted on send or receive. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_message_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
