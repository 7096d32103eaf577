use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::MessageCodec;
use crate::error::{Result, TransportError};
use crate::stream::StreamConfig;
use crate::traits::AsyncTransport;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Carries length-delimited messages over a tokio byte stream.
pub struct AsyncStreamTransport<T> {
    inner: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    codec: MessageCodec,
}

impl<T> AsyncStreamTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, &StreamConfig::default())
    }

    /// Only `max_payload_size` applies; tokio streams carry their own timeouts.
    pub fn with_config(inner: T, config: &StreamConfig) -> Self {
        Self {
            inner,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            write_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: MessageCodec::new(config.max_payload_size),
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> AsyncTransport for AsyncStreamTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_async(&mut self, message: &[u8]) -> Result<()> {
        self.write_buf.clear();
        self.codec.encode(message, &mut self.write_buf)?;
        self.inner.write_all(&self.write_buf).await?;
        self.inner.flush().await?;
        debug!(len = message.len(), "sent message");
        Ok(())
    }

    async fn receive_async(&mut self) -> Result<Bytes> {
        loop {
            if let Some(message) = self.codec.decode(&mut self.read_buf)? {
                debug!(len = message.len(), "received message");
                return Ok(message);
            }

            let read = self.inner.read_buf(&mut self.read_buf).await?;
            if read == 0 {
                return Err(TransportError::ConnectionClosed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplex_roundtrip() {
        let (left, right) = tokio::io::duplex(64);
        let mut client = AsyncStreamTransport::new(left);
        let mut server = AsyncStreamTransport::new(right);

        let server_task = tokio::spawn(async move {
            let request = server.receive_async().await.unwrap();
            server.send_async(&request).await.unwrap();
        });

        // Larger than the duplex buffer so both sides see partial I/O.
        let payload = vec![7u8; 1024];
        client.send_async(&payload).await.unwrap();
        let echoed = client.receive_async().await.unwrap();
        assert_eq!(echoed.as_ref(), payload.as_slice());

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_stream_reports_connection_closed() {
        let (left, right) = tokio::io::duplex(64);
        drop(right);
        let mut client = AsyncStreamTransport::new(left);
        let err = client.receive_async().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn oversized_message_rejected_on_send() {
        let (left, _right) = tokio::io::duplex(64);
        let cfg = StreamConfig {
            max_payload_size: 8,
            ..StreamConfig::default()
        };
        let mut client = AsyncStreamTransport::with_config(left, &cfg);
        let err = client.send_async(b"way too large").await.unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { .. }));
    }
}
