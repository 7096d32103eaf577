use std::io::{self, ErrorKind, Read, Write};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::codec::{decode_message, encode_message, DEFAULT_MAX_PAYLOAD};
use crate::error::{Result, TransportError};
use crate::traits::Transport;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Configuration for stream transports.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Maximum message size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout applied to sockets that support one.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied to sockets that support one.
    pub write_timeout: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Carries length-delimited messages over any `Read + Write` byte stream.
///
/// Handles partial reads and writes internally; callers always send and
/// receive complete messages.
pub struct StreamTransport<T> {
    inner: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    config: StreamConfig,
}

impl<T: Read + Write> StreamTransport<T> {
    /// Create a stream transport with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, StreamConfig::default())
    }

    /// Create a stream transport with explicit configuration.
    pub fn with_config(inner: T, config: StreamConfig) -> Self {
        Self {
            inner,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            write_buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the transport and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(stalled(err, self.config.write_timeout)),
            }
        }
    }
}

/// Socket timeouts surface as `WouldBlock` on Unix and `TimedOut` elsewhere.
fn stalled(err: io::Error, timeout: Option<Duration>) -> TransportError {
    match (err.kind(), timeout) {
        (ErrorKind::WouldBlock | ErrorKind::TimedOut, Some(timeout)) => {
            TransportError::TimedOut(timeout)
        }
        _ => TransportError::Io(err),
    }
}

#[cfg(unix)]
impl StreamTransport<std::os::unix::net::UnixStream> {
    /// Create a transport over a Unix stream and apply the configured timeouts.
    pub fn with_config_unix(
        inner: std::os::unix::net::UnixStream,
        config: StreamConfig,
    ) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

impl<T: Read + Write> Transport for StreamTransport<T> {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        if message.len() > self.config.max_payload_size {
            return Err(TransportError::PayloadTooLarge {
                size: message.len(),
                max: self.config.max_payload_size,
            });
        }

        self.write_buf.clear();
        encode_message(message, &mut self.write_buf)?;

        let mut offset = 0usize;
        while offset < self.write_buf.len() {
            match self.inner.write(&self.write_buf[offset..]) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(stalled(err, self.config.write_timeout)),
            }
        }

        debug!(len = message.len(), "sent message");
        self.flush()
    }

    fn receive(&mut self) -> Result<Bytes> {
        loop {
            if let Some(message) = decode_message(&mut self.read_buf, self.config.max_payload_size)? {
                debug!(len = message.len(), "received message");
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(stalled(err, self.config.read_timeout)),
            };

            if read == 0 {
                return Err(TransportError::ConnectionClosed);
            }

            self.read_buf.extend_from_slice(&chunk[..read]);
        }
    }
}

impl<T> std::fmt::Debug for StreamTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("buffered", &self.read_buf.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::codec::MAGIC;

    /// Read side replays `incoming`, write side collects into `outgoing`.
    #[derive(Default)]
    struct Duplex {
        incoming: Cursor<Vec<u8>>,
        outgoing: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.incoming.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.outgoing.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn wire(messages: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for message in messages {
            encode_message(message, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn receive_multiple_messages() {
        let duplex = Duplex {
            incoming: Cursor::new(wire(&[b"one", b"two"])),
            ..Duplex::default()
        };
        let mut transport = StreamTransport::new(duplex);

        assert_eq!(transport.receive().unwrap().as_ref(), b"one");
        assert_eq!(transport.receive().unwrap().as_ref(), b"two");
        assert!(matches!(
            transport.receive(),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn send_writes_envelope() {
        let mut transport = StreamTransport::new(Duplex::default());
        transport.send(b"payload").unwrap();

        let written = transport.into_inner().outgoing;
        let mut buf = BytesMut::from(written.as_slice());
        let message = decode_message(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(message.as_ref(), b"payload");
    }

    #[test]
    fn oversized_send_rejected() {
        let cfg = StreamConfig {
            max_payload_size: 4,
            ..StreamConfig::default()
        };
        let mut transport = StreamTransport::with_config(Duplex::default(), cfg);
        let err = transport.send(b"oversized").unwrap_err();
        assert!(matches!(err, TransportError::PayloadTooLarge { .. }));
        assert!(transport.get_ref().outgoing.is_empty());
    }

    #[test]
    fn closed_mid_message() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(32);
        partial.put_slice(b"short");

        let duplex = Duplex {
            incoming: Cursor::new(partial.to_vec()),
            ..Duplex::default()
        };
        let mut transport = StreamTransport::new(duplex);
        assert!(matches!(
            transport.receive(),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn byte_at_a_time_reads_reassemble() {
        struct Trickle(Vec<u8>, usize);

        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.1 >= self.0.len() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[self.1];
                self.1 += 1;
                Ok(1)
            }
        }

        impl Write for Trickle {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut transport = StreamTransport::new(Trickle(wire(&[b"slow message"]), 0));
        assert_eq!(transport.receive().unwrap().as_ref(), b"slow message");
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_unix_stream_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = StreamConfig {
            read_timeout: Some(Duration::from_secs(5)),
            ..StreamConfig::default()
        };
        let mut client = StreamTransport::with_config_unix(left, cfg.clone()).unwrap();
        let mut server = StreamTransport::with_config_unix(right, cfg).unwrap();

        let handle = std::thread::spawn(move || {
            let request = server.receive().unwrap();
            server.send(&request).unwrap();
        });

        let payload = vec![0xAB; 64 * 1024];
        client.send(&payload).unwrap();
        let echoed = client.receive().unwrap();
        assert_eq!(echoed.as_ref(), payload.as_slice());

        handle.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn send_to_stalled_peer_times_out() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = StreamConfig {
            max_payload_size: 16 * 1024 * 1024,
            write_timeout: Some(Duration::from_millis(100)),
            ..StreamConfig::default()
        };
        let mut client = StreamTransport::with_config_unix(left, cfg).unwrap();

        let started = std::time::Instant::now();
        let err = client.send(&vec![0u8; 8 * 1024 * 1024]).unwrap_err();
        assert!(
            matches!(err, TransportError::TimedOut(t) if t == Duration::from_millis(100)),
            "{err}"
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    #[cfg(unix)]
    fn receive_from_silent_peer_times_out() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = StreamConfig {
            read_timeout: Some(Duration::from_millis(50)),
            ..StreamConfig::default()
        };
        let mut client = StreamTransport::with_config_unix(left, cfg).unwrap();
        assert!(matches!(client.receive(), Err(TransportError::TimedOut(_))));
    }

    #[test]
    fn would_block_without_deadline_is_io() {
        let err = stalled(ErrorKind::WouldBlock.into(), None);
        assert!(matches!(err, TransportError::Io(_)));
    }
}
