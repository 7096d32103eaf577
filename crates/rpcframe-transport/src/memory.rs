use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Loopback transport: every sent message is queued for this transport's own
/// receive side.
///
/// Useful for round-tripping a write session into a read session without any
/// I/O. `receive` on an empty queue fails with [`TransportError::NoMessage`]
/// since no other party can ever fill it.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    queue: VecDeque<Bytes>,
    sent: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loopback transport preloaded with incoming messages.
    pub fn with_incoming<I, B>(messages: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            queue: messages.into_iter().map(Into::into).collect(),
            sent: 0,
        }
    }

    /// Queue a message for the next `receive`.
    pub fn push_incoming(&mut self, message: impl Into<Bytes>) {
        self.queue.push_back(message.into());
    }

    /// Number of messages waiting to be received.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of messages sent through this transport so far.
    pub fn sent_count(&self) -> usize {
        self.sent
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.sent += 1;
        trace!(len = message.len(), "loopback send");
        self.queue.push_back(Bytes::copy_from_slice(message));
        Ok(())
    }

    fn receive(&mut self) -> Result<Bytes> {
        self.queue.pop_front().ok_or(TransportError::NoMessage)
    }
}

#[cfg(feature = "async")]
impl crate::traits::AsyncTransport for MemoryTransport {
    async fn send_async(&mut self, message: &[u8]) -> Result<()> {
        self.send(message)
    }

    async fn receive_async(&mut self) -> Result<Bytes> {
        tokio::task::yield_now().await;
        self.receive()
    }
}

/// One endpoint of an in-process message channel.
///
/// Created in connected pairs by [`channel_pair`]. Messages sent on one
/// endpoint are received, in order, on the other.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    receive_timeout: Option<Duration>,
}

/// Create two connected in-process endpoints.
pub fn channel_pair() -> (ChannelTransport, ChannelTransport) {
    let (left_tx, right_rx) = mpsc::channel();
    let (right_tx, left_rx) = mpsc::channel();
    (
        ChannelTransport {
            tx: left_tx,
            rx: left_rx,
            receive_timeout: None,
        },
        ChannelTransport {
            tx: right_tx,
            rx: right_rx,
            receive_timeout: None,
        },
    )
}

impl ChannelTransport {
    /// Bound how long `receive` waits for the peer.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    /// Update the receive deadline for subsequent calls.
    pub fn set_receive_timeout(&mut self, timeout: Option<Duration>) {
        self.receive_timeout = timeout;
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(message))
            .map_err(|_| TransportError::Disconnected)
    }

    fn receive(&mut self) -> Result<Bytes> {
        match self.receive_timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => TransportError::TimedOut(timeout),
                RecvTimeoutError::Disconnected => TransportError::Disconnected,
            }),
            None => self.rx.recv().map_err(|_| TransportError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_returns_sent_messages_in_order() {
        let mut transport = MemoryTransport::new();
        transport.send(b"one").unwrap();
        transport.send(b"two").unwrap();

        assert_eq!(transport.sent_count(), 2);
        assert_eq!(transport.pending(), 2);
        assert_eq!(transport.receive().unwrap().as_ref(), b"one");
        assert_eq!(transport.receive().unwrap().as_ref(), b"two");
    }

    #[test]
    fn loopback_empty_queue_reports_no_message() {
        let mut transport = MemoryTransport::new();
        assert!(matches!(
            transport.receive(),
            Err(TransportError::NoMessage)
        ));
    }

    #[test]
    fn preloaded_messages_are_received() {
        let mut transport = MemoryTransport::with_incoming([&b"a"[..], &b"b"[..]]);
        assert_eq!(transport.receive().unwrap().as_ref(), b"a");
        transport.push_incoming(Bytes::from_static(b"c"));
        assert_eq!(transport.receive().unwrap().as_ref(), b"b");
        assert_eq!(transport.receive().unwrap().as_ref(), b"c");
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn channel_pair_crosses_threads() {
        let (mut client, mut server) = channel_pair();

        let handle = std::thread::spawn(move || {
            let request = server.receive().unwrap();
            server.send(&request).unwrap();
        });

        client.send(b"echo me").unwrap();
        assert_eq!(client.receive().unwrap().as_ref(), b"echo me");
        handle.join().unwrap();
    }

    #[test]
    fn channel_receive_times_out() {
        let (_keep_alive, client) = channel_pair();
        let mut client = client.with_receive_timeout(Duration::from_millis(10));
        let err = client.receive().unwrap_err();
        assert!(matches!(err, TransportError::TimedOut(_)));
    }

    #[test]
    fn channel_disconnect_is_reported() {
        let (mut client, server) = channel_pair();
        drop(server);
        assert!(matches!(client.receive(), Err(TransportError::Disconnected)));
        assert!(matches!(client.send(b"x"), Err(TransportError::Disconnected)));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn loopback_async_roundtrip() {
        use crate::traits::AsyncTransport;

        let mut transport = MemoryTransport::new();
        transport.send_async(b"async").await.unwrap();
        let message = transport.receive_async().await.unwrap();
        assert_eq!(message.as_ref(), b"async");
    }
}
