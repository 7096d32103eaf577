use bytes::Bytes;

use crate::error::Result;

/// A channel that carries whole message buffers.
///
/// `send` hands over one complete encoded message. `receive` blocks until one
/// complete message is available and returns it.
pub trait Transport {
    /// Send one complete message.
    fn send(&mut self, message: &[u8]) -> Result<()>;

    /// Receive the next complete message (blocking).
    fn receive(&mut self) -> Result<Bytes>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        (**self).send(message)
    }

    fn receive(&mut self) -> Result<Bytes> {
        (**self).receive()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        (**self).send(message)
    }

    fn receive(&mut self) -> Result<Bytes> {
        (**self).receive()
    }
}

/// A transport whose operations suspend instead of blocking the thread.
#[cfg(feature = "async")]
pub trait AsyncTransport {
    /// Send one complete message.
    fn send_async(
        &mut self,
        message: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Receive the next complete message.
    fn receive_async(&mut self) -> impl std::future::Future<Output = Result<Bytes>> + Send;
}
