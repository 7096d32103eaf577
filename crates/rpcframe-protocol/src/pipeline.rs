//! Decode pipeline: a producer thread feeds a received message through the
//! chunked decoder and hands values to the reading session over a bounded
//! channel.

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use tracing::trace;

use crate::decoder::{ValueDecoder, ValueSource};
use crate::error::{ProtocolError, Result};
use crate::value::Value;

const THREAD_NAME: &str = "rpcframe-decode";

/// Consumer side of a running decode.
///
/// Values arrive in exactly the order they were encoded, whatever the chunk size.
/// Reads block on the channel until the producer delivers the next value.
#[derive(Debug)]
pub struct DecodePipeline {
    rx: Receiver<Result<Value>>,
    handle: Option<JoinHandle<()>>,
    consumed: usize,
}

impl DecodePipeline {
    /// Decode `message` on a background thread, `chunk_size` bytes at a time,
    /// queueing at most `capacity` values ahead of the reader.
    pub fn from_message(message: Bytes, chunk_size: usize, capacity: usize) -> Result<Self> {
        let chunk_size = chunk_size.max(1);
        let chunks = (0..message.len())
            .step_by(chunk_size)
            .map(move |start| message.slice(start..start.saturating_add(chunk_size).min(message.len())));
        Self::spawn_chunks(chunks, capacity)
    }

    /// Decode an arbitrary chunk sequence on a background thread.
    pub fn spawn_chunks<I>(chunks: I, capacity: usize) -> Result<Self>
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        let chunks = chunks.into_iter();
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || produce(chunks, tx))
            .map_err(|err| ProtocolError::Pipeline(format!("failed to spawn decode thread: {err}")))?;

        Ok(Self {
            rx,
            handle: Some(handle),
            consumed: 0,
        })
    }

    /// Values handed to the reader so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Drain whatever the reader left unread, wait for the producer and return
    /// the number of leftover values.
    pub fn finish(mut self) -> Result<usize> {
        let mut remaining = 0usize;
        let mut failure = None;
        while let Ok(item) = self.rx.recv() {
            match item {
                Ok(_) => remaining += 1,
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }

        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| ProtocolError::Pipeline("decode thread panicked".to_string()))?;
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(remaining),
        }
    }
}

impl ValueSource for DecodePipeline {
    fn next_value(&mut self) -> Result<Value> {
        let value = self.rx.recv().map_err(|_| ProtocolError::TruncatedMessage)??;
        self.consumed += 1;
        Ok(value)
    }
}

fn produce<I: Iterator<Item = Bytes>>(chunks: I, tx: SyncSender<Result<Value>>) {
    let mut decoder = ValueDecoder::new();
    let mut produced = 0usize;

    for chunk in chunks {
        decoder.push(&chunk);
        loop {
            match decoder.decode_next() {
                Ok(Some(value)) => {
                    if tx.send(Ok(value)).is_err() {
                        trace!(produced, "reader went away, stopping decode");
                        return;
                    }
                    produced += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return;
                }
            }
        }
    }

    if decoder.buffered() > 0 {
        let _ = tx.send(Err(ProtocolError::TruncatedMessage));
    }
    trace!(produced, "decode finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ValueEncoder;

    fn encoded(n: i64) -> Bytes {
        let mut enc = ValueEncoder::new();
        for i in 0..n {
            enc.write_integer(i * 1_000).unwrap();
            enc.write_string(&format!("value-{i}")).unwrap();
        }
        enc.finish()
    }

    #[test]
    fn fifo_across_chunk_sizes() {
        let message = encoded(50);
        for chunk_size in [1, 2, 3, 7, 64, 1024, usize::MAX] {
            let mut pipeline = DecodePipeline::from_message(message.clone(), chunk_size, 4).unwrap();
            for i in 0..50 {
                assert_eq!(pipeline.read_integer().unwrap(), i * 1_000);
                assert_eq!(pipeline.read_string().unwrap(), format!("value-{i}"));
            }
            assert_eq!(pipeline.consumed(), 100);
            assert_eq!(pipeline.finish().unwrap(), 0);
        }
    }

    #[test]
    fn reading_past_end_is_truncation() {
        let mut pipeline = DecodePipeline::from_message(encoded(1), 8, 4).unwrap();
        pipeline.read_integer().unwrap();
        pipeline.read_string().unwrap();
        assert!(matches!(
            pipeline.next_value(),
            Err(ProtocolError::TruncatedMessage)
        ));
    }

    #[test]
    fn partial_trailing_value_is_truncation() {
        let message = encoded(2);
        let cut = message.slice(..message.len() - 2);
        let mut pipeline = DecodePipeline::from_message(cut, 3, 4).unwrap();
        pipeline.read_integer().unwrap();
        pipeline.read_string().unwrap();
        pipeline.read_integer().unwrap();
        assert!(matches!(
            pipeline.next_value(),
            Err(ProtocolError::TruncatedMessage)
        ));
    }

    #[test]
    fn finish_counts_unread_values() {
        let mut pipeline = DecodePipeline::from_message(encoded(10), 5, 2).unwrap();
        pipeline.read_integer().unwrap();
        assert_eq!(pipeline.finish().unwrap(), 19);
    }

    #[test]
    fn dropping_reader_stops_producer() {
        let pipeline = DecodePipeline::from_message(encoded(10_000), 16, 1).unwrap();
        drop(pipeline);
    }

    #[test]
    fn explicit_chunks_are_reassembled() {
        let message = encoded(3);
        let (head, tail) = message.split_at(5);
        let chunks = vec![Bytes::copy_from_slice(head), Bytes::copy_from_slice(tail)];
        let mut pipeline = DecodePipeline::spawn_chunks(chunks, 8).unwrap();
        assert_eq!(pipeline.read_integer().unwrap(), 0);
        assert_eq!(pipeline.read_string().unwrap(), "value-0");
        assert_eq!(pipeline.finish().unwrap(), 4);
    }
}
