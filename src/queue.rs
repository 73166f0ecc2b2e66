//! Bounded message queue for one direction of one endpoint.
//!
//! A [`QueuePair`] keeps message boundaries inside a byte ring by storing
//! every message's length in a second ring. Memory is bounded by
//! `capacity × max_entry` and nothing is allocated per message.

use core::sync::atomic::{AtomicU64, Ordering};
use log::error;
use snafu::ensure;

use crate::buffer::RingBuffer;
use crate::error::{NoBuffersSnafu, Result};

#[derive(Debug)]
pub(crate) struct QueuePair {
    lengths: RingBuffer,
    bytes: RingBuffer,
    max_entry: usize,
}

impl QueuePair {
    /// Queue holding up to `capacity` messages of at most `max_entry` bytes.
    pub fn new(capacity: usize, max_entry: usize) -> QueuePair {
        debug_assert!(max_entry <= usize::from(u8::MAX));
        QueuePair {
            lengths: RingBuffer::with_capacity(capacity),
            bytes: RingBuffer::with_capacity(capacity * max_entry),
            max_entry,
        }
    }

    /// Number of complete messages queued.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lengths.free() == 0
    }

    /// Store one message, adding the stored byte count to `bytes_in`.
    ///
    /// Fails with `NoBuffers` without writing anything when every message
    /// slot is taken. Otherwise the payload is stored best-effort: if the byte
    /// ring has less room than `payload.len()`, only what fits is kept, and
    /// the recorded length is the stored count.
    pub fn enqueue(&mut self, payload: &[u8], bytes_in: &AtomicU64) -> Result<usize> {
        ensure!(!self.is_full(), NoBuffersSnafu);
        let payload = &payload[..payload.len().min(self.max_entry)];
        let stored = self.bytes.write(payload);
        // stored <= max_entry <= u8::MAX
        self.lengths.push(stored as u8);
        bytes_in.fetch_add(stored as u64, Ordering::Relaxed);
        Ok(stored)
    }

    /// Pop the oldest message into `buf`, returning its length or 0 if empty.
    pub fn dequeue(&mut self, buf: &mut [u8]) -> usize {
        let expected = match self.lengths.pop() {
            Some(len) => usize::from(len),
            None => return 0,
        };
        let take = expected.min(buf.len());
        let count = self.bytes.read(&mut buf[..take]);
        if count < expected {
            // Either the caller's buffer is too short or the rings disagree.
            // Skip what is left of this message so later ones stay framed.
            let rest = (expected - count).min(self.bytes.len());
            self.bytes.consume(rest);
            error!(
                "queue framing violated: message of {} bytes, {} delivered ({} available, buffer {})",
                expected,
                count,
                count + rest,
                buf.len()
            );
        }
        count
    }

    /// Copy the oldest message into `buf` without removing it.
    pub fn front(&self, buf: &mut [u8]) -> usize {
        match self.lengths.front() {
            Some(len) => {
                let expected = usize::from(len).min(buf.len());
                self.bytes.peek(&mut buf[..expected])
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_framing() {
        let bytes_in = AtomicU64::new(0);
        let mut queue = QueuePair::new(16, 8);
        let messages: Vec<Vec<u8>> = (1..=8u8).map(|n| (0..n).collect()).collect();
        for msg in &messages {
            assert_eq!(queue.enqueue(msg, &bytes_in).unwrap(), msg.len());
        }
        assert_eq!(queue.len(), 8);
        assert_eq!(bytes_in.load(Ordering::Relaxed), 36);

        let mut buf = [0; 8];
        for msg in &messages {
            let len = queue.dequeue(&mut buf);
            assert_eq!(&buf[..len], msg.as_slice());
        }
        assert_eq!(queue.dequeue(&mut buf), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full() {
        let bytes_in = AtomicU64::new(0);
        let mut queue = QueuePair::new(2, 8);
        queue.enqueue(&[1], &bytes_in).unwrap();
        queue.enqueue(&[2, 2], &bytes_in).unwrap();
        assert!(queue.is_full());
        assert_eq!(queue.enqueue(&[3], &bytes_in), Err(Error::NoBuffers));
        assert_eq!(queue.len(), 2);
        assert_eq!(bytes_in.load(Ordering::Relaxed), 3);

        let mut buf = [0; 8];
        assert_eq!(queue.dequeue(&mut buf), 1);
        assert_eq!(queue.enqueue(&[3], &bytes_in), Ok(1));
    }

    #[test]
    fn test_front_keeps_message() {
        let bytes_in = AtomicU64::new(0);
        let mut queue = QueuePair::new(4, 10);
        queue.enqueue(b"\x00\x10abc", &bytes_in).unwrap();
        queue.enqueue(b"\x00\x11d", &bytes_in).unwrap();

        let mut buf = [0; 10];
        assert_eq!(queue.front(&mut buf), 5);
        assert_eq!(&buf[..5], b"\x00\x10abc");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue(&mut buf), 5);
        assert_eq!(queue.front(&mut buf), 3);
        assert_eq!(&buf[..3], b"\x00\x11d");
    }

    #[test]
    fn test_short_buffer_keeps_framing() {
        let bytes_in = AtomicU64::new(0);
        let mut queue = QueuePair::new(4, 8);
        queue.enqueue(&[1, 2, 3, 4], &bytes_in).unwrap();
        queue.enqueue(&[5], &bytes_in).unwrap();

        let mut small = [0; 2];
        assert_eq!(queue.dequeue(&mut small), 2);
        let mut buf = [0; 8];
        assert_eq!(queue.dequeue(&mut buf), 1);
        assert_eq!(buf[0], 5);
    }

    #[test]
    fn test_oversized_entry_truncated() {
        let bytes_in = AtomicU64::new(0);
        let mut queue = QueuePair::new(4, 2);
        assert_eq!(queue.enqueue(&[1, 2, 3], &bytes_in), Ok(2));
        let mut buf = [0; 8];
        assert_eq!(queue.dequeue(&mut buf), 2);
        assert_eq!(&buf[..2], &[1, 2]);
    }
}
