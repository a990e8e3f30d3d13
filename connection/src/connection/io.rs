//! I/O layer for connection handling.
//!
//! A connection is generic over [`Socket`], the byte stream plus the handful of
//! socket queries the state machine needs. Outbound frames sit in a
//! [`SendQueue`] until the socket accepts them, a short write leaves the
//! remainder for the next writable notification.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Bytes pulled from the socket per read call.
pub(crate) const READ_CHUNK_SIZE: usize = 16 * 1024;

/// A non-blocking byte stream to a peer.
pub trait Socket: Read + Write {
    /// Address of our end of the stream.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Address of the remote end. Fails with [`io::ErrorKind::NotConnected`]
    /// while a connect is still in flight.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Take any pending socket level error, such as a refused connect.
    fn take_error(&self) -> io::Result<Option<io::Error>>;
}

/// FIFO of serialized frames awaiting the socket.
#[derive(Debug, Default)]
pub struct SendQueue {
    frames: VecDeque<Vec<u8>>,
    /// Bytes of the front frame already written.
    offset: usize,
}

impl SendQueue {
    pub fn push(&mut self, frame: Vec<u8>) {
        if !frame.is_empty() {
            self.frames.push_back(frame);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total bytes still owed to the socket.
    pub fn pending_bytes(&self) -> usize {
        self.frames.iter().map(Vec::len).sum::<usize>() - self.offset
    }

    /// Write as much as the writer accepts.
    ///
    /// Returns `true` if data remains queued. A short write or
    /// [`io::ErrorKind::WouldBlock`] stops the flush without error.
    pub fn flush<W: Write>(&mut self, writer: &mut W) -> io::Result<bool> {
        while let Some(front) = self.frames.front() {
            let remaining = &front[self.offset..];
            match writer.write(remaining) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    ))
                }
                Ok(n) if n < remaining.len() => {
                    self.offset += n;
                    return Ok(true);
                }
                Ok(_) => {
                    self.frames.pop_front();
                    self.offset = 0;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `per_call` bytes per write and `budget` bytes overall.
    struct Throttled {
        written: Vec<u8>,
        per_call: usize,
        budget: usize,
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.per_call).min(self.budget);
            self.written.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_flush_everything() {
        let mut queue = SendQueue::default();
        queue.push(vec![1, 2, 3]);
        queue.push(vec![4, 5]);
        let mut writer = Throttled {
            written: Vec::new(),
            per_call: usize::MAX,
            budget: usize::MAX,
        };

        assert!(!queue.flush(&mut writer).unwrap());
        assert!(queue.is_empty());
        assert_eq!(writer.written, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_short_write_keeps_offset() {
        let mut queue = SendQueue::default();
        queue.push((0..10).collect());
        queue.push(vec![10, 11]);
        let mut writer = Throttled {
            written: Vec::new(),
            per_call: 4,
            budget: usize::MAX,
        };

        assert!(queue.flush(&mut writer).unwrap());
        assert_eq!(queue.pending_bytes(), 8);
        assert!(queue.flush(&mut writer).unwrap());
        assert_eq!(queue.pending_bytes(), 4);
        assert!(!queue.flush(&mut writer).unwrap());
        assert!(queue.is_empty());
        assert_eq!(writer.written, (0..12).collect::<Vec<u8>>());
    }

    #[test]
    fn test_would_block_is_not_an_error() {
        let mut queue = SendQueue::default();
        queue.push(vec![9; 6]);
        let mut writer = Throttled {
            written: Vec::new(),
            per_call: usize::MAX,
            budget: 0,
        };

        assert!(queue.flush(&mut writer).unwrap());
        assert_eq!(queue.pending_bytes(), 6);

        writer.budget = 6;
        assert!(!queue.flush(&mut writer).unwrap());
        assert_eq!(writer.written, vec![9; 6]);
    }

    #[test]
    fn test_empty_frames_are_skipped() {
        let mut queue = SendQueue::default();
        queue.push(Vec::new());
        assert!(queue.is_empty());
    }
}
