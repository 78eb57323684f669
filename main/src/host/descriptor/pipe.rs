//! An anonymous pipe (also used for `socketpair(AF_UNIX)`'s datagram-free byte-stream mode).
//! Grounded on the shape of the teacher's `host/descriptor/pipe.rs` (a shared buffer with two
//! connected ends via `Arc<AtomicRefCell<SharedBuf>>`), kept here almost unchanged: `Host` (and
//! everything it owns, transitively including this) migrates between worker threads across
//! scheduler rounds under work-stealing policies, so it must stay `Send` even though only one
//! thread ever touches a given host at a time — `atomic_refcell::AtomicRefCell` gives the same
//! single-owner `RefCell` ergonomics as the teacher's without `Mutex` poisoning or lock overhead.
//! Simplified away from the teacher's is the event-listener/callback-queue system: readiness is
//! computed on demand by `poll_state` instead of pushed through a listener chain.

use std::collections::VecDeque;
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PipeError {
    WouldBlock,
    /// The read end has closed; further writes raise `EPIPE`.
    BrokenPipe,
}

struct SharedBuffer {
    data: VecDeque<u8>,
    capacity: usize,
    reader_open: bool,
    writer_open: bool,
}

pub struct PipeEnd {
    buffer: Arc<AtomicRefCell<SharedBuffer>>,
    is_read_end: bool,
}

impl PipeEnd {
    pub fn new_pair(capacity: usize) -> (PipeEnd, PipeEnd) {
        let buffer = Arc::new(AtomicRefCell::new(SharedBuffer {
            data: VecDeque::new(),
            capacity,
            reader_open: true,
            writer_open: true,
        }));
        (
            PipeEnd { buffer: buffer.clone(), is_read_end: true },
            PipeEnd { buffer, is_read_end: false },
        )
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, PipeError> {
        debug_assert!(!self.is_read_end);
        let mut buf = self.buffer.borrow_mut();
        if !buf.reader_open {
            return Err(PipeError::BrokenPipe);
        }
        let available = buf.capacity.saturating_sub(buf.data.len());
        if available == 0 {
            return Err(PipeError::WouldBlock);
        }
        let to_write = bytes.len().min(available);
        buf.data.extend(&bytes[..to_write]);
        Ok(to_write)
    }

    pub fn read(&mut self, max_len: usize) -> Result<Vec<u8>, PipeError> {
        debug_assert!(self.is_read_end);
        let mut buf = self.buffer.borrow_mut();
        if buf.data.is_empty() {
            if buf.writer_open {
                return Err(PipeError::WouldBlock);
            }
            return Ok(Vec::new());
        }
        let to_read = buf.data.len().min(max_len);
        Ok(buf.data.drain(..to_read).collect())
    }

    pub fn poll_state(&self) -> tcp::PollState {
        let buf = self.buffer.borrow();
        let mut state = tcp::PollState::empty();
        if self.is_read_end {
            if !buf.data.is_empty() || !buf.writer_open {
                state |= tcp::PollState::READABLE;
            }
            if !buf.writer_open {
                state |= tcp::PollState::RECV_CLOSED;
            }
        } else if buf.reader_open && buf.data.len() < buf.capacity {
            state |= tcp::PollState::WRITABLE;
        }
        state
    }
}

impl Drop for PipeEnd {
    fn drop(&mut self) {
        let mut buf = self.buffer.borrow_mut();
        if self.is_read_end {
            buf.reader_open = false;
        } else {
            buf.writer_open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let (mut read_end, mut write_end) = PipeEnd::new_pair(16);
        assert_eq!(write_end.write(b"hello").unwrap(), 5);
        assert_eq!(read_end.read(16).unwrap(), b"hello");
    }

    #[test]
    fn read_blocks_on_empty_buffer_while_writer_open() {
        let (mut read_end, _write_end) = PipeEnd::new_pair(16);
        assert_eq!(read_end.read(16), Err(PipeError::WouldBlock));
    }

    #[test]
    fn read_returns_eof_once_writer_dropped() {
        let (mut read_end, write_end) = PipeEnd::new_pair(16);
        drop(write_end);
        assert_eq!(read_end.read(16).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn write_returns_broken_pipe_once_reader_dropped() {
        let (read_end, mut write_end) = PipeEnd::new_pair(16);
        drop(read_end);
        assert_eq!(write_end.write(b"x"), Err(PipeError::BrokenPipe));
    }

    #[test]
    fn write_blocks_once_capacity_is_exhausted() {
        let (_read_end, mut write_end) = PipeEnd::new_pair(4);
        assert_eq!(write_end.write(b"abcd").unwrap(), 4);
        assert_eq!(write_end.write(b"e"), Err(PipeError::WouldBlock));
    }

    #[test]
    fn poll_state_reflects_data_and_peer_closure() {
        let (mut read_end, mut write_end) = PipeEnd::new_pair(4);
        assert!(write_end.poll_state().contains(tcp::PollState::WRITABLE));
        assert!(!read_end.poll_state().contains(tcp::PollState::READABLE));
        write_end.write(b"x").unwrap();
        assert!(read_end.poll_state().contains(tcp::PollState::READABLE));
        drop(write_end);
        assert!(read_end.poll_state().contains(tcp::PollState::RECV_CLOSED));
    }
}
