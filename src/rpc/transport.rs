//! Transport abstraction — one discrete, size-limited frame per write.
//!
//! Concrete implementations:
//! - Radio write/notify characteristic (external to this crate)
//! - Length-prefixed TCP stream ([`StreamTransport`](crate::adapters::stream_transport::StreamTransport))
//! - In-memory capture for tests ([`MemoryTransport`])
//!
//! The protocol core is generic over `Transport`, so adding a new
//! transport requires zero changes to the dispatch logic. The maximum
//! frame size is a per-connection property; the chunker derives the
//! chunk size from it for every message.

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use super::chunked::{FRAME_HEADER_SIZE, chunk_payload};

// ── Error type ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The link is gone.
    Closed,
    /// Frame larger than the negotiated maximum.
    FrameTooLarge { len: usize, max: usize },
    /// Maximum frame size leaves no room for a chunk.
    InvalidFrameSize(usize),
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "transport closed"),
            Self::FrameTooLarge { len, max } => {
                write!(f, "frame of {len} bytes exceeds maximum {max}")
            }
            Self::InvalidFrameSize(max) => {
                write!(f, "max frame size {max} leaves no room for payload")
            }
            Self::Io(msg) => write!(f, "transport I/O: {msg}"),
        }
    }
}

// ── Trait ────────────────────────────────────────────────────

/// Frame-oriented transport channel.
pub trait Transport {
    /// Maximum bytes per frame, header included.
    fn max_frame_size(&self) -> usize;

    /// Write one frame.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Chunk `payload` to the transport's frame size and write every frame
/// before returning. Returns the number of frames written.
pub fn send_message<T: Transport + ?Sized>(
    transport: &mut T,
    payload: &[u8],
) -> Result<usize, TransportError> {
    let max = transport.max_frame_size();
    if max <= FRAME_HEADER_SIZE {
        return Err(TransportError::InvalidFrameSize(max));
    }

    let frames = chunk_payload(payload, max - FRAME_HEADER_SIZE);
    for frame in &frames {
        transport.send_frame(frame)?;
    }
    transport.flush()?;
    Ok(frames.len())
}

// ── Implementations ──────────────────────────────────────────

/// A null transport that discards all writes.
/// Useful as a default when no client is connected.
pub struct NullTransport;

impl Transport for NullTransport {
    fn max_frame_size(&self) -> usize {
        usize::MAX
    }

    fn send_frame(&mut self, _frame: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Captures written frames in shared memory. Clones observe the same
/// frame log, so a test can keep one handle while the link owns another.
#[derive(Clone)]
pub struct MemoryTransport {
    max_frame: usize,
    frames: Rc<RefCell<Vec<Vec<u8>>>>,
    closed: Rc<RefCell<bool>>,
}

impl MemoryTransport {
    pub fn new(max_frame: usize) -> Self {
        Self {
            max_frame,
            frames: Rc::new(RefCell::new(Vec::new())),
            closed: Rc::new(RefCell::new(false)),
        }
    }

    /// Remove and return every frame written so far.
    pub fn take_frames(&self) -> Vec<Vec<u8>> {
        core::mem::take(&mut *self.frames.borrow_mut())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Make every further write fail with [`TransportError::Closed`].
    pub fn close(&self) {
        *self.closed.borrow_mut() = true;
    }
}

impl Transport for MemoryTransport {
    fn max_frame_size(&self) -> usize {
        self.max_frame
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed);
        }
        if frame.len() > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                len: frame.len(),
                max: self.max_frame,
            });
        }
        self.frames.borrow_mut().push(frame.to_vec());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::chunked::ChunkReassembler;

    #[test]
    fn send_message_respects_frame_size() {
        let mut t = MemoryTransport::new(6);
        let n = send_message(&mut t, b"abcdefghij").unwrap();
        assert_eq!(n, 3);
        let frames = t.take_frames();
        assert!(frames.iter().all(|f| f.len() <= 6));

        let mut r = ChunkReassembler::default();
        let mut out = None;
        for f in &frames {
            out = r.feed(f).unwrap();
        }
        assert_eq!(out.unwrap(), b"abcdefghij");
    }

    #[test]
    fn header_sized_transport_rejected() {
        let mut t = MemoryTransport::new(FRAME_HEADER_SIZE);
        assert_eq!(
            send_message(&mut t, b"x"),
            Err(TransportError::InvalidFrameSize(FRAME_HEADER_SIZE))
        );
    }

    #[test]
    fn closed_transport_errors() {
        let mut t = MemoryTransport::new(32);
        t.close();
        assert_eq!(send_message(&mut t, b"x"), Err(TransportError::Closed));
    }

    #[test]
    fn null_transport_accepts_everything() {
        let mut t = NullTransport;
        assert_eq!(send_message(&mut t, &[0u8; 1000]).unwrap(), 1);
    }
}
