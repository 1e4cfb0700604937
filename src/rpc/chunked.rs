//! Chunked transfer of one envelope over a size-limited channel.
//!
//! Every frame carries a two-byte header followed by a slice of the
//! serialised envelope:
//!
//! ```text
//! ┌──────┬──────┬──────────────────────────┐
//! │ Seq  │ Flags│  Chunk (1..=F bytes)     │
//! │ (1B) │ (1B) │  (0 bytes: empty message)│
//! └──────┴──────┴──────────────────────────┘
//! ```
//!
//! Flags: bit 0 = "more frames follow", bit 1 = "first frame". `Seq`
//! restarts at 0 on every message and wraps at 256. All frames except
//! the last carry exactly `F` chunk bytes.
//!
//! The reassembler tracks the *current* message only. A first frame
//! arriving while a message is still open is an interleave error and
//! both the partial message and the offending frame are dropped.

use core::fmt;
use std::time::{Duration, Instant};

use log::warn;

use super::envelope::StatusCode;

/// Frame header size (seq + flags).
pub const FRAME_HEADER_SIZE: usize = 2;

/// Frame flag: more frames follow.
pub const FLAG_MORE: u8 = 0x01;
/// Frame flag: this is the first frame of a message.
pub const FLAG_FIRST: u8 = 0x02;

/// Upper bound on a reassembled message.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default bound on how long a partial message may stay open.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(5);

// ── Errors ───────────────────────────────────────────────────

/// Transport-level reassembly failure. Never reaches the envelope codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame shorter than its header.
    Truncated,
    /// First frame of a new message while another was still open.
    Interleaved,
    /// Continuation frame with no message open.
    Orphan,
    /// Sequence gap or reorder.
    Sequence { expected: u8, got: u8 },
    /// Message grew past [`MAX_MESSAGE_SIZE`].
    Overflow,
    /// Terminal frame never arrived within the reassembly bound.
    Expired,
}

impl FrameError {
    pub const fn code(&self) -> StatusCode {
        StatusCode::Framing
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame shorter than header"),
            Self::Interleaved => write!(f, "new message started before previous completed"),
            Self::Orphan => write!(f, "continuation frame without open message"),
            Self::Sequence { expected, got } => {
                write!(f, "sequence error (expected {expected}, got {got})")
            }
            Self::Overflow => write!(f, "message exceeds {MAX_MESSAGE_SIZE} bytes"),
            Self::Expired => write!(f, "reassembly timed out"),
        }
    }
}

// ── Chunker ──────────────────────────────────────────────────

/// Split `data` into frames carrying at most `chunk_size` bytes each.
///
/// A zero `chunk_size` is treated as 1. An empty payload still yields
/// exactly one (empty, terminal) frame.
pub fn chunk_payload(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    let chunk_size = chunk_size.max(1);

    if data.is_empty() {
        return vec![vec![0, FLAG_FIRST]];
    }

    let total = data.len().div_ceil(chunk_size);
    data.chunks(chunk_size)
        .enumerate()
        .map(|(i, chunk)| {
            let mut flags = 0;
            if i == 0 {
                flags |= FLAG_FIRST;
            }
            if i + 1 < total {
                flags |= FLAG_MORE;
            }
            let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + chunk.len());
            frame.push(i as u8);
            frame.push(flags);
            frame.extend_from_slice(chunk);
            frame
        })
        .collect()
}

// ── Reassembler ──────────────────────────────────────────────

/// Reassembly buffer for the message currently arriving on a link.
pub struct ChunkReassembler {
    buffer: Vec<u8>,
    expected_seq: u8,
    active: bool,
    started: Option<Instant>,
    timeout: Duration,
}

impl ChunkReassembler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            expected_seq: 0,
            active: false,
            started: None,
            timeout,
        }
    }

    /// Feed one frame. Returns the complete payload once the terminal
    /// frame arrives.
    pub fn feed(&mut self, frame: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        self.feed_at(frame, Instant::now())
    }

    /// [`feed`](Self::feed) with an explicit clock, for tests.
    pub fn feed_at(&mut self, frame: &[u8], now: Instant) -> Result<Option<Vec<u8>>, FrameError> {
        if frame.len() < FRAME_HEADER_SIZE {
            return Err(FrameError::Truncated);
        }

        if self.is_expired(now) {
            warn!("LINK: dropping stale partial message ({} bytes)", self.buffer.len());
            self.reset();
        }

        let seq = frame[0];
        let flags = frame[1];
        let chunk = &frame[FRAME_HEADER_SIZE..];
        let is_first = flags & FLAG_FIRST != 0;
        let has_more = flags & FLAG_MORE != 0;

        if is_first {
            if self.active {
                self.reset();
                return Err(FrameError::Interleaved);
            }
            self.active = true;
            self.started = Some(now);
            self.expected_seq = 0;
        } else if !self.active {
            return Err(FrameError::Orphan);
        }

        if seq != self.expected_seq {
            let expected = self.expected_seq;
            self.reset();
            return Err(FrameError::Sequence { expected, got: seq });
        }

        if self.buffer.len() + chunk.len() > MAX_MESSAGE_SIZE {
            self.reset();
            return Err(FrameError::Overflow);
        }

        self.buffer.extend_from_slice(chunk);
        self.expected_seq = seq.wrapping_add(1);

        if has_more {
            Ok(None)
        } else {
            let complete = core::mem::take(&mut self.buffer);
            self.reset();
            Ok(Some(complete))
        }
    }

    /// Drop a partial message that outlived the reassembly bound.
    pub fn expire(&mut self, now: Instant) -> Result<(), FrameError> {
        if self.is_expired(now) {
            self.reset();
            return Err(FrameError::Expired);
        }
        Ok(())
    }

    fn is_expired(&self, now: Instant) -> bool {
        match self.started {
            Some(started) if self.active => now.saturating_duration_since(started) > self.timeout,
            _ => false,
        }
    }

    /// Reset the reassembler, discarding any partial data.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected_seq = 0;
        self.active = false;
        self.started = None;
    }

    /// Whether reassembly is in progress.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Bytes buffered for the open message.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for ChunkReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_REASSEMBLY_TIMEOUT)
    }
}

// ── Tests ────────────────────────────────────────────────────
