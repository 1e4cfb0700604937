//! Length-prefix framing for carrying link frames over a byte stream.
//!
//! Wire format:
//! ```text
//! ┌────────────┬──────────────────────────┐
//! │ Length (4B)│ Link frame (N B)         │
//! │ LE u32     │ [seq][flags][chunk...]   │
//! └────────────┴──────────────────────────┘
//! ```
//!
//! The stream transport uses this to emulate the radio link's discrete
//! writes on top of TCP. The decoder accumulates incoming bytes and
//! yields complete frames, handling partial reads gracefully: a single
//! `read` may return part of the header, part of the payload, or
//! several frames concatenated.

/// Default upper bound on one stream frame.
pub const MAX_STREAM_FRAME: usize = 4096;

/// Frame header size (4-byte little-endian length).
pub const HEADER_SIZE: usize = 4;

/// Decoder state machine.
enum DecoderState {
    /// Waiting for header bytes.
    ReadingHeader { collected: usize },
    /// Header received, reading payload.
    ReadingPayload { expected: usize },
}

/// Streaming frame decoder.
pub struct FrameDecoder {
    state: DecoderState,
    header_buf: [u8; HEADER_SIZE],
    payload_buf: Vec<u8>,
    max_frame: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max(MAX_STREAM_FRAME)
    }

    pub fn with_max(max_frame: usize) -> Self {
        Self {
            state: DecoderState::ReadingHeader { collected: 0 },
            header_buf: [0; HEADER_SIZE],
            payload_buf: Vec::new(),
            max_frame,
        }
    }

    /// Feed bytes into the decoder and collect every frame they complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            match &mut self.state {
                DecoderState::ReadingHeader { collected } => {
                    let needed = HEADER_SIZE - *collected;
                    let to_copy = needed.min(data.len() - offset);

                    self.header_buf[*collected..*collected + to_copy]
                        .copy_from_slice(&data[offset..offset + to_copy]);

                    *collected += to_copy;
                    offset += to_copy;

                    if *collected == HEADER_SIZE {
                        let expected = u32::from_le_bytes(self.header_buf) as usize;

                        if expected == 0 || expected > self.max_frame {
                            // Invalid length: resync on the next header.
                            self.state = DecoderState::ReadingHeader { collected: 0 };
                            continue;
                        }

                        self.payload_buf.clear();
                        self.state = DecoderState::ReadingPayload { expected };
                    }
                }

                DecoderState::ReadingPayload { expected } => {
                    let needed = *expected - self.payload_buf.len();
                    let to_copy = needed.min(data.len() - offset);

                    self.payload_buf
                        .extend_from_slice(&data[offset..offset + to_copy]);
                    offset += to_copy;

                    if self.payload_buf.len() == *expected {
                        self.state = DecoderState::ReadingHeader { collected: 0 };
                        frames.push(core::mem::take(&mut self.payload_buf));
                    }
                }
            }
        }

        frames
    }

    /// Reset decoder state (e.g. after a transport reconnect).
    pub fn reset(&mut self) {
        self.state = DecoderState::ReadingHeader { collected: 0 };
        self.payload_buf.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a link frame as `[LE-u32 length][payload]`.
///
/// Returns `None` for empty or oversized payloads.
pub fn encode_frame(payload: &[u8], max_frame: usize) -> Option<Vec<u8>> {
    if payload.is_empty() || payload.len() > max_frame {
        return None;
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    Some(out)
}

// ── Tests ────────────────────────────────────────────────────
