//! Stream transport — link frames over any byte stream.
//!
//! Each link frame is wrapped as `[LE-u32 length][frame]` (see
//! [`codec`](crate::rpc::codec)) so a TCP connection or a pipe can stand in
//! for the radio link. The reading side uses
//! [`FrameDecoder`](crate::rpc::codec::FrameDecoder).
//!
//! ```text
//! ┌────────────┬──────────────────────────────┐
//! │ Length     │ Link frame                   │
//! │ (LE u32)   │ [seq][flags][chunk...]       │
//! └────────────┴──────────────────────────────┘
//! ```

use std::io::Write;

use log::debug;

use crate::rpc::codec::{MAX_STREAM_FRAME, encode_frame};
use crate::rpc::transport::{Transport, TransportError};

pub struct StreamTransport<W: Write> {
    writer: W,
    max_frame: usize,
}

impl<W: Write> StreamTransport<W> {
    /// `max_frame` is the link frame limit; it is capped at the stream
    /// codec's limit.
    pub fn new(writer: W, max_frame: usize) -> Self {
        Self {
            writer,
            max_frame: max_frame.min(MAX_STREAM_FRAME),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Transport for StreamTransport<W> {
    fn max_frame_size(&self) -> usize {
        self.max_frame
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let wire = encode_frame(frame, self.max_frame).ok_or(TransportError::FrameTooLarge {
            len: frame.len(),
            max: self.max_frame,
        })?;
        self.writer.write_all(&wire).map_err(io_error)?;
        debug!("LINK: wrote frame ({} bytes)", frame.len());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.writer.flush().map_err(io_error)
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted => TransportError::Closed,
        _ => TransportError::Io(e.to_string()),
    }
}
