//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics, never yields empty or oversized frames,
//! and behaves the same after a reset.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use cmdgate::rpc::codec::{FrameDecoder, MAX_STREAM_FRAME};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::new();

    let first = decoder.feed(data);
    for frame in &first {
        assert!(frame.len() <= MAX_STREAM_FRAME, "frame exceeds MAX_STREAM_FRAME");
        assert!(!frame.is_empty(), "decoder must not yield empty frames");
    }

    // A reset decoder sees the same stream the same way.
    decoder.reset();
    assert_eq!(decoder.feed(data), first);
});
