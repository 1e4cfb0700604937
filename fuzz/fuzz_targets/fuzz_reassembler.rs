//! Fuzz target: `ChunkReassembler::feed`
//!
//! Splits the input into frames on a length byte and feeds them in order.
//! The reassembler must never panic or exceed `MAX_MESSAGE_SIZE`.
//!
//! cargo fuzz run fuzz_reassembler

#![no_main]

use cmdgate::rpc::chunked::{ChunkReassembler, MAX_MESSAGE_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reassembler = ChunkReassembler::default();
    let mut rest = data;

    while let Some((&len, tail)) = rest.split_first() {
        let take = usize::from(len).min(tail.len());
        let (frame, next) = tail.split_at(take);
        rest = next;

        if let Ok(Some(message)) = reassembler.feed(frame) {
            assert!(message.len() <= MAX_MESSAGE_SIZE);
            assert!(!reassembler.is_active());
        }
        assert!(reassembler.buffered() <= MAX_MESSAGE_SIZE);
    }
});
