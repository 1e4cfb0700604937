//! Fuzz target: `decode_request`
//!
//! Arbitrary payloads either decode to a request with non-empty `id` and
//! `cmd`, or fail with an error whose response (if any) is a terminal
//! `ERR_INVALID_PAYLOAD`.
//!
//! cargo fuzz run fuzz_decode_request

#![no_main]

use cmdgate::rpc::envelope::{StatusCode, decode_request};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match decode_request(data) {
        Ok(request) => {
            assert!(!request.id.is_empty());
            assert!(!request.cmd.is_empty());
        }
        Err(e) => {
            if let Some(response) = e.to_response() {
                assert_eq!(response.code, StatusCode::InvalidPayload);
                assert!(!response.ok);
                assert!(response.is_final);
            }
        }
    }
});
