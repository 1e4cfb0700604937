//! Integration tests for the server link: framing, dispatch gates,
//! shutdown ordering and session teardown.

use std::time::Duration;

use futures_lite::future;
use serde_json::json;

use cmdgate::app::events::GatewayEvent;
use cmdgate::rpc::chunked::{FLAG_FIRST, FLAG_MORE, FrameError};
use cmdgate::rpc::envelope::{ArgMap, CommandRequest, StatusCode};
use cmdgate::rpc::transport::MemoryTransport;

use crate::mock_ports::{Harness, MockSystem, MockWifi, decode_all};

// ── Basic dispatch ────────────────────────────────────────────

#[test]
fn ping_gets_pong() {
    let h = Harness::with_defaults();
    h.send("r1", "ping", json!({}));
    h.settle(20);

    let out = h.responses();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, "r1");
    assert!(out[0].ok);
    assert_eq!(out[0].code, StatusCode::Ok);
    assert_eq!(out[0].text, "pong");
    assert!(out[0].is_final);
}

#[test]
fn unknown_command_rejected() {
    let h = Harness::with_defaults();
    h.send("r2", "bogus", json!({}));
    h.settle(20);

    let out = h.responses();
    assert_eq!(out.len(), 1);
    assert!(!out[0].ok);
    assert_eq!(out[0].code, StatusCode::UnknownCommand);
    assert_eq!(out[0].text, "Unknown command: bogus");
}

#[test]
fn unexpected_argument_rejected() {
    let h = Harness::with_defaults();
    h.send("r3", "ping", json!({"loud": true}));
    h.settle(20);

    let out = h.responses();
    assert_eq!(out[0].code, StatusCode::InvalidArgs);
    assert!(out[0].text.starts_with("Invalid args: "));
}

#[test]
fn malformed_json_is_dropped_silently() {
    let h = Harness::with_defaults();
    h.send_raw(b"{not json");
    h.settle(20);

    assert!(h.responses().is_empty());
    assert!(h.events().iter().any(|e| matches!(
        e,
        GatewayEvent::PayloadRejected { id: None, .. }
    )));

    // The link keeps serving afterwards.
    h.send("r4", "ping", json!({}));
    h.settle(20);
    assert_eq!(h.responses()[0].text, "pong");
}

#[test]
fn wrong_field_type_with_id_answers_invalid_payload() {
    let h = Harness::with_defaults();
    h.send_raw(br#"{"id":"x1","cmd":7}"#);
    h.settle(20);

    let out = h.responses();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, "x1");
    assert_eq!(out[0].code, StatusCode::InvalidPayload);
    assert!(out[0].text.starts_with("Invalid payload: "));
}

// ── Chunking ──────────────────────────────────────────────────

#[test]
fn small_frames_carry_long_responses() {
    let h = Harness::new(MockWifi::new(), MockSystem::new(), 8);
    h.send("h1", "help", json!({}));
    h.settle(20);

    let frames = h.wire.take_frames();
    assert!(frames.len() > 10);
    assert!(frames.iter().all(|f| f.len() <= 8));

    let mut reassembler = cmdgate::rpc::chunked::ChunkReassembler::default();
    let mut payloads: Vec<Vec<u8>> = frames
        .iter()
        .filter_map(|f| reassembler.feed(f).unwrap())
        .collect();
    assert_eq!(payloads.len(), 1);
    let response = cmdgate::rpc::envelope::decode_response(&payloads.remove(0)).unwrap();
    assert!(response.text.starts_with("Available commands:"));
    assert!(response.text.contains("- provision"));
    assert!(response.text.contains("- wifi.scan"));
}

#[test]
fn interleaved_message_is_discarded_and_link_recovers() {
    let h = Harness::with_defaults();

    h.link.on_receive(&[0, FLAG_FIRST | FLAG_MORE, b'{']).unwrap();
    let err = h.link.on_receive(&[0, FLAG_FIRST | FLAG_MORE, b'{']).unwrap_err();
    assert_eq!(err, FrameError::Interleaved);
    assert_eq!(err.code(), StatusCode::Framing);
    assert!(h.events().iter().any(|e| matches!(e, GatewayEvent::FrameDiscarded { .. })));

    h.settle(20);
    assert!(h.responses().is_empty());

    h.send("r5", "ping", json!({}));
    h.settle(20);
    let out = h.responses();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].text, "pong");
}

#[test]
fn orphan_continuation_rejected() {
    let h = Harness::with_defaults();
    let err = h.link.on_receive(&[1, 0, b'}']).unwrap_err();
    assert_eq!(err, FrameError::Orphan);
}

// ── Shutdown ──────────────────────────────────────────────────

#[test]
fn shutdown_acknowledges_before_stopping() {
    let h = Harness::with_defaults();
    h.send("s1", "shutdown", json!({}));

    let stopped = h.run(future::or(
        async {
            h.link.stopped().await;
            true
        },
        async {
            async_io_mini::Timer::after(Duration::from_millis(500)).await;
            false
        },
    ));
    assert!(stopped);
    assert!(h.link.is_stopped());

    let out = h.responses();
    assert_eq!(out.len(), 1);
    assert!(out[0].ok);
    assert_eq!(out[0].text, "Shutdown scheduled");
    assert!(h.events().iter().any(|e| matches!(
        e,
        GatewayEvent::ShutdownAccepted { id } if id == "s1"
    )));

    h.send("p1", "ping", json!({}));
    h.settle(20);
    let out = h.responses();
    assert_eq!(out[0].code, StatusCode::Busy);
    assert_eq!(out[0].text, "Busy: shutting down");
}

#[test]
fn queued_shutdown_ack_lost_to_disconnect_still_stops() {
    let h = Harness::with_defaults();
    let dispatcher = h.link.dispatcher().clone();

    let terminal = h.run(dispatcher.dispatch(CommandRequest::new("s1", "shutdown", ArgMap::new())));
    assert!(terminal.stops_link());
    assert!(dispatcher.is_stopping());

    // Queue the acknowledgment without letting the writer run.
    future::block_on(dispatcher.outbox().push(terminal.into_outbound()));
    assert!(!h.link.is_stopped());

    h.link.disconnect();
    assert!(dispatcher.outbox().is_empty());
    assert!(h.link.is_stopped());
}

// ── Session teardown ──────────────────────────────────────────

#[test]
fn disconnect_abandons_in_flight_work() {
    let h = Harness::new(
        MockWifi::new().slow(Duration::from_millis(200)),
        MockSystem::new(),
        360,
    );
    h.send("p1", "provision", json!({"ssid": "Home", "pwd": "password1"}));
    h.settle(30);

    let before = h.responses();
    assert!(!before.is_empty());
    assert!(before.iter().all(|r| r.is_interim()));
    assert!(h.link.dispatcher().busy().is_held());

    h.link.disconnect();
    assert!(!h.link.is_connected());
    assert!(!h.link.dispatcher().busy().is_held());

    h.settle(300);
    assert!(h.responses().is_empty());
    assert!(h.events().iter().any(|e| matches!(
        e,
        GatewayEvent::CommandFinished { id, abandoned: true, .. } if id == "p1"
    )));
    assert_eq!(h.link.dispatcher().in_flight(), 0);

    // A new client gets a clean session.
    let wire = MemoryTransport::new(360);
    h.link.connect(wire.clone());
    h.send("p2", "ping", json!({}));
    h.settle(20);
    let out = decode_all(&wire);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].id, "p2");
    assert_eq!(out[0].text, "pong");

    let ups = h
        .events()
        .iter()
        .filter(|e| matches!(e, GatewayEvent::LinkUp { .. }))
        .count();
    assert_eq!(ups, 2);
}

#[test]
fn duplicate_id_in_flight_is_busy() {
    let h = Harness::new(
        MockWifi::new().slow(Duration::from_millis(100)),
        MockSystem::new(),
        360,
    );
    h.send("same", "provision", json!({"ssid": "Home"}));
    h.settle(10);
    h.send("same", "ping", json!({}));
    h.settle(20);

    let out = h.responses();
    let rejected = out.iter().find(|r| r.is_final).unwrap();
    assert_eq!(rejected.code, StatusCode::Busy);
    assert_eq!(rejected.text, "Busy: request same already in flight");
    h.settle(150);
}
