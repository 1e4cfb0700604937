//! Caller-side correlation against a live server link.
//!
//! Two in-memory transports stand in for the two directions of the
//! radio link; a relay task carries server frames back to the tracker.

use std::rc::Rc;
use std::time::Duration;

use async_io_mini::Timer;
use serde_json::{Map, json};

use cmdgate::rpc::correlation::CorrelationTracker;
use cmdgate::rpc::envelope::{CommandRequest, StatusCode};
use cmdgate::rpc::io_task::ServerLink;
use cmdgate::rpc::transport::MemoryTransport;

use crate::mock_ports::{Harness, MockSystem, MockWifi};

type Tracker = CorrelationTracker<MemoryTransport>;

/// Carry requests to the link and responses back to the tracker.
async fn relay(
    link: Rc<ServerLink<MemoryTransport>>,
    uplink: MemoryTransport,
    downlink: MemoryTransport,
    tracker: Rc<Tracker>,
) {
    loop {
        for frame in uplink.take_frames() {
            let _ = link.on_receive(&frame);
        }
        for frame in downlink.take_frames() {
            let _ = tracker.on_frame(&frame);
        }
        Timer::after(Duration::from_millis(5)).await;
    }
}

fn start_relay(h: &Harness, uplink: &MemoryTransport, tracker: &Rc<Tracker>) {
    h.executor
        .spawn(relay(
            h.link.clone(),
            uplink.clone(),
            h.wire.clone(),
            tracker.clone(),
        ))
        .detach();
}

#[test]
fn provision_round_trip_with_progress() {
    let h = Harness::new(MockWifi::new(), MockSystem::new(), 64);
    let uplink = MemoryTransport::new(64);
    let tracker = Rc::new(CorrelationTracker::new(uplink.clone(), "cli"));
    start_relay(&h, &uplink, &tracker);

    let mut args = Map::new();
    args.insert("ssid".into(), json!("Home"));
    args.insert("pwd".into(), json!("password1"));
    let request = CommandRequest::new("c1", "provision", args);
    let exchange = tracker.begin(&request, Duration::from_secs(2)).unwrap();

    let mut seen = Vec::new();
    let terminal = h.run(exchange.finish_with(|r| seen.push(r.text.clone())));

    assert_eq!(terminal.id, "c1");
    assert!(terminal.ok);
    assert_eq!(terminal.text, "Success_IP:10.0.0.5");
    assert_eq!(
        seen,
        ["Started: Home", "Connecting", "Connecting: waiting for IP"]
    );
    assert_eq!(tracker.pending(), 0);
}

#[test]
fn send_generates_ids_and_resolves() {
    let h = Harness::new(MockWifi::new(), MockSystem::new(), 64);
    let uplink = MemoryTransport::new(64);
    let tracker = Rc::new(CorrelationTracker::new(uplink.clone(), "cli"));
    start_relay(&h, &uplink, &tracker);

    let first = h
        .run(tracker.send("ping", Map::new(), Duration::from_secs(2)))
        .unwrap();
    let second = h
        .run(tracker.send("bogus", Map::new(), Duration::from_secs(2)))
        .unwrap();

    assert_eq!(first.text, "pong");
    assert_eq!(first.id, "cli-1");
    assert_eq!(second.code, StatusCode::UnknownCommand);
    assert_ne!(first.id, second.id);
}

#[test]
fn unanswered_request_times_out() {
    let uplink = MemoryTransport::new(64);
    let tracker = CorrelationTracker::new(uplink.clone(), "cli");
    let executor = edge_executor::LocalExecutor::<'_, 8>::new();

    let request = CommandRequest::new("lost", "ping", Map::new());
    let exchange = tracker.begin(&request, Duration::from_millis(100)).unwrap();
    assert!(uplink.frame_count() > 0);

    let response = futures_lite::future::block_on(executor.run(exchange.finish()));
    assert!(!response.ok);
    assert_eq!(response.code, StatusCode::Timeout);
    assert_eq!(response.text, "No response within 0.1s");
}
