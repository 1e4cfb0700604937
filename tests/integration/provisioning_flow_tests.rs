//! Integration tests for the provisioning flow and the service-backed
//! command set.
//!
//! Verifies the end-to-end sequence: a `provision` request arrives over
//! the link, every phase is reported as an interim response and mirrored
//! on the status board, and exactly one terminal response follows.

use std::time::Duration;

use serde_json::{Value, json};

use cmdgate::app::ports::{AccessPoint, SystemError, WifiError, WifiLink};
use cmdgate::rpc::envelope::{CommandResponse, StatusCode};

use crate::mock_ports::{Harness, MockSystem, MockWifi};

fn texts(responses: &[CommandResponse]) -> Vec<&str> {
    responses.iter().map(|r| r.text.as_str()).collect()
}

// ── provision ─────────────────────────────────────────────────

#[test]
fn provision_reports_every_phase() {
    let h = Harness::with_defaults();
    h.send("p1", "provision", json!({"ssid": "Home", "pwd": "password1"}));
    h.settle(30);

    let out = h.responses();
    assert_eq!(
        texts(&out),
        [
            "Started: Home",
            "Connecting",
            "Connecting: waiting for IP",
            "Success_IP:10.0.0.5",
        ]
    );
    assert!(out[..3].iter().all(|r| r.is_interim() && r.ok));
    let terminal = &out[3];
    assert!(terminal.is_final);
    assert_eq!(terminal.code, StatusCode::Ok);
    assert_eq!(
        terminal.data.as_ref().and_then(|d| d.get("ip")),
        Some(&Value::String("10.0.0.5".into()))
    );

    assert_eq!(h.services.wifi.connects.get(), 1);
    assert_eq!(h.services.wifi.last_password.borrow().as_deref(), Some("password1"));
    assert_eq!(h.services.board.get(), "Success_IP:10.0.0.5");
    assert!(!h.link.dispatcher().busy().is_held());

    h.send("s1", "status", json!({}));
    h.settle(20);
    let status = h.responses();
    assert!(status[0].text.starts_with("Status: Success_IP:10.0.0.5\nBusy: idle"));
}

#[test]
fn provision_skips_join_when_already_connected() {
    let h = Harness::new(MockWifi::new().joined_to("Home"), MockSystem::new(), 360);
    h.send("p2", "provision", json!({"ssid": "Home"}));
    h.settle(30);

    let out = h.responses();
    assert_eq!(
        texts(&out),
        [
            "Started: Home",
            "Connecting",
            "Connecting: Already connected",
            "Success_IP:10.0.0.5",
        ]
    );
    assert_eq!(h.services.wifi.connects.get(), 0);
}

#[test]
fn provision_join_failure_is_terminal_fail() {
    let h = Harness::new(
        MockWifi::new().failing(WifiError::ConnectFailed("Secrets were required".into())),
        MockSystem::new(),
        360,
    );
    h.send("p3", "provision", json!({"ssid": "Home", "pwd": "wrongpass"}));
    h.settle(30);

    let out = h.responses();
    let terminal = out.last().unwrap();
    assert!(terminal.is_final);
    assert!(!terminal.ok);
    assert_eq!(terminal.code, StatusCode::Internal);
    assert!(terminal.text.starts_with("Fail:"));
    assert!(terminal.text.contains("Secrets were required"));
    assert_eq!(h.services.board.get(), terminal.text);
    assert_eq!(out.iter().filter(|r| r.is_final).count(), 1);
}

#[test]
fn provision_without_address_fails() {
    let h = Harness::new(MockWifi::new().without_ip(), MockSystem::new(), 360);
    h.send("p4", "provision", json!({"ssid": "Home"}));
    h.settle(30);

    let out = h.responses();
    assert_eq!(out.last().unwrap().text, "Fail:No IP assigned");
}

#[test]
fn concurrent_provision_is_busy() {
    let h = Harness::new(
        MockWifi::new().slow(Duration::from_millis(100)),
        MockSystem::new(),
        360,
    );
    h.send("a", "provision", json!({"ssid": "Home"}));
    h.settle(10);
    h.send("b", "provision", json!({"ssid": "Other"}));
    h.settle(20);

    let out = h.responses();
    let rejected: Vec<_> = out.iter().filter(|r| r.id == "b").collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].code, StatusCode::Busy);
    assert_eq!(rejected[0].text, "Busy: provision in progress (a)");

    h.send("st", "status", json!({}));
    h.settle(20);
    let status = h.responses();
    assert!(status[0].text.starts_with("Status: Connecting\n"));
    assert!(status[0].text.contains("Busy: provision (a)"));

    h.settle(150);
    let out = h.responses();
    assert_eq!(out.last().unwrap().text, "Success_IP:10.0.0.5");
    assert_eq!(h.services.wifi.connects.get(), 1);
    assert!(!h.link.dispatcher().busy().is_held());

    // Once A has finished, B gets the lock.
    h.send("b2", "provision", json!({"ssid": "Other"}));
    h.settle(150);
    let out = h.responses();
    let terminal = out.iter().find(|r| r.id == "b2" && r.is_final).unwrap();
    assert!(terminal.ok);
    assert_eq!(terminal.text, "Success_IP:10.0.0.5");
    assert_eq!(h.services.wifi.connects.get(), 2);
}

#[test]
fn invalid_password_never_reaches_wifi() {
    let h = Harness::with_defaults();
    h.send("p5", "provision", json!({"ssid": "Home", "pwd": "short"}));
    h.settle(20);

    let out = h.responses();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].code, StatusCode::InvalidArgs);
    assert_eq!(out[0].text, "Invalid args: Invalid Wi-Fi password");
    assert_eq!(h.services.wifi.connects.get(), 0);
    assert_eq!(h.services.board.get(), "Standby");
}

#[test]
fn missing_ssid_is_invalid_args() {
    let h = Harness::with_defaults();
    h.send("p6", "provision", json!({}));
    h.settle(20);

    let out = h.responses();
    assert_eq!(out[0].code, StatusCode::InvalidArgs);
    assert!(out[0].text.contains("ssid"));
}

// ── status / system commands ──────────────────────────────────

#[test]
fn status_reports_unavailable_probes() {
    let mut system = MockSystem::new();
    system.hostname = Err(SystemError::NotFound("hostname"));
    system.link = WifiLink::Connected {
        ssid: "Home".into(),
        device: "wlan0".into(),
        ip: Some("10.0.0.5".into()),
    };
    let h = Harness::new(MockWifi::new(), system, 360);
    h.send("s2", "status", json!({}));
    h.settle(20);

    let text = &h.responses()[0].text;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Status: Standby");
    assert_eq!(lines[1], "Busy: idle");
    assert!(lines[2].starts_with("Hostname: unavailable"));
    assert_eq!(lines[3], "User: pilot");
    assert_eq!(lines[4], "Wi-Fi: connected (SSID=Home, IP=10.0.0.5)");
    assert!(lines[5].starts_with("SSH: "));
    assert_eq!(lines[6], "System: Linux 6.1.0 aarch64");
}

#[test]
fn wifi_scan_returns_json_report() {
    let mut system = MockSystem::new();
    system.aps = vec![
        AccessPoint {
            ssid: "Home".into(),
            chan: "6".into(),
            signal: 82,
        },
        AccessPoint {
            ssid: "Cafe".into(),
            chan: "11".into(),
            signal: 40,
        },
    ];
    let h = Harness::new(MockWifi::new(), system, 360);
    h.send("w1", "wifi.scan", json!({"ifname": "wlan1"}));
    h.settle(20);

    let out = h.responses();
    assert_eq!(out.len(), 2);
    assert!(out[0].is_interim());
    assert_eq!(out[0].text, "Scanning");

    let report: Value = serde_json::from_str(&out[1].text).unwrap();
    assert_eq!(report["ifname"], "wlan1");
    assert_eq!(report["count"], 2);
    assert_eq!(report["aps"][0]["ssid"], "Home");
    assert_eq!(report["aps"][1]["signal"], 40);
    assert_eq!(h.services.system.scans.get(), 1);
}

#[test]
fn ifconfig_and_whoami() {
    let h = Harness::with_defaults();
    h.send("i1", "net.ifconfig", json!({"ifname": " eth0 "}));
    h.send("u1", "sys.whoami", json!({}));
    h.settle(20);

    let out = h.responses();
    let ifconfig = out.iter().find(|r| r.id == "i1").unwrap();
    assert!(ifconfig.text.starts_with("eth0: flags="));
    let whoami = out.iter().find(|r| r.id == "u1").unwrap();
    assert_eq!(whoami.text, "pilot");
}

#[test]
fn help_for_one_command() {
    let h = Harness::with_defaults();
    h.send("h2", "help", json!({"cmd": "provision"}));
    h.send("h3", "help", json!({"cmd": "nope"}));
    h.settle(20);

    let out = h.responses();
    let details = out.iter().find(|r| r.id == "h2").unwrap();
    assert!(details.text.starts_with("Command: provision"));
    assert!(details.text.contains("Timeout: 60.0s"));
    assert!(details.text.contains("ssid (str, required)"));

    let unknown = out.iter().find(|r| r.id == "h3").unwrap();
    assert_eq!(unknown.code, StatusCode::InvalidArgs);
    assert_eq!(unknown.text, "Unknown command: nope");
}
