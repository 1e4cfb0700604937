//! Built-in commands.
//!
//! Each command is a [`CommandSpec`] constructor plus an async handler.
//! Handlers that touch the host receive the shared
//! [`Services`](super::service::Services) and reach the outside world only
//! through its ports.
//!
//! | name           | permission | risk   | timeout | exclusive |
//! |----------------|------------|--------|---------|-----------|
//! | `help`         | user       | low    | 2 s     |           |
//! | `ping`         | user       | low    | 2 s     |           |
//! | `status`       | user       | low    | 8 s     |           |
//! | `provision`    | user       | medium | 60 s    | yes       |
//! | `shutdown`     | operator   | high   | 2 s     |           |
//! | `sys.whoami`   | operator   | medium | 3 s     |           |
//! | `net.ifconfig` | operator   | medium | 4 s     |           |
//! | `wifi.scan`    | operator   | medium | 15 s    | yes       |

use core::fmt;
use std::rc::Rc;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;

use crate::rpc::engine::Invocation;
use crate::rpc::registry::{
    ArgKind, ArgSpec, Args, CommandSpec, HandlerError, HandlerResult, Outcome, Permission, Risk,
};
use crate::rpc::reporter::{PhaseObserver, ProvisionReporter};

use super::ports::{AccessPoint, SystemPort, WifiLink, WifiPort};
use super::service::Services;

/// Cap on command output text.
pub const OUTPUT_LIMIT: usize = 2000;

/// Cut `text` at `limit` chars, marking the cut.
pub fn truncate_output(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((at, _)) => format!("{}...(truncated)", &text[..at]),
        None => text.to_string(),
    }
}

// ── Argument schemas ─────────────────────────────────────────

const HELP_ARGS: &[ArgSpec] = &[ArgSpec::optional(
    "cmd",
    ArgKind::Str,
    "Command name for details",
)];

const PROVISION_ARGS: &[ArgSpec] = &[
    ArgSpec::required("ssid", ArgKind::Str, "Wi-Fi SSID"),
    ArgSpec::optional("pwd", ArgKind::Str, "Wi-Fi password"),
];

const IFNAME_ARGS: &[ArgSpec] = &[ArgSpec::optional(
    "ifname",
    ArgKind::Str,
    "Network interface (default: configured interface)",
)];

/// SSID 1..=32 bytes without control characters; password empty or
/// 8..=64 bytes.
pub fn check_credentials(args: &Args) -> Result<(), String> {
    let ssid = args.str("ssid").map(str::trim).unwrap_or_default();
    if ssid.is_empty() || ssid.len() > 32 || ssid.chars().any(char::is_control) {
        return Err("Invalid SSID".into());
    }
    if let Some(pwd) = args.str("pwd") {
        if !(8..=64).contains(&pwd.len()) {
            return Err("Invalid Wi-Fi password".into());
        }
    }
    Ok(())
}

// ── Specs ────────────────────────────────────────────────────

pub fn help_spec() -> CommandSpec {
    CommandSpec::new("help", "List commands or show one command's details")
        .usage("help {cmd?: str}")
        .timeout(Duration::from_secs(2))
        .args(HELP_ARGS)
}

pub fn ping_spec() -> CommandSpec {
    CommandSpec::new("ping", "Liveness check")
        .usage("ping")
        .timeout(Duration::from_secs(2))
}

pub fn status_spec() -> CommandSpec {
    CommandSpec::new("status", "Read current server status")
        .usage("status")
        .timeout(Duration::from_secs(8))
}

pub fn provision_spec() -> CommandSpec {
    CommandSpec::new("provision", "Join a Wi-Fi network and report the assigned IP")
        .usage("provision {ssid: str, pwd?: str}")
        .risk(Risk::Medium)
        .timeout(Duration::from_secs(60))
        .exclusive()
        .args(PROVISION_ARGS)
        .check(check_credentials)
}

pub fn shutdown_spec() -> CommandSpec {
    CommandSpec::new("shutdown", "Gracefully stop the gateway")
        .usage("shutdown")
        .permission(Permission::Operator)
        .risk(Risk::High)
        .timeout(Duration::from_secs(2))
}

pub fn whoami_spec() -> CommandSpec {
    CommandSpec::new("sys.whoami", "Show the effective operator account")
        .usage("sys.whoami")
        .permission(Permission::Operator)
        .risk(Risk::Medium)
        .timeout(Duration::from_secs(3))
}

pub fn ifconfig_spec() -> CommandSpec {
    CommandSpec::new("net.ifconfig", "Show network interface configuration")
        .usage("net.ifconfig {ifname?: str}")
        .permission(Permission::Operator)
        .risk(Risk::Medium)
        .timeout(Duration::from_secs(4))
        .args(IFNAME_ARGS)
}

pub fn wifi_scan_spec() -> CommandSpec {
    CommandSpec::new("wifi.scan", "Scan nearby Wi-Fi networks")
        .usage("wifi.scan {ifname?: str}")
        .permission(Permission::Operator)
        .risk(Risk::Medium)
        .timeout(Duration::from_secs(15))
        .exclusive()
        .args(IFNAME_ARGS)
}

// ── Stateless handlers ───────────────────────────────────────

pub async fn help(inv: Invocation) -> HandlerResult {
    inv.registry.render_help(inv.args.str("cmd")).map(Outcome::text)
}

pub async fn ping(_inv: Invocation) -> HandlerResult {
    Ok(Outcome::text("pong"))
}

pub async fn shutdown(inv: Invocation) -> HandlerResult {
    info!("RPC[{}]: shutdown requested", inv.id);
    inv.shutdown.request();
    Ok(Outcome::text("Shutdown scheduled"))
}

// ── Service-backed handlers ──────────────────────────────────

pub async fn status<W: WifiPort, S: SystemPort>(
    svc: Rc<Services<W, S>>,
    inv: Invocation,
) -> HandlerResult {
    let busy = match inv.busy.holder() {
        Some(holder) => format!("{} ({})", holder.command, holder.id),
        None => "idle".into(),
    };
    let wifi = match svc.system.wifi_link().await {
        Ok(link) => format_wifi(&link),
        Err(e) => unavailable(e),
    };

    let lines = [
        format!("Status: {}", svc.board.get()),
        format!("Busy: {busy}"),
        format!("Hostname: {}", probe(svc.system.hostname().await)),
        format!("User: {}", probe(svc.system.whoami().await)),
        format!("Wi-Fi: {wifi}"),
        format!("SSH: {}", probe(svc.system.ssh_state().await)),
        format!("System: {}", probe(svc.system.uname().await)),
    ];
    Ok(Outcome::text(lines.join("\n")))
}

/// Join the requested network, reporting each phase as it happens.
///
/// The status board tracks `Connecting` and the outcome. An SSID that is
/// already the active connection skips the join and only waits for the
/// address.
pub async fn provision<W: WifiPort, S: SystemPort>(
    svc: Rc<Services<W, S>>,
    inv: Invocation,
) -> HandlerResult {
    let ssid = inv.args.str("ssid").map(str::trim).unwrap_or_default();
    let pwd = inv.args.str("pwd");

    let board = svc.board.clone();
    let observer: PhaseObserver = Box::new(move |text| board.set(text));
    let mut reporter =
        ProvisionReporter::start_observed(inv.progress.clone(), ssid, Some(observer)).await;
    reporter.connecting(None).await;

    let active = match svc.wifi.active_ssid().await {
        Ok(active) => active,
        Err(e) => {
            warn!("WiFi: active connection unknown: {}", e);
            None
        }
    };

    if active.as_deref() == Some(ssid) {
        info!("WiFi: already connected to {}", ssid);
        reporter.connecting(Some("Already connected")).await;
    } else {
        if let Err(e) = svc.wifi.connect(ssid, pwd).await {
            warn!("WiFi: join {} failed: {}", ssid, e);
            return reporter.fail(&e.to_string());
        }
        reporter.connecting(Some("waiting for IP")).await;
    }

    match svc.wifi.wait_for_ip().await {
        Ok(ip) => {
            info!("WiFi: {} up, IP {}", ssid, ip);
            reporter.success(&ip)
        }
        Err(e) => reporter.fail(&e.to_string()),
    }
}

pub async fn whoami<W: WifiPort, S: SystemPort>(
    svc: Rc<Services<W, S>>,
    _inv: Invocation,
) -> HandlerResult {
    svc.system
        .whoami()
        .await
        .map(Outcome::text)
        .map_err(|e| HandlerError::internal(e.to_string()))
}

pub async fn ifconfig<W: WifiPort, S: SystemPort>(
    svc: Rc<Services<W, S>>,
    inv: Invocation,
) -> HandlerResult {
    svc.system
        .ifconfig(inv.args.str("ifname").map(str::trim))
        .await
        .map(Outcome::text)
        .map_err(|e| HandlerError::internal(e.to_string()))
}

#[derive(Serialize)]
struct ScanReport<'a> {
    ifname: &'a str,
    count: usize,
    aps: &'a [AccessPoint],
}

pub async fn wifi_scan<W: WifiPort, S: SystemPort>(
    svc: Rc<Services<W, S>>,
    inv: Invocation,
) -> HandlerResult {
    let ifname = inv
        .args
        .str("ifname")
        .map(str::trim)
        .or_else(|| svc.default_ifname());

    inv.progress.emit("Scanning").await;
    let aps = svc
        .system
        .scan(ifname)
        .await
        .map_err(|e| HandlerError::internal(e.to_string()))?;

    let report = ScanReport {
        ifname: ifname.unwrap_or_default(),
        count: aps.len(),
        aps: &aps,
    };
    let text = serde_json::to_string(&report).map_err(|e| HandlerError::internal(e.to_string()))?;
    Ok(Outcome::text(truncate_output(&text, OUTPUT_LIMIT)))
}

// ── Formatting ───────────────────────────────────────────────

pub fn format_wifi(link: &WifiLink) -> String {
    match link {
        WifiLink::Connected { ssid, ip, .. } => format!(
            "connected (SSID={}, IP={})",
            ssid,
            ip.as_deref().unwrap_or("unknown")
        ),
        WifiLink::Disconnected => "disconnected".into(),
        WifiLink::NoDevice => "no wifi device".into(),
    }
}

fn probe<E: fmt::Display>(result: Result<String, E>) -> String {
    result.unwrap_or_else(unavailable)
}

fn unavailable<E: fmt::Display>(e: E) -> String {
    format!("unavailable ({e})")
}
