//! Host introspection adapter.
//!
//! Implements [`SystemPort`] with a fixed set of read-only queries. Nothing
//! here accepts a free-form command line; each method maps to one or two
//! known programs with bounded runtimes.
//!
//! | method      | program(s)                                          |
//! |-------------|-----------------------------------------------------|
//! | `whoami`    | `$SUDO_USER`, else `whoami`                         |
//! | `hostname`  | `hostname`                                          |
//! | `uname`     | `uname -srm`                                        |
//! | `ifconfig`  | `ifconfig [ifname]`                                 |
//! | `wifi_link` | `nmcli device status` + `ip -4 -o addr show`        |
//! | `ssh_state` | `systemctl is-enabled/is-active ssh|sshd`           |
//! | `scan`      | `nmcli device wifi rescan` + `nmcli device wifi list`|

use std::time::Duration;

use async_io_mini::Timer;
use log::{debug, info};

use crate::app::ports::{AccessPoint, SystemError, SystemPort, WifiLink};
use crate::config::GatewayConfig;

use super::utils::{first_ipv4, resolve_binary, run_command, split_terse};

const QUERY_TIMEOUT: Duration = Duration::from_secs(2);
const RESCAN_TIMEOUT: Duration = Duration::from_secs(6);
const LIST_TIMEOUT: Duration = Duration::from_secs(8);

const IFCONFIG_CANDIDATES: &[&str] = &["ifconfig", "/sbin/ifconfig", "/usr/sbin/ifconfig"];
const IP_CANDIDATES: &[&str] = &["ip", "/sbin/ip", "/usr/sbin/ip", "/bin/ip", "/usr/bin/ip"];
const SSH_SERVICES: &[&str] = &["ssh", "sshd"];

/// Fields requested from `nmcli device wifi list`.
const SCAN_FIELDS: &str = "IN-USE,BSSID,SSID,CHAN,RATE,SIGNAL,BARS,SECURITY";
const SCAN_FIELD_COUNT: usize = 8;

pub struct LinuxSystem {
    ifname: Option<String>,
    scan_settle: Duration,
}

impl LinuxSystem {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            ifname: config.wifi_ifname.clone(),
            scan_settle: config.scan_settle(),
        }
    }

    async fn interface_ipv4(&self, device: &str) -> Option<String> {
        if let Some(ip_bin) = resolve_binary(IP_CANDIDATES) {
            if let Ok(out) = run_command(ip_bin, &["-4", "-o", "addr", "show", device], QUERY_TIMEOUT).await {
                let ip = out.stdout.lines().find_map(|line| {
                    let mut parts = line.split_whitespace().skip_while(|p| *p != "inet");
                    parts.nth(1).and_then(|cidr| cidr.split('/').next()).map(str::to_string)
                });
                if ip.is_some() {
                    return ip;
                }
            }
        }

        let out = run_command("nmcli", &["-g", "IP4.ADDRESS", "device", "show", device], QUERY_TIMEOUT)
            .await
            .ok()?;
        out.stdout.lines().find_map(first_ipv4)
    }
}

impl SystemPort for LinuxSystem {
    async fn whoami(&self) -> Result<String, SystemError> {
        if let Ok(user) = std::env::var("SUDO_USER") {
            let user = user.trim();
            if !user.is_empty() {
                return Ok(user.to_string());
            }
        }
        run_command("whoami", &[], QUERY_TIMEOUT).await?.into_result()
    }

    async fn hostname(&self) -> Result<String, SystemError> {
        run_command("hostname", &[], QUERY_TIMEOUT).await?.into_result()
    }

    async fn uname(&self) -> Result<String, SystemError> {
        run_command("uname", &["-srm"], QUERY_TIMEOUT).await?.into_result()
    }

    async fn ifconfig(&self, ifname: Option<&str>) -> Result<String, SystemError> {
        let bin = resolve_binary(IFCONFIG_CANDIDATES).ok_or(SystemError::NotFound("ifconfig"))?;
        let args: Vec<&str> = ifname.into_iter().collect();
        run_command(bin, &args, Duration::from_secs(4)).await?.into_result()
    }

    async fn wifi_link(&self) -> Result<WifiLink, SystemError> {
        let status = run_command(
            "nmcli",
            &["-t", "-f", "DEVICE,TYPE,STATE,CONNECTION", "device", "status"],
            QUERY_TIMEOUT,
        )
        .await?
        .into_result()?;

        match parse_device_status(&status, self.ifname.as_deref()) {
            DeviceStatus::Connected { device, ssid } => {
                let ip = self.interface_ipv4(&device).await;
                Ok(WifiLink::Connected { ssid, device, ip })
            }
            DeviceStatus::Disconnected => Ok(WifiLink::Disconnected),
            DeviceStatus::NoDevice => Ok(WifiLink::NoDevice),
        }
    }

    async fn ssh_state(&self) -> Result<String, SystemError> {
        for service in SSH_SERVICES {
            let enabled = systemctl_text("is-enabled", service).await;
            let active = systemctl_text("is-active", service).await;
            let merged = format!("{enabled} | {active}").to_lowercase();
            if merged.contains("not-found") || merged.contains("could not be found") {
                debug!("SYS: {} service not found", service);
                continue;
            }
            return Ok(format!("service={service},enabled={enabled},active={active}"));
        }
        Ok("service_not_found".into())
    }

    async fn scan(&self, ifname: Option<&str>) -> Result<Vec<AccessPoint>, SystemError> {
        let mut rescan = vec!["device", "wifi", "rescan"];
        let mut list = vec!["-t", "-f", SCAN_FIELDS, "device", "wifi", "list"];
        if let Some(ifname) = ifname {
            rescan.extend(["ifname", ifname]);
            list.extend(["ifname", ifname]);
        }

        info!("SYS: wifi rescan on {}", ifname.unwrap_or("default interface"));
        run_command("nmcli", &rescan, RESCAN_TIMEOUT).await?.into_result()?;
        Timer::after(self.scan_settle).await;

        let listed = run_command("nmcli", &list, LIST_TIMEOUT).await?;
        if !listed.success() {
            return Err(SystemError::Failed(listed.text()));
        }
        Ok(parse_scan(&listed.stdout))
    }
}

async fn systemctl_text(verb: &str, service: &str) -> String {
    match run_command("systemctl", &[verb, service], QUERY_TIMEOUT).await {
        Ok(out) => out.text(),
        Err(e) => e.to_string(),
    }
}

// ───────────────────────────────────────────────────────────────
// nmcli output parsing
// ───────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum DeviceStatus {
    Connected { device: String, ssid: String },
    Disconnected,
    NoDevice,
}

/// Pick the Wi-Fi row of `nmcli -t -f DEVICE,TYPE,STATE,CONNECTION device
/// status`, limited to `ifname` when set.
fn parse_device_status(text: &str, ifname: Option<&str>) -> DeviceStatus {
    let mut seen = false;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields = split_terse(line, 4);
        let [device, kind, state, connection] = fields.as_slice() else {
            continue;
        };
        if kind != "wifi" || ifname.is_some_and(|want| want != device) {
            continue;
        }
        seen = true;
        if state == "connected" && !connection.is_empty() && connection != "--" {
            return DeviceStatus::Connected {
                device: device.clone(),
                ssid: connection.clone(),
            };
        }
    }
    if seen {
        DeviceStatus::Disconnected
    } else {
        DeviceStatus::NoDevice
    }
}

/// Visible networks from the terse scan list, strongest first. Hidden
/// SSIDs and rows with an unreadable signal are skipped.
fn parse_scan(text: &str) -> Vec<AccessPoint> {
    let mut aps: Vec<AccessPoint> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| {
            let fields = split_terse(line, SCAN_FIELD_COUNT);
            if fields.len() < SCAN_FIELD_COUNT {
                return None;
            }
            let ssid = fields[2].trim();
            if ssid.is_empty() {
                return None;
            }
            let signal = fields[5].trim().parse::<i64>().ok()?.clamp(0, 100);
            let chan = match fields[3].trim() {
                "" => "-",
                chan => chan,
            };
            Some(AccessPoint {
                ssid: ssid.to_string(),
                chan: chan.to_string(),
                signal: u8::try_from(signal).unwrap_or(100),
            })
        })
        .collect();

    aps.sort_by(|a, b| {
        b.signal
            .cmp(&a.signal)
            .then_with(|| a.ssid.to_lowercase().cmp(&b.ssid.to_lowercase()))
            .then_with(|| a.chan.to_lowercase().cmp(&b.chan.to_lowercase()))
    });
    aps
}
