//! Wi-Fi station adapter backed by NetworkManager.
//!
//! Implements [`WifiPort`] by shelling out to `nmcli` (join, active
//! connection) and `ip`/`hostname` (address discovery). Every process runs
//! through [`run_command`], so a hung `nmcli` is killed at its deadline
//! instead of blocking the link.
//!
//! ## Secrets
//!
//! The passphrase is passed to `nmcli` as an argument but never logged;
//! the logged command line carries `***` in its place.

use std::time::{Duration, Instant};

use async_io_mini::Timer;
use log::{info, warn};

use crate::app::ports::{SystemError, WifiError, WifiPort};
use crate::config::GatewayConfig;

use super::utils::{first_ipv4, run_command, split_terse};

const IP_POLL_INTERVAL: Duration = Duration::from_secs(1);
const QUERY_TIMEOUT: Duration = Duration::from_secs(3);
const ERROR_TEXT_LIMIT: usize = 160;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn validate_ssid(ssid: &str) -> Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > 32 || ssid.chars().any(char::is_control) {
        return Err(WifiError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), WifiError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// nmcli adapter
// ───────────────────────────────────────────────────────────────

pub struct NmcliWifi {
    ifname: Option<String>,
    connect_timeout: Duration,
    ip_timeout: Duration,
}

impl NmcliWifi {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            ifname: config.wifi_ifname.clone(),
            connect_timeout: config.connect_timeout(),
            ip_timeout: config.ip_timeout(),
        }
    }

    /// `nmcli device wifi connect` arguments, with the passphrase
    /// replaced by `mask` when given.
    fn connect_args<'a>(
        &'a self,
        ssid: &'a str,
        password: Option<&'a str>,
        mask: Option<&'a str>,
    ) -> Vec<&'a str> {
        let mut args = vec!["device", "wifi", "connect", ssid];
        if let Some(pwd) = password.filter(|p| !p.is_empty()) {
            args.extend(["password", mask.unwrap_or(pwd)]);
        }
        if let Some(ifname) = &self.ifname {
            args.extend(["ifname", ifname.as_str()]);
        }
        args
    }

    /// One address probe: the configured interface first, then the host's
    /// primary address.
    async fn primary_ipv4(&self) -> Option<String> {
        if let Some(ifname) = &self.ifname {
            if let Ok(out) = run_command("ip", &["-4", "addr", "show", ifname.as_str()], QUERY_TIMEOUT).await {
                let ip = out
                    .stdout
                    .lines()
                    .map(str::trim)
                    .find(|line| line.starts_with("inet "))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|cidr| cidr.split('/').next())
                    .map(str::to_string);
                if ip.is_some() {
                    return ip;
                }
            }
        }

        let out = run_command("hostname", &["-I"], QUERY_TIMEOUT).await.ok()?;
        out.stdout.split_whitespace().find_map(first_ipv4)
    }
}

impl WifiPort for NmcliWifi {
    async fn active_ssid(&self) -> Result<Option<String>, WifiError> {
        let out = run_command("nmcli", &["-t", "-f", "ACTIVE,SSID", "device", "wifi"], QUERY_TIMEOUT)
            .await
            .map_err(|e| WifiError::Unavailable(e.to_string()))?;
        if !out.success() {
            return Err(WifiError::Unavailable(out.text()));
        }
        Ok(out.stdout.lines().find_map(|line| {
            let fields = split_terse(line.trim(), 2);
            match fields.as_slice() {
                [active, ssid] if active == "yes" && !ssid.is_empty() => Some(ssid.clone()),
                _ => None,
            }
        }))
    }

    async fn connect(&self, ssid: &str, password: Option<&str>) -> Result<(), WifiError> {
        validate_ssid(ssid)?;
        validate_password(password.unwrap_or_default())?;

        let logged = self.connect_args(ssid, password, Some("***"));
        info!("WiFi: executing nmcli {}", logged.join(" "));

        let args = self.connect_args(ssid, password, None);
        let out = match run_command("nmcli", &args, self.connect_timeout).await {
            Ok(out) => out,
            Err(SystemError::Timeout(_)) => return Err(WifiError::ConnectTimeout),
            Err(e) => return Err(WifiError::Unavailable(e.to_string())),
        };

        if out.success() {
            info!("WiFi: joined '{}'", ssid);
            return Ok(());
        }

        let err = out.stderr.trim();
        let text = if !err.is_empty() {
            err.to_string()
        } else if !out.stdout.trim().is_empty() {
            out.stdout.trim().to_string()
        } else {
            format!("nmcli rc={}", out.code.unwrap_or(-1))
        };
        warn!("WiFi: nmcli failed: {}", text);
        Err(WifiError::ConnectFailed(text.chars().take(ERROR_TEXT_LIMIT).collect()))
    }

    async fn wait_for_ip(&self) -> Result<String, WifiError> {
        let deadline = Instant::now() + self.ip_timeout;
        while Instant::now() < deadline {
            if let Some(ip) = self.primary_ipv4().await {
                return Ok(ip);
            }
            Timer::after(IP_POLL_INTERVAL).await;
        }
        warn!("WiFi: no IP within {:.1}s", self.ip_timeout.as_secs_f64());
        Err(WifiError::NoIp)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
