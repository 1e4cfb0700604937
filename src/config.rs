//! Gateway configuration.
//!
//! All tunable parameters for the command gateway. Loaded from an optional
//! JSON file; keys missing from the file keep their defaults.

use core::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rpc::chunked::FRAME_HEADER_SIZE;

/// Core gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    // --- Identity ---
    /// Advertised device name.
    pub device_name: String,

    // --- Link ---
    /// Maximum transport frame size in bytes, header included.
    pub max_frame_size: usize,
    /// Partial message lifetime before it is discarded (milliseconds).
    pub reassembly_timeout_ms: u64,
    /// Host stream endpoint standing in for the radio link.
    pub listen_addr: String,

    // --- Wi-Fi ---
    /// Interface passed to nmcli; unset means NetworkManager's choice.
    pub wifi_ifname: Option<String>,
    /// Bound on one `nmcli device wifi connect` (seconds).
    pub connect_timeout_secs: u64,
    /// Wait for an address after joining (seconds).
    pub ip_timeout_secs: u64,
    /// Delay between rescan and listing results (milliseconds).
    pub scan_settle_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            device_name: "Yundrone_UAV".into(),

            max_frame_size: 360,
            reassembly_timeout_ms: 5_000,
            listen_addr: "127.0.0.1:7878".into(),

            wifi_ifname: None,
            connect_timeout_secs: 40,
            ip_timeout_secs: 15,
            scan_settle_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    pub fn reassembly_timeout(&self) -> Duration {
        Duration::from_millis(self.reassembly_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn ip_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_timeout_secs)
    }

    pub fn scan_settle(&self) -> Duration {
        Duration::from_millis(self.scan_settle_ms)
    }

    /// Parse a JSON document and validate it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Reject configurations the gateway cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_size <= FRAME_HEADER_SIZE {
            return Err(ConfigError::Invalid("max_frame_size must exceed the 2-byte frame header"));
        }
        if self.reassembly_timeout_ms == 0 {
            return Err(ConfigError::Invalid("reassembly_timeout_ms must be non-zero"));
        }
        if self.connect_timeout_secs == 0 || self.ip_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero"));
        }
        if self.wifi_ifname.as_deref().is_some_and(|i| i.trim().is_empty()) {
            return Err(ConfigError::Invalid("wifi_ifname must not be blank"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "config read failed: {msg}"),
            Self::Parse(msg) => write!(f, "config parse failed: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
