//! Port traits — the hexagonal boundary between command handlers and the
//! host system.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ built-in commands (domain)
//! ```
//!
//! Driven adapters (network manager, shell queries, event sinks) implement
//! these traits. The built-in commands consume them via generics, so the
//! handlers never spawn a process themselves and the whole command set is
//! testable with mock adapters.
//!
//! ## Safety notes
//!
//! - **WifiPort** implementations MUST NOT log the passphrase.
//! - **SystemPort** runs a fixed whitelist of queries; there is no
//!   free-form command execution.
//! - Cancellation is best effort: a handler timing out abandons the
//!   future, but an already-started external action may still complete.

use core::fmt;
use core::future::Future;
use std::time::Duration;

use serde::Serialize;

// ───────────────────────────────────────────────────────────────
// Wi-Fi port (driven adapter: domain → network manager)
// ───────────────────────────────────────────────────────────────

/// Network join and address discovery.
pub trait WifiPort {
    /// SSID of the active wireless connection, if any.
    fn active_ssid(&self) -> impl Future<Output = Result<Option<String>, WifiError>>;

    /// Join `ssid`. An empty or absent password means an open network.
    fn connect(
        &self,
        ssid: &str,
        password: Option<&str>,
    ) -> impl Future<Output = Result<(), WifiError>>;

    /// Poll until the interface holds an IPv4 address or the wait ends.
    fn wait_for_ip(&self) -> impl Future<Output = Result<String, WifiError>>;
}

// ───────────────────────────────────────────────────────────────
// System port (driven adapter: domain → host introspection)
// ───────────────────────────────────────────────────────────────

/// State of the wireless link as seen by the network manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiLink {
    Connected {
        ssid: String,
        device: String,
        ip: Option<String>,
    },
    Disconnected,
    NoDevice,
}

/// One scan result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessPoint {
    pub ssid: String,
    pub chan: String,
    pub signal: u8,
}

/// Read-only host queries behind the diagnostic commands.
pub trait SystemPort {
    /// Effective operator account.
    fn whoami(&self) -> impl Future<Output = Result<String, SystemError>>;

    fn hostname(&self) -> impl Future<Output = Result<String, SystemError>>;

    /// Kernel name, release and machine.
    fn uname(&self) -> impl Future<Output = Result<String, SystemError>>;

    /// Interface configuration dump.
    fn ifconfig(&self, ifname: Option<&str>) -> impl Future<Output = Result<String, SystemError>>;

    fn wifi_link(&self) -> impl Future<Output = Result<WifiLink, SystemError>>;

    /// SSH service state, e.g. `service=ssh,enabled=enabled,active=active`.
    fn ssh_state(&self) -> impl Future<Output = Result<String, SystemError>>;

    /// Rescan and list visible networks.
    fn scan(&self, ifname: Option<&str>)
    -> impl Future<Output = Result<Vec<AccessPoint>, SystemError>>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / supervision)
// ───────────────────────────────────────────────────────────────

/// The protocol core emits structured
/// [`GatewayEvent`](super::events::GatewayEvent)s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::GatewayEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`WifiPort`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiError {
    /// SSID empty, longer than 32 bytes or containing control characters.
    InvalidSsid,
    /// Password neither empty nor 8..=64 bytes.
    InvalidPassword,
    /// The network manager refused the join (message is its output).
    ConnectFailed(String),
    /// The join command did not finish in time.
    ConnectTimeout,
    /// Joined, but no address was assigned in time.
    NoIp,
    /// The network manager could not be run at all.
    Unavailable(String),
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "Invalid SSID"),
            Self::InvalidPassword => write!(f, "Invalid Wi-Fi password"),
            Self::ConnectFailed(msg) => f.write_str(msg),
            Self::ConnectTimeout => write!(f, "nmcli timeout"),
            Self::NoIp => write!(f, "No IP assigned"),
            Self::Unavailable(msg) => write!(f, "network manager unavailable: {msg}"),
        }
    }
}

/// Errors from [`SystemPort`] queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemError {
    /// Required binary is not installed.
    NotFound(&'static str),
    /// The process ran past its bound and was killed.
    Timeout(Duration),
    /// Non-zero exit; message is the captured output.
    Failed(String),
    Io(String),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(bin) => write!(f, "{bin} command not found"),
            Self::Timeout(after) => {
                write!(f, "system command timeout after {:.1}s", after.as_secs_f64())
            }
            Self::Failed(msg) => f.write_str(msg),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}
