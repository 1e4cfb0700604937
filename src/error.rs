//! Unified error type for the gateway.
//!
//! Each subsystem keeps its own small error enum; this `Error` wraps them
//! so setup code and the binary can propagate any of them with `?`.

use core::fmt;

use crate::app::ports::{SystemError, WifiError};
use crate::config::ConfigError;
use crate::rpc::chunked::FrameError;
use crate::rpc::correlation::TrackerError;
use crate::rpc::envelope::DecodeError;
use crate::rpc::registry::RegistryError;
use crate::rpc::transport::TransportError;

// ---------------------------------------------------------------------------
// Top-level gateway error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Config(ConfigError),
    Registry(RegistryError),
    Decode(DecodeError),
    Frame(FrameError),
    Transport(TransportError),
    Tracker(TrackerError),
    Wifi(WifiError),
    System(SystemError),
    /// Socket or thread setup failed.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Frame(e) => write!(f, "framing: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Tracker(e) => write!(f, "tracker: {e}"),
            Self::Wifi(e) => write!(f, "wifi: {e}"),
            Self::System(e) => write!(f, "system: {e}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(e: $source) -> Self {
                    Self::$variant(e)
                }
            }
        )*
    };
}

impl_from! {
    ConfigError => Config,
    RegistryError => Registry,
    DecodeError => Decode,
    FrameError => Frame,
    TransportError => Transport,
    TrackerError => Tracker,
    WifiError => Wifi,
    SystemError => System,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Gateway-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_errors_convert_and_render() {
        let e: Error = RegistryError::Duplicate("ping").into();
        assert_eq!(e.to_string(), "registry: duplicate command registration: ping");
        let e: Error = WifiError::NoIp.into();
        assert_eq!(e.to_string(), "wifi: No IP assigned");
        let e: Error = FrameError::Interleaved.into();
        assert!(e.to_string().starts_with("framing: "));
    }
}
