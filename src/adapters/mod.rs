//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter            | Implements  | Connects to                      |
//! |--------------------|-------------|----------------------------------|
//! | `log_sink`         | EventSink   | `log` facade                     |
//! | `stream_transport` | Transport   | Length-prefixed byte stream      |
//! | `system`           | SystemPort  | whoami, uname, ifconfig, nmcli   |
//! | `wifi`             | WifiPort    | NetworkManager (`nmcli`)         |

pub mod log_sink;
pub mod stream_transport;
pub mod system;
pub(crate) mod utils;
pub mod wifi;
