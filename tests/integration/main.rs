//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the gateway end to end
//! over an in-memory link against mock ports. All tests run on the host
//! with no radio, `nmcli` or network interface required.

mod correlation_tests;
mod link_tests;
mod mock_ports;
mod provisioning_flow_tests;
