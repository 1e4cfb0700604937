//! Application core — the built-in command set and its ports.
//!
//! Handlers never spawn processes or touch the network themselves; all
//! interaction with the host happens through the **port traits** defined
//! in [`ports`], keeping this layer testable with mock adapters.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
