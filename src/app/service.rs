//! Application service — the hexagonal core behind the built-in commands.
//!
//! [`Services`] bundles the driven ports, the shared status board and the
//! gateway configuration. [`builtin_registry`] binds every built-in
//! command to it, producing the registry the dispatcher serves.
//!
//! ```text
//!   WifiPort ──▶ ┌──────────────────────┐
//!                │       Services       │ ──▶ Registry ──▶ Dispatcher
//! SystemPort ──▶ │  status board·config │
//!                └──────────────────────┘
//! ```

use core::cell::RefCell;
use std::rc::Rc;

use log::info;

use crate::config::GatewayConfig;
use crate::rpc::registry::{Registry, RegistryError};
use crate::rpc::reporter::STANDBY;

use super::commands;
use super::ports::{SystemPort, WifiPort};

// ───────────────────────────────────────────────────────────────
// Status board
// ───────────────────────────────────────────────────────────────

/// Last provisioning status text, shared with `status`.
///
/// Starts at `Standby`. Only the provisioning flow writes it.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    text: Rc<RefCell<String>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            text: Rc::new(RefCell::new(STANDBY.to_string())),
        }
    }

    pub fn get(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn set(&self, text: &str) {
        let mut current = self.text.borrow_mut();
        if *current != text {
            info!("STATUS: {} -> {}", current, text);
            *current = text.to_string();
        }
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Services
// ───────────────────────────────────────────────────────────────

/// Everything the built-in handlers need.
pub struct Services<W, S> {
    pub wifi: W,
    pub system: S,
    pub board: StatusBoard,
    pub config: GatewayConfig,
}

impl<W: WifiPort, S: SystemPort> Services<W, S> {
    pub fn new(wifi: W, system: S, config: GatewayConfig) -> Self {
        Self {
            wifi,
            system,
            board: StatusBoard::new(),
            config,
        }
    }

    /// Interface for scans when the request names none.
    pub fn default_ifname(&self) -> Option<&str> {
        self.config.wifi_ifname.as_deref()
    }
}

/// Registry holding every built-in command bound to `services`.
pub fn builtin_registry<W, S>(services: Rc<Services<W, S>>) -> Result<Registry, RegistryError>
where
    W: WifiPort + 'static,
    S: SystemPort + 'static,
{
    let mut registry = Registry::new();

    registry.register(commands::help_spec(), commands::help)?;
    registry.register(commands::ping_spec(), commands::ping)?;
    registry.register(commands::shutdown_spec(), commands::shutdown)?;

    let svc = services.clone();
    registry.register(commands::status_spec(), move |inv| {
        commands::status(svc.clone(), inv)
    })?;

    let svc = services.clone();
    registry.register(commands::provision_spec(), move |inv| {
        commands::provision(svc.clone(), inv)
    })?;

    let svc = services.clone();
    registry.register(commands::whoami_spec(), move |inv| {
        commands::whoami(svc.clone(), inv)
    })?;

    let svc = services.clone();
    registry.register(commands::ifconfig_spec(), move |inv| {
        commands::ifconfig(svc.clone(), inv)
    })?;

    let svc = services;
    registry.register(commands::wifi_scan_spec(), move |inv| {
        commands::wifi_scan(svc.clone(), inv)
    })?;

    info!("RPC: {} built-in commands registered", registry.len());
    Ok(registry)
}
