//! Provisioning state reporter.
//!
//! ```text
//!  Started ──▶ Connecting ──▶ Success(ip)   (terminal, ok)
//!                 │  ▲    └─▶ Fail(reason)  (terminal, error)
//!                 └──┘ sub-steps
//! ```
//!
//! `Started` and `Connecting` go out as interim responses. `Success` and
//! `Fail` consume the reporter and become the handler's terminal result,
//! so a second terminal cannot be produced. A reporter lives for one
//! invocation only.

use log::debug;
use serde_json::Value;

use super::engine::Progress;
use super::envelope::{ArgMap, StatusCode};
use super::registry::{HandlerError, HandlerResult, Outcome};

/// Status text prefixes shared with the status board and the client.
pub const STANDBY: &str = "Standby";
pub const STARTED: &str = "Started";
pub const CONNECTING: &str = "Connecting";
pub const SUCCESS_PREFIX: &str = "Success_IP:";
pub const FAIL_PREFIX: &str = "Fail:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Started,
    Connecting,
}

/// Observer for status-level phase texts: `Connecting`, `Success_IP:<ip>`
/// and `Fail:<reason>`.
pub type PhaseObserver = Box<dyn Fn(&str)>;

pub struct ProvisionReporter {
    progress: Progress,
    phase: Phase,
    observer: Option<PhaseObserver>,
}

impl ProvisionReporter {
    /// Enter `Started` and announce it.
    pub async fn start(progress: Progress, target: &str) -> Self {
        Self::start_observed(progress, target, None).await
    }

    pub async fn start_observed(
        progress: Progress,
        target: &str,
        observer: Option<PhaseObserver>,
    ) -> Self {
        let reporter = Self {
            progress,
            phase: Phase::Started,
            observer,
        };
        debug!("RPC[{}]: provisioning {}", reporter.progress.id(), target);
        reporter.progress.emit(format!("{STARTED}: {target}")).await;
        reporter
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Enter (or repeat) `Connecting`, optionally naming a sub-step.
    /// Observers only see the bare phase name.
    pub async fn connecting(&mut self, step: Option<&str>) {
        self.phase = Phase::Connecting;
        self.observe(CONNECTING);
        match step {
            Some(step) => self.progress.emit(format!("{CONNECTING}: {step}")).await,
            None => self.progress.emit(CONNECTING).await,
        }
    }

    /// Terminal success carrying the assigned address.
    pub fn success(self, ip: &str) -> HandlerResult {
        let text = format!("{SUCCESS_PREFIX}{ip}");
        self.observe(&text);
        let mut data = ArgMap::new();
        data.insert("ip".into(), Value::String(ip.to_string()));
        Ok(Outcome::text(text).with_data(data))
    }

    /// Terminal failure.
    pub fn fail(self, reason: &str) -> HandlerResult {
        let text = format!("{FAIL_PREFIX}{reason}");
        self.observe(&text);
        Err(HandlerError::new(StatusCode::Internal, text))
    }

    fn observe(&self, text: &str) {
        debug!("RPC[{}]: provisioning phase {}", self.progress.id(), text);
        if let Some(observer) = &self.observer {
            observer(text);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
