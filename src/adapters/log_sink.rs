//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured gateway events to the
//! `log` facade (rendered by the binary's `tracing-subscriber`). A
//! supervisor or metrics adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::GatewayEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`GatewayEvent`].
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &GatewayEvent) {
        match event {
            GatewayEvent::LinkUp { session, max_frame } => {
                info!("EVENT | link up | session={} max_frame={}", session, max_frame);
            }
            GatewayEvent::LinkDown { session, in_flight } => {
                info!("EVENT | link down | session={} in_flight={}", session, in_flight);
            }
            GatewayEvent::CommandFinished {
                id,
                command,
                code,
                elapsed,
                abandoned,
            } => {
                info!(
                    "EVENT | finished | id={} cmd={} code={} elapsed={}ms{}",
                    id,
                    command,
                    code,
                    elapsed.as_millis(),
                    if *abandoned { " (abandoned)" } else { "" }
                );
            }
            GatewayEvent::FrameDiscarded { reason } => {
                warn!("EVENT | frame discarded | {}", reason);
            }
            GatewayEvent::PayloadRejected { id, reason } => {
                warn!(
                    "EVENT | payload rejected | id={} {}",
                    id.as_deref().unwrap_or("-"),
                    reason
                );
            }
            GatewayEvent::ShutdownAccepted { id } => {
                info!("EVENT | shutdown accepted | id={}", id);
            }
        }
    }
}
