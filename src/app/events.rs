//! Outbound gateway events.
//!
//! The dispatcher and link task emit these through the
//! [`EventSink`](super::ports::EventSink) port; the adapter on the other
//! side decides what to do with them.

use std::time::Duration;

use crate::rpc::envelope::StatusCode;

/// Structured events emitted by the protocol core.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A client connected and a new link session began.
    LinkUp { session: u64, max_frame: usize },

    /// The link dropped with `in_flight` requests still running.
    LinkDown { session: u64, in_flight: usize },

    /// A request reached its terminal response.
    CommandFinished {
        id: String,
        command: String,
        code: StatusCode,
        elapsed: Duration,
        /// Link closed first; the response was not transmitted.
        abandoned: bool,
    },

    /// A frame failed reassembly and was dropped.
    FrameDiscarded { reason: String },

    /// A complete payload failed to decode.
    PayloadRejected { id: Option<String>, reason: String },

    /// Shutdown was accepted; the link stops after the acknowledgment.
    ShutdownAccepted { id: String },
}
