//! Outbound response channel.
//!
//! ```text
//!  dispatch tasks ──Outbound──▶ Outbox ──▶ writer task ──▶ Transport
//! ```
//!
//! A bounded `embassy-sync` channel. Producers wait for space rather than
//! drop output. The outbox never leaves the executor thread and uses
//! `NoopRawMutex` behind an `Rc`.

use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use super::envelope::CommandResponse;

// ── Outbound ─────────────────────────────────────────────────

/// One response queued for the writer.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub response: CommandResponse,
    /// Link session the response belongs to. Stale sessions are dropped.
    pub session: u64,
    /// Stop serving once this response has been written.
    pub stop_after: bool,
}

/// Channel depth for outbound responses.
pub const OUTBOX_DEPTH: usize = 32;

/// Single-writer queue of whole responses.
#[derive(Clone)]
pub struct Outbox {
    channel: Rc<Channel<NoopRawMutex, Outbound, OUTBOX_DEPTH>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            channel: Rc::new(Channel::new()),
        }
    }

    /// Queue a response, waiting for space.
    pub async fn push(&self, out: Outbound) {
        self.channel.send(out).await;
    }

    pub async fn next(&self) -> Outbound {
        self.channel.receive().await
    }

    pub fn try_next(&self) -> Option<Outbound> {
        self.channel.try_receive().ok()
    }

    /// Discard everything queued. Returns how many were dropped.
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.channel.try_receive().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}
