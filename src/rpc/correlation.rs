//! Caller-side correlation tracker.
//!
//! Matches responses arriving on the notify channel to the requests that
//! caused them:
//!
//! ```text
//!  begin(req) ──▶ pending[id] = Slot ──▶ send_message(transport)
//!                      ▲
//!  on_frame ──▶ reassemble ──▶ decode ──┘ interim: progress buffer
//!                                          terminal: resolve waiter
//! ```
//!
//! A waiter resolves to a local `ERR_TIMEOUT` when nothing terminal
//! arrives in time, whether or not the responder ever replied. The
//! pending entry is removed when its [`Exchange`] completes or is
//! dropped; responses for removed ids are logged and ignored.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use async_io_mini::Timer;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use heapless::Deque;
use log::{debug, info, warn};

use super::chunked::{ChunkReassembler, FrameError};
use super::envelope::{
    ArgMap, CommandRequest, CommandResponse, EncodeError, StatusCode, decode_response,
    encode_request,
};
use super::transport::{Transport, TransportError, send_message};

/// Interim responses kept per pending request.
pub const PROGRESS_HISTORY: usize = 8;

// ── Errors ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The id is already waiting for a response.
    DuplicateId(String),
    EmptyId,
    Encode(EncodeError),
    Transport(TransportError),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "request id '{id}' already in flight"),
            Self::EmptyId => write!(f, "request id must not be empty"),
            Self::Encode(e) => write!(f, "{e}"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl From<TransportError> for TrackerError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<EncodeError> for TrackerError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}

// ── Pending slot ─────────────────────────────────────────────

struct Slot {
    progress: RefCell<Deque<CommandResponse, PROGRESS_HISTORY>>,
    terminal: RefCell<Option<CommandResponse>>,
    wake: Signal<NoopRawMutex, ()>,
}

impl Slot {
    fn new() -> Self {
        Self {
            progress: RefCell::new(Deque::new()),
            terminal: RefCell::new(None),
            wake: Signal::new(),
        }
    }

    fn push_progress(&self, response: CommandResponse) {
        let mut progress = self.progress.borrow_mut();
        if progress.is_full() {
            progress.pop_front();
        }
        let _ = progress.push_back(response);
        self.wake.signal(());
    }

    fn resolve(&self, response: CommandResponse) {
        *self.terminal.borrow_mut() = Some(response);
        self.wake.signal(());
    }
}

type Pending = Rc<RefCell<BTreeMap<String, Rc<Slot>>>>;

// ── Tracker ──────────────────────────────────────────────────

pub struct CorrelationTracker<T: Transport> {
    transport: RefCell<T>,
    pending: Pending,
    reassembler: RefCell<ChunkReassembler>,
    id_prefix: String,
    next_id: Cell<u64>,
}

impl<T: Transport> CorrelationTracker<T> {
    pub fn new(transport: T, id_prefix: impl Into<String>) -> Self {
        Self {
            transport: RefCell::new(transport),
            pending: Rc::new(RefCell::new(BTreeMap::new())),
            reassembler: RefCell::new(ChunkReassembler::default()),
            id_prefix: id_prefix.into(),
            next_id: Cell::new(1),
        }
    }

    /// Number of requests waiting for a terminal response.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Next generated correlation id.
    pub fn next_id(&self) -> String {
        let n = self.next_id.get();
        self.next_id.set(n.wrapping_add(1));
        format!("{}-{}", self.id_prefix, n)
    }

    /// Register a waiter for `request` and transmit it.
    ///
    /// A duplicate in-flight id is rejected before anything is sent.
    pub fn begin(&self, request: &CommandRequest, timeout: Duration) -> Result<Exchange, TrackerError> {
        if request.id.is_empty() {
            return Err(TrackerError::EmptyId);
        }
        if self.pending.borrow().contains_key(&request.id) {
            return Err(TrackerError::DuplicateId(request.id.clone()));
        }

        let payload = encode_request(request)?;
        let slot = Rc::new(Slot::new());
        self.pending
            .borrow_mut()
            .insert(request.id.clone(), slot.clone());

        let exchange = Exchange {
            id: request.id.clone(),
            slot,
            pending: self.pending.clone(),
            deadline: Instant::now() + timeout,
            timeout,
        };

        let frames = send_message(&mut *self.transport.borrow_mut(), &payload)?;
        debug!("CLIENT[{}]: {} sent in {} frames", request.id, request.cmd, frames);
        Ok(exchange)
    }

    /// Send `cmd` with a generated id and wait for its terminal response.
    pub async fn send(
        &self,
        cmd: &str,
        args: ArgMap,
        timeout: Duration,
    ) -> Result<CommandResponse, TrackerError> {
        let request = CommandRequest::new(self.next_id(), cmd, args);
        let exchange = self.begin(&request, timeout)?;
        Ok(exchange.finish().await)
    }

    /// Feed one notify frame.
    pub fn on_frame(&self, frame: &[u8]) -> Result<(), FrameError> {
        let Some(payload) = self.reassembler.borrow_mut().feed(frame)? else {
            return Ok(());
        };

        let response = match decode_response(&payload) {
            Ok(r) => r,
            Err(e) => {
                warn!("CLIENT: undecodable response dropped: {}", e);
                return Ok(());
            }
        };

        let slot = self.pending.borrow().get(&response.id).cloned();
        match slot {
            Some(slot) if response.is_interim() => slot.push_progress(response),
            Some(slot) => slot.resolve(response),
            None => info!(
                "CLIENT[{}]: late or unknown response dropped ({})",
                response.id, response.code
            ),
        }
        Ok(())
    }

    /// Drop any partially reassembled response (e.g. on reconnect).
    pub fn reset_link(&self) {
        self.reassembler.borrow_mut().reset();
    }
}

// ── Exchange ─────────────────────────────────────────────────

/// One outstanding request. Dropping it abandons the waiter.
pub struct Exchange {
    id: String,
    slot: Rc<Slot>,
    pending: Pending,
    deadline: Instant,
    timeout: Duration,
}

impl Exchange {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Interim responses received so far (oldest first), draining them.
    pub fn take_progress(&self) -> Vec<CommandResponse> {
        let mut progress = self.slot.progress.borrow_mut();
        core::iter::from_fn(|| progress.pop_front()).collect()
    }

    pub async fn finish(self) -> CommandResponse {
        self.finish_with(|_| {}).await
    }

    /// Wait for the terminal response, handing each interim response to
    /// `on_progress` as it arrives.
    pub async fn finish_with(self, mut on_progress: impl FnMut(&CommandResponse)) -> CommandResponse {
        loop {
            for response in self.take_progress() {
                on_progress(&response);
            }
            if let Some(terminal) = self.slot.terminal.borrow_mut().take() {
                return terminal;
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            let woke = future::or(
                async {
                    self.slot.wake.wait().await;
                    true
                },
                async {
                    Timer::after(remaining).await;
                    false
                },
            )
            .await;

            if !woke && self.slot.terminal.borrow().is_none() {
                warn!(
                    "CLIENT[{}]: no terminal response within {:.1}s",
                    self.id,
                    self.timeout.as_secs_f64()
                );
                return CommandResponse::failure(
                    self.id.clone(),
                    StatusCode::Timeout,
                    format!("No response within {:.1}s", self.timeout.as_secs_f64()),
                );
            }
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.pending.borrow_mut().remove(&self.id);
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::chunked::chunk_payload;
    use crate::rpc::envelope::{decode_request, encode_response};
    use crate::rpc::transport::MemoryTransport;

    fn frames_for(response: &CommandResponse, chunk: usize) -> Vec<Vec<u8>> {
        chunk_payload(&encode_response(response).unwrap(), chunk)
    }

    fn sent_request(t: &MemoryTransport) -> CommandRequest {
        let mut r = ChunkReassembler::default();
        let mut out = None;
        for f in t.take_frames() {
            out = r.feed(&f).unwrap();
        }
        decode_request(&out.unwrap()).unwrap()
    }

    #[test]
    fn duplicate_id_rejected_before_transmit() {
        let wire = MemoryTransport::new(64);
        let tracker = CorrelationTracker::new(wire.clone(), "t");
        let req = CommandRequest::new("a", "ping", ArgMap::new());
        let _first = tracker.begin(&req, Duration::from_secs(1)).unwrap();
        let sent = wire.frame_count();
        assert_eq!(
            tracker.begin(&req, Duration::from_secs(1)).err(),
            Some(TrackerError::DuplicateId("a".into()))
        );
        assert_eq!(wire.frame_count(), sent);
    }

    #[test]
    fn terminal_resolves_and_interim_does_not() {
        let wire = MemoryTransport::new(32);
        let tracker = CorrelationTracker::new(wire.clone(), "t");
        let req = CommandRequest::new("p1", "provision", ArgMap::new());
        let exchange = tracker.begin(&req, Duration::from_secs(2)).unwrap();
        assert_eq!(sent_request(&wire), req);

        for f in frames_for(&CommandResponse::interim("p1", "Connecting"), 10) {
            tracker.on_frame(&f).unwrap();
        }
        for f in frames_for(&CommandResponse::success("p1", "Success_IP:10.0.0.5"), 10) {
            tracker.on_frame(&f).unwrap();
        }

        let mut seen = Vec::new();
        let resp = future::block_on(exchange.finish_with(|r| seen.push(r.text.clone())));
        assert_eq!(resp.text, "Success_IP:10.0.0.5");
        assert_eq!(seen, ["Connecting"]);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn silence_times_out_locally() {
        let tracker = CorrelationTracker::new(MemoryTransport::new(64), "t");
        let req = CommandRequest::new("q", "status", ArgMap::new());
        let exchange = tracker.begin(&req, Duration::from_millis(20)).unwrap();
        let resp = future::block_on(exchange.finish());
        assert_eq!(resp.code, StatusCode::Timeout);
        assert_eq!(resp.id, "q");
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn late_response_is_ignored() {
        let tracker = CorrelationTracker::new(MemoryTransport::new(64), "t");
        let req = CommandRequest::new("late", "status", ArgMap::new());
        drop(tracker.begin(&req, Duration::from_millis(5)).unwrap());
        for f in frames_for(&CommandResponse::success("late", "ok"), 60) {
            assert!(tracker.on_frame(&f).is_ok());
        }
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    fn progress_history_is_bounded() {
        let tracker = CorrelationTracker::new(MemoryTransport::new(64), "t");
        let req = CommandRequest::new("h", "scan", ArgMap::new());
        let exchange = tracker.begin(&req, Duration::from_secs(1)).unwrap();
        for i in 0..(PROGRESS_HISTORY + 3) {
            for f in frames_for(&CommandResponse::interim("h", format!("step {i}")), 60) {
                tracker.on_frame(&f).unwrap();
            }
        }
        let progress = exchange.take_progress();
        assert_eq!(progress.len(), PROGRESS_HISTORY);
        assert_eq!(progress[0].text, "step 3");
    }

    #[test]
    fn generated_ids_are_unique() {
        let tracker = CorrelationTracker::new(MemoryTransport::new(64), "cli");
        assert_eq!(tracker.next_id(), "cli-1");
        assert_eq!(tracker.next_id(), "cli-2");
    }
}
