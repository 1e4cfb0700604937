//! Command dispatcher — turns a decoded request into exactly one terminal
//! response.
//!
//! **Transport-decoupled**: the dispatcher does not own a transport.
//! The link task feeds it decoded requests and drains its [`Outbox`].
//!
//! Every request passes through a fixed gate sequence before its handler
//! runs:
//!
//! 1. **Lifecycle** — once shutdown is accepted nothing new is dispatched.
//! 2. **Lookup** — unknown names get `ERR_UNKNOWN_COMMAND`.
//! 3. **Validation** — the command's argument contract; `ERR_INVALID_ARGS`.
//! 4. **In-flight id** — a resubmitted id still running gets `ERR_BUSY`.
//! 5. **Busy lock** — exclusive commands are serialised; `ERR_BUSY`.
//!
//! The handler then races its deadline and the link session. Panics are
//! caught at this boundary. Interim output goes straight to the outbox
//! through [`Progress`]; the terminal is returned as a [`Terminal`],
//! which only this module can build.

use core::cell::RefCell;
use core::fmt;
use core::panic::AssertUnwindSafe;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Instant;

use async_io_mini::Timer;
use futures_lite::FutureExt;
use futures_lite::future;
use log::{info, warn};

use crate::app::events::GatewayEvent;
use crate::app::ports::EventSink;

use super::busy::{BusyLock, BusyView};
use super::cancel::CancelToken;
use super::channels::{Outbound, Outbox};
use super::envelope::{
    CommandRequest, CommandResponse, PREVIEW_LIMIT, StatusCode, preview, redacted_args,
};
use super::registry::{Args, HandlerResult, Registry};

// ── Handler-facing types ─────────────────────────────────────

/// Interim output channel for one request.
#[derive(Clone)]
pub struct Progress {
    id: String,
    session: u64,
    outbox: Outbox,
}

impl Progress {
    pub(crate) fn new(id: impl Into<String>, session: u64, outbox: Outbox) -> Self {
        Self {
            id: id.into(),
            session,
            outbox,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue an interim response for the writer. Waits while the outbox
    /// is full, so progress is never dropped.
    pub async fn emit(&self, text: impl Into<String>) {
        let response = CommandResponse::interim(self.id.clone(), text);
        info!("RPC[{}]: progress {}", self.id, preview(&response.text, PREVIEW_LIMIT));
        self.outbox
            .push(Outbound {
                response,
                session: self.session,
                stop_after: false,
            })
            .await;
    }
}

/// Shared stop flag. Set by the shutdown command, read by the dispatcher.
#[derive(Clone, Default)]
pub struct Lifecycle {
    accepted_by: Rc<RefCell<Option<String>>>,
}

impl Lifecycle {
    pub fn is_stopping(&self) -> bool {
        self.accepted_by.borrow().is_some()
    }

    fn accepted_by(&self, id: &str) -> bool {
        self.accepted_by.borrow().as_deref() == Some(id)
    }
}

/// Lets one invocation accept shutdown on behalf of its request.
pub struct ShutdownHandle {
    lifecycle: Lifecycle,
    id: String,
}

impl ShutdownHandle {
    /// Stop serving after this request's terminal response is written.
    pub fn request(&self) {
        let mut accepted = self.lifecycle.accepted_by.borrow_mut();
        if accepted.is_none() {
            *accepted = Some(self.id.clone());
        }
    }
}

/// Everything a handler gets for one call.
pub struct Invocation {
    pub id: String,
    pub command: &'static str,
    pub args: Args,
    pub progress: Progress,
    /// Fires on deadline expiry or link teardown.
    pub cancel: CancelToken,
    pub busy: BusyView,
    /// Read-only registry, for introspection commands.
    pub registry: Rc<Registry>,
    pub shutdown: ShutdownHandle,
}

/// The single terminal response of one dispatch.
#[derive(Debug)]
pub struct Terminal {
    response: CommandResponse,
    session: u64,
    stop_after: bool,
    abandoned: bool,
}

impl Terminal {
    pub fn response(&self) -> &CommandResponse {
        &self.response
    }

    /// The handler lost its link before finishing; nothing to transmit.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn stops_link(&self) -> bool {
        self.stop_after
    }

    pub fn into_response(self) -> CommandResponse {
        self.response
    }

    pub fn into_outbound(self) -> Outbound {
        Outbound {
            response: self.response,
            session: self.session,
            stop_after: self.stop_after,
        }
    }
}

// ── Session state ────────────────────────────────────────────

#[derive(Clone)]
struct Session {
    id: u64,
    cancel: CancelToken,
}

struct InFlightGuard {
    ids: Rc<RefCell<BTreeSet<String>>>,
    id: String,
}

impl InFlightGuard {
    fn claim(ids: &Rc<RefCell<BTreeSet<String>>>, id: &str) -> Option<Self> {
        if !ids.borrow_mut().insert(id.to_string()) {
            return None;
        }
        Some(Self {
            ids: ids.clone(),
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids.borrow_mut().remove(&self.id);
    }
}

enum Ended {
    Finished(std::thread::Result<HandlerResult>),
    TimedOut,
    Abandoned,
}

// ── Dispatcher ───────────────────────────────────────────────

pub struct Dispatcher {
    registry: Rc<Registry>,
    busy: BusyLock,
    in_flight: Rc<RefCell<BTreeSet<String>>>,
    session: RefCell<Session>,
    lifecycle: Lifecycle,
    outbox: Outbox,
    events: RefCell<Box<dyn EventSink>>,
}

impl Dispatcher {
    pub fn new(registry: Rc<Registry>, events: impl EventSink + 'static) -> Self {
        Self {
            registry,
            busy: BusyLock::new(),
            in_flight: Rc::new(RefCell::new(BTreeSet::new())),
            session: RefCell::new(Session {
                id: 0,
                cancel: CancelToken::new(),
            }),
            lifecycle: Lifecycle::default(),
            outbox: Outbox::new(),
            events: RefCell::new(Box::new(events)),
        }
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    pub fn busy(&self) -> &BusyLock {
        &self.busy
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn is_stopping(&self) -> bool {
        self.lifecycle.is_stopping()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.borrow().len()
    }

    /// Current link session number (0 before the first connect).
    pub fn session(&self) -> u64 {
        self.session.borrow().id
    }

    /// Start a new link session. Returns its number.
    pub fn begin_session(&self) -> u64 {
        let mut session = self.session.borrow_mut();
        session.id = session.id.wrapping_add(1);
        session.cancel = CancelToken::new();
        session.id
    }

    /// Tear the current session down: abandon in-flight handlers, release
    /// the busy lock and drop queued output.
    pub fn end_session(&self) {
        let session = self.session.borrow().clone();
        session.cancel.cancel();

        if let Some(holder) = self.busy.force_release() {
            warn!(
                "RPC[{}]: link closed, releasing busy lock held by {}",
                holder.id, holder.command
            );
        }

        let dropped = self.outbox.drain();
        if dropped > 0 {
            info!("RPC: dropped {} queued responses for session {}", dropped, session.id);
        }
    }

    pub(crate) fn emit(&self, event: &GatewayEvent) {
        self.events.borrow_mut().emit(event);
    }

    /// Dispatch one request to completion.
    pub async fn dispatch(&self, request: CommandRequest) -> Terminal {
        let started = Instant::now();
        let session = self.session.borrow().clone();
        let command = request.cmd.clone();

        info!(
            "RPC[{}]: {} args={}",
            request.id,
            request.cmd,
            redacted_args(&request.args)
        );

        let (response, abandoned) = self.execute(request, &session).await;
        // Once accepted, the shutdown request's terminal stops the link
        // whatever its outcome.
        let stop_after = self.lifecycle.accepted_by(&response.id);
        let elapsed = started.elapsed();

        if abandoned {
            warn!(
                "RPC[{}]: {} abandoned after {} ms (link closed)",
                response.id,
                command,
                elapsed.as_millis()
            );
        } else {
            info!(
                "RPC[{}]: {} -> {} ({} ms) {}",
                response.id,
                command,
                response.code,
                elapsed.as_millis(),
                preview(&response.text, PREVIEW_LIMIT)
            );
        }

        self.emit(&GatewayEvent::CommandFinished {
            id: response.id.clone(),
            command,
            code: response.code,
            elapsed,
            abandoned,
        });
        if stop_after {
            self.emit(&GatewayEvent::ShutdownAccepted {
                id: response.id.clone(),
            });
        }

        Terminal {
            response,
            session: session.id,
            stop_after,
            abandoned,
        }
    }

    /// Dispatch and queue the terminal for the writer.
    pub async fn serve(&self, request: CommandRequest) {
        let terminal = self.dispatch(request).await;
        if terminal.is_abandoned() {
            return;
        }
        self.outbox.push(terminal.into_outbound()).await;
    }

    async fn execute(&self, request: CommandRequest, session: &Session) -> (CommandResponse, bool) {
        let CommandRequest { id, cmd, args } = request;
        let reject = |code: StatusCode, text: String| {
            (CommandResponse::failure(id.clone(), code, text), false)
        };

        // ── Gate 1: Lifecycle ─────────────────────────────────
        if self.lifecycle.is_stopping() {
            return reject(StatusCode::Busy, "Busy: shutting down".into());
        }

        // ── Gate 2: Lookup ────────────────────────────────────
        let Some(entry) = self.registry.lookup(&cmd) else {
            return reject(StatusCode::UnknownCommand, format!("Unknown command: {cmd}"));
        };
        let spec = &entry.spec;

        // ── Gate 3: Argument contract ─────────────────────────
        let args = match spec.validate(&args) {
            Ok(args) => args,
            Err(e) => return reject(StatusCode::InvalidArgs, format!("Invalid args: {e}")),
        };

        // ── Gate 4: One lifecycle per id ──────────────────────
        let Some(_in_flight) = InFlightGuard::claim(&self.in_flight, &id) else {
            return reject(StatusCode::Busy, format!("Busy: request {id} already in flight"));
        };

        // ── Gate 5: Busy lock ─────────────────────────────────
        let _busy = if spec.exclusive {
            match self.busy.try_acquire(spec.name, &id) {
                Ok(guard) => Some(guard),
                Err(holder) => {
                    return reject(
                        StatusCode::Busy,
                        format!("Busy: {} in progress ({})", holder.command, holder.id),
                    );
                }
            }
        } else {
            None
        };

        // ── Handler ───────────────────────────────────────────
        let cancel = CancelToken::new();
        let invocation = Invocation {
            id: id.clone(),
            command: spec.name,
            args,
            progress: Progress::new(id.clone(), session.id, self.outbox.clone()),
            cancel: cancel.clone(),
            busy: self.busy.view(),
            registry: self.registry.clone(),
            shutdown: ShutdownHandle {
                lifecycle: self.lifecycle.clone(),
                id: id.clone(),
            },
        };

        let timeout = spec.timeout;
        let work = AssertUnwindSafe(entry.handler.call(invocation)).catch_unwind();

        let ended = future::or(
            async { Ended::Finished(work.await) },
            future::or(
                async {
                    Timer::after(timeout).await;
                    Ended::TimedOut
                },
                async {
                    session.cancel.cancelled().await;
                    Ended::Abandoned
                },
            ),
        )
        .await;

        match ended {
            Ended::Finished(Ok(Ok(outcome))) => {
                let mut response = CommandResponse::success(id, outcome.text);
                response.data = outcome.data;
                (response, false)
            }
            Ended::Finished(Ok(Err(e))) => {
                let code = if e.code.is_ok() {
                    StatusCode::Internal
                } else {
                    e.code
                };
                (CommandResponse::failure(id, code, e.message), false)
            }
            Ended::Finished(Err(panic)) => {
                let msg = PanicMessage(&*panic);
                warn!("RPC[{}]: handler panicked: {}", id, msg);
                (
                    CommandResponse::failure(id, StatusCode::Internal, format!("Handler panicked: {msg}")),
                    false,
                )
            }
            Ended::TimedOut => {
                cancel.cancel();
                let text = format!("Command timeout after {:.1}s", timeout.as_secs_f64());
                (CommandResponse::failure(id, StatusCode::Timeout, text), false)
            }
            Ended::Abandoned => {
                cancel.cancel();
                (
                    CommandResponse::failure(id, StatusCode::Internal, "Link closed"),
                    true,
                )
            }
        }
    }
}

struct PanicMessage<'a>(&'a (dyn core::any::Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<&str>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else {
            f.write_str("unknown panic")
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
