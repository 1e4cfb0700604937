//! Server link task — bridges one transport to the dispatcher.
//!
//! Runs on an `edge-executor` `LocalExecutor` with `async-io-mini`
//! timers. Per link there are two long-lived tasks plus one task per
//! dispatched request:
//!
//! 1. **Write** — truly async via `Outbox::next().await`; writes one
//!    whole message (every frame) before taking the next
//! 2. **Expire** — checks the reassembler every 250ms for partial
//!    messages that outlived the reassembly bound
//! 3. **Dispatch** — spawned by [`ServerLink::on_receive`] for each
//!    decoded request, so a slow handler never blocks frame reception
//!
//! ```text
//!  ┌────────────────────────────────────────────────────────────┐
//!  │  Link thread                                               │
//!  │  ┌──────────────────────────────────────────────────────┐  │
//!  │  │  futures_lite::block_on (drives executor + timers)   │  │
//!  │  │  ┌──────────────────────────────────────────────────┐│  │
//!  │  │  │  edge_executor::LocalExecutor                    ││  │
//!  │  │  │                                                  ││  │
//!  │  │  │  ┌─────────┐  ┌──────────┐  ┌───────────────┐   ││  │
//!  │  │  │  │ Write   │  │ Expire   │  │ Dispatch × N  │   ││  │
//!  │  │  │  │ outbox  │  │ 250ms ⏱  │  │ per request   │   ││  │
//!  │  │  │  └─────────┘  └──────────┘  └───────────────┘   ││  │
//!  │  │  └──────────────────────────────────────────────────┘│  │
//!  │  └──────────────────────────────────────────────────────┘  │
//!  └────────────────────────────────────────────────────────────┘
//! ```

use core::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use async_io_mini::Timer;
use edge_executor::LocalExecutor;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use log::{info, warn};

use crate::app::events::GatewayEvent;

use super::channels::Outbound;
use super::chunked::{ChunkReassembler, FrameError};
use super::engine::Dispatcher;
use super::envelope::{decode_request, encode_response};
use super::transport::{Transport, send_message};

const EXPIRE_TICK: Duration = Duration::from_millis(250);

/// Responder side of one link.
pub struct ServerLink<T: Transport + 'static> {
    dispatcher: Rc<Dispatcher>,
    executor: Rc<LocalExecutor<'static>>,
    transport: RefCell<Option<T>>,
    reassembler: RefCell<ChunkReassembler>,
    stopped: Signal<NoopRawMutex, ()>,
    started: Cell<bool>,
}

impl<T: Transport + 'static> ServerLink<T> {
    pub fn new(
        dispatcher: Rc<Dispatcher>,
        executor: Rc<LocalExecutor<'static>>,
        reassembly_timeout: Duration,
    ) -> Rc<Self> {
        Rc::new(Self {
            dispatcher,
            executor,
            transport: RefCell::new(None),
            reassembler: RefCell::new(ChunkReassembler::new(reassembly_timeout)),
            stopped: Signal::new(),
            started: Cell::new(false),
        })
    }

    pub fn dispatcher(&self) -> &Rc<Dispatcher> {
        &self.dispatcher
    }

    /// Spawn the writer and expiry tasks. Idempotent.
    pub fn start(self: &Rc<Self>) {
        if self.started.replace(true) {
            return;
        }
        self.executor.spawn(write_loop(self.clone())).detach();
        self.executor.spawn(expire_loop(self.clone())).detach();
        info!("LINK: task started");
    }

    /// A client connected over `transport`. Starts a fresh session.
    pub fn connect(&self, transport: T) {
        if self.transport.borrow().is_some() {
            self.disconnect();
        }
        let max_frame = transport.max_frame_size();
        self.reassembler.borrow_mut().reset();
        *self.transport.borrow_mut() = Some(transport);
        let session = self.dispatcher.begin_session();
        info!("LINK: session {} up (max frame {} bytes)", session, max_frame);
        self.dispatcher
            .emit(&GatewayEvent::LinkUp { session, max_frame });
    }

    /// The client went away. Abandons in-flight work and releases locks.
    pub fn disconnect(&self) {
        let Some(_transport) = self.transport.borrow_mut().take() else {
            return;
        };
        let session = self.dispatcher.session();
        let in_flight = self.dispatcher.in_flight();
        self.reassembler.borrow_mut().reset();
        self.dispatcher.end_session();
        info!("LINK: session {} down ({} in flight)", session, in_flight);
        self.dispatcher.emit(&GatewayEvent::LinkDown {
            session,
            in_flight,
        });

        // An accepted shutdown whose acknowledgment died with the session
        // still stops the link.
        if self.dispatcher.is_stopping() && !self.is_stopped() {
            info!("LINK: shutdown accepted before link loss, stopping");
            self.stopped.signal(());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.borrow().is_some()
    }

    /// Feed one inbound frame. Complete requests are dispatched on their
    /// own task; framing errors are reported and the frame dropped.
    pub fn on_receive(&self, frame: &[u8]) -> Result<(), FrameError> {
        let fed = self.reassembler.borrow_mut().feed(frame);
        let payload = match fed {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("LINK: frame discarded: {}", e);
                self.dispatcher.emit(&GatewayEvent::FrameDiscarded {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let dispatcher = self.dispatcher.clone();
        match decode_request(&payload) {
            Ok(request) => {
                self.executor
                    .spawn(async move { dispatcher.serve(request).await })
                    .detach();
            }
            Err(e) => {
                warn!("LINK: {}", e);
                self.dispatcher.emit(&GatewayEvent::PayloadRejected {
                    id: e.id.clone(),
                    reason: e.kind.to_string(),
                });
                if let Some(response) = e.to_response() {
                    let out = Outbound {
                        response,
                        session: self.dispatcher.session(),
                        stop_after: false,
                    };
                    self.executor
                        .spawn(async move { dispatcher.outbox().push(out).await })
                        .detach();
                }
            }
        }
        Ok(())
    }

    /// Resolves once a shutdown acknowledgment has been written.
    pub async fn stopped(&self) {
        self.stopped.wait().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.signaled()
    }

    fn write(&self, out: &Outbound) {
        if out.session != self.dispatcher.session() {
            info!("RPC[{}]: dropping response for closed session", out.response.id);
            return;
        }

        let payload = match encode_response(&out.response) {
            Ok(p) => p,
            Err(e) => {
                warn!("RPC[{}]: {}", out.response.id, e);
                return;
            }
        };

        let mut transport = self.transport.borrow_mut();
        let Some(transport) = transport.as_mut() else {
            info!("RPC[{}]: no link, response dropped", out.response.id);
            return;
        };

        if let Err(e) = send_message(transport, &payload) {
            warn!("RPC[{}]: write failed: {}", out.response.id, e);
        }
    }
}

// ── Async loops ──────────────────────────────────────────────

/// Write task — wakes when a dispatch task queues output. One message is
/// written to completion before the next is taken.
async fn write_loop<T: Transport + 'static>(link: Rc<ServerLink<T>>) {
    loop {
        let out = link.dispatcher.outbox().next().await;
        link.write(&out);
        if out.stop_after {
            info!("LINK: shutdown acknowledged, stopping");
            link.stopped.signal(());
        }
    }
}

/// Expire task — drops partial messages older than the reassembly bound.
async fn expire_loop<T: Transport + 'static>(link: Rc<ServerLink<T>>) {
    loop {
        Timer::after(EXPIRE_TICK).await;
        let expired = link.reassembler.borrow_mut().expire(Instant::now());
        if let Err(e) = expired {
            warn!("LINK: {}", e);
            link.dispatcher.emit(&GatewayEvent::FrameDiscarded {
                reason: e.to_string(),
            });
        }
    }
}
