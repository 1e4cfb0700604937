//! Mock port adapters and a link harness for integration tests.
//!
//! The mocks record every call so tests can assert on what the command
//! set asked of the host without running `nmcli` or touching a real
//! interface. [`Harness`] wires them into a full server link over an
//! in-memory transport.

use core::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use async_io_mini::Timer;
use edge_executor::LocalExecutor;
use futures_lite::future;
use serde_json::Value;

use cmdgate::app::events::GatewayEvent;
use cmdgate::app::ports::{
    AccessPoint, EventSink, SystemError, SystemPort, WifiError, WifiLink, WifiPort,
};
use cmdgate::app::service::{Services, builtin_registry};
use cmdgate::config::GatewayConfig;
use cmdgate::rpc::chunked::{ChunkReassembler, FRAME_HEADER_SIZE, chunk_payload};
use cmdgate::rpc::engine::Dispatcher;
use cmdgate::rpc::envelope::{CommandRequest, CommandResponse, decode_response, encode_request};
use cmdgate::rpc::io_task::ServerLink;
use cmdgate::rpc::transport::MemoryTransport;

// ── MockWifi ──────────────────────────────────────────────────

pub struct MockWifi {
    pub active: RefCell<Option<String>>,
    pub connect_error: RefCell<Option<WifiError>>,
    pub ip: RefCell<Option<String>>,
    pub connect_delay: Cell<Duration>,
    pub connects: Cell<usize>,
    pub last_password: RefCell<Option<String>>,
}

#[allow(dead_code)]
impl MockWifi {
    pub fn new() -> Self {
        Self {
            active: RefCell::new(None),
            connect_error: RefCell::new(None),
            ip: RefCell::new(Some("10.0.0.5".into())),
            connect_delay: Cell::new(Duration::ZERO),
            connects: Cell::new(0),
            last_password: RefCell::new(None),
        }
    }

    pub fn joined_to(self, ssid: &str) -> Self {
        *self.active.borrow_mut() = Some(ssid.into());
        self
    }

    pub fn failing(self, error: WifiError) -> Self {
        *self.connect_error.borrow_mut() = Some(error);
        self
    }

    pub fn slow(self, delay: Duration) -> Self {
        self.connect_delay.set(delay);
        self
    }

    pub fn without_ip(self) -> Self {
        *self.ip.borrow_mut() = None;
        self
    }
}

impl WifiPort for MockWifi {
    async fn active_ssid(&self) -> Result<Option<String>, WifiError> {
        Ok(self.active.borrow().clone())
    }

    async fn connect(&self, ssid: &str, password: Option<&str>) -> Result<(), WifiError> {
        self.connects.set(self.connects.get() + 1);
        *self.last_password.borrow_mut() = password.map(str::to_string);
        let delay = self.connect_delay.get();
        if !delay.is_zero() {
            Timer::after(delay).await;
        }
        if let Some(e) = self.connect_error.borrow().clone() {
            return Err(e);
        }
        *self.active.borrow_mut() = Some(ssid.into());
        Ok(())
    }

    async fn wait_for_ip(&self) -> Result<String, WifiError> {
        self.ip.borrow().clone().ok_or(WifiError::NoIp)
    }
}

// ── MockSystem ────────────────────────────────────────────────

pub struct MockSystem {
    pub hostname: Result<String, SystemError>,
    pub link: WifiLink,
    pub aps: Vec<AccessPoint>,
    pub scans: Cell<usize>,
}

#[allow(dead_code)]
impl MockSystem {
    pub fn new() -> Self {
        Self {
            hostname: Ok("uav-01".into()),
            link: WifiLink::Disconnected,
            aps: Vec::new(),
            scans: Cell::new(0),
        }
    }
}

impl SystemPort for MockSystem {
    async fn whoami(&self) -> Result<String, SystemError> {
        Ok("pilot".into())
    }

    async fn hostname(&self) -> Result<String, SystemError> {
        self.hostname.clone()
    }

    async fn uname(&self) -> Result<String, SystemError> {
        Ok("Linux 6.1.0 aarch64".into())
    }

    async fn ifconfig(&self, ifname: Option<&str>) -> Result<String, SystemError> {
        Ok(format!("{}: flags=4163<UP,BROADCAST,RUNNING>", ifname.unwrap_or("wlan0")))
    }

    async fn wifi_link(&self) -> Result<WifiLink, SystemError> {
        Ok(self.link.clone())
    }

    async fn ssh_state(&self) -> Result<String, SystemError> {
        Ok("service=ssh,enabled=enabled,active=active".into())
    }

    async fn scan(&self, _ifname: Option<&str>) -> Result<Vec<AccessPoint>, SystemError> {
        self.scans.set(self.scans.get() + 1);
        Ok(self.aps.clone())
    }
}

// ── Event recorder ────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct Recorder(pub Rc<RefCell<Vec<GatewayEvent>>>);

impl EventSink for Recorder {
    fn emit(&mut self, event: &GatewayEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type MockServices = Services<MockWifi, MockSystem>;

/// A started server link over an in-memory transport.
pub struct Harness {
    pub executor: Rc<LocalExecutor<'static>>,
    pub link: Rc<ServerLink<MemoryTransport>>,
    pub wire: MemoryTransport,
    pub services: Rc<MockServices>,
    pub events: Recorder,
    max_frame: usize,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(wifi: MockWifi, system: MockSystem, max_frame: usize) -> Self {
        let config = GatewayConfig {
            max_frame_size: max_frame,
            ..GatewayConfig::default()
        };
        let services = Rc::new(Services::new(wifi, system, config.clone()));
        let registry = Rc::new(builtin_registry(services.clone()).unwrap());
        let events = Recorder::default();
        let dispatcher = Rc::new(Dispatcher::new(registry, events.clone()));

        let executor: Rc<LocalExecutor<'static>> = Rc::new(LocalExecutor::new());
        let link = ServerLink::new(dispatcher, executor.clone(), config.reassembly_timeout());
        link.start();

        let wire = MemoryTransport::new(max_frame);
        link.connect(wire.clone());

        Self {
            executor,
            link,
            wire,
            services,
            events,
            max_frame,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MockWifi::new(), MockSystem::new(), 360)
    }

    /// Chunk `cmd` to the link's frame size and feed every frame.
    pub fn send(&self, id: &str, cmd: &str, args: Value) {
        let Value::Object(args) = args else {
            panic!("args must be an object");
        };
        let payload = encode_request(&CommandRequest::new(id, cmd, args)).unwrap();
        self.send_raw(&payload);
    }

    pub fn send_raw(&self, payload: &[u8]) {
        for frame in chunk_payload(payload, self.max_frame - FRAME_HEADER_SIZE) {
            self.link.on_receive(&frame).unwrap();
        }
    }

    /// Drive the executor until `fut` completes.
    pub fn run<T>(&self, fut: impl core::future::Future<Output = T>) -> T {
        future::block_on(self.executor.run(fut))
    }

    /// Let spawned tasks make progress for `ms` milliseconds.
    pub fn settle(&self, ms: u64) {
        self.run(Timer::after(Duration::from_millis(ms)));
    }

    /// Every response written so far, reassembled and decoded.
    pub fn responses(&self) -> Vec<CommandResponse> {
        decode_all(&self.wire)
    }

    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events.0.borrow().clone()
    }
}

/// Reassemble and decode every frame captured by `wire`.
pub fn decode_all(wire: &MemoryTransport) -> Vec<CommandResponse> {
    let mut reassembler = ChunkReassembler::default();
    wire.take_frames()
        .iter()
        .filter_map(|frame| reassembler.feed(frame).unwrap())
        .map(|payload| decode_response(&payload).unwrap())
        .collect()
}
