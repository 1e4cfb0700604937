//! Cmdgate — host entry point.
//!
//! Serves the command protocol over a length-prefixed TCP stream, one
//! client at a time, standing in for the radio link.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  Accept thread                     Link thread (main)          │
//! │  ┌──────────────────────┐          ┌────────────────────────┐  │
//! │  │ TcpListener::incoming│          │ LocalExecutor          │  │
//! │  │ FrameDecoder         │─LINK_──▶ │  ServerLink            │  │
//! │  │ (blocking reads)     │ EVENTS   │  Dispatcher · Registry │  │
//! │  └──────────────────────┘          │  NmcliWifi · LinuxSys  │  │
//! │                                    └────────────────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The process exits once a `shutdown` command has been acknowledged.

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use edge_executor::LocalExecutor;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use futures_lite::future;
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use cmdgate::adapters::log_sink::LogEventSink;
use cmdgate::adapters::stream_transport::StreamTransport;
use cmdgate::adapters::system::LinuxSystem;
use cmdgate::adapters::wifi::NmcliWifi;
use cmdgate::app::service::{Services, builtin_registry};
use cmdgate::config::GatewayConfig;
use cmdgate::rpc::codec::FrameDecoder;
use cmdgate::rpc::engine::Dispatcher;
use cmdgate::rpc::io_task::ServerLink;

type Link = ServerLink<StreamTransport<TcpStream>>;

const READ_BUF: usize = 1024;

// ── Inbound link events ───────────────────────────────────────

/// What the transport thread reports to the link task.
enum LinkEvent {
    /// A client connected. Carries the write half and its frame limit.
    Connected { stream: TcpStream, max_frame: usize },
    /// One complete link frame.
    Frame(Vec<u8>),
    Disconnected,
}

const LINK_DEPTH: usize = 16;

/// Transport thread → link task. Crosses threads, hence the
/// critical-section mutex.
static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, LINK_DEPTH> = Channel::new();

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── 2. Configuration ──────────────────────────────────────
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = GatewayConfig::load(path.as_deref()).context("loading configuration")?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Cmdgate v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");
    info!(
        "Device '{}', max frame {} bytes, interface {}",
        config.device_name,
        config.max_frame_size,
        config.wifi_ifname.as_deref().unwrap_or("(auto)")
    );

    serve(config).context("gateway stopped with error")?;
    info!("Gateway stopped");
    Ok(())
}

fn serve(config: GatewayConfig) -> cmdgate::Result<()> {
    // ── 3. Transport thread ───────────────────────────────────
    let listener = TcpListener::bind(&config.listen_addr)?;
    info!("LINK: listening on {}", config.listen_addr);
    let max_frame = config.max_frame_size;
    std::thread::Builder::new()
        .name("link-accept".into())
        .spawn(move || accept_loop(&listener, max_frame))?;

    // ── 4. Command core ───────────────────────────────────────
    let services = Rc::new(Services::new(
        NmcliWifi::new(&config),
        LinuxSystem::new(&config),
        config.clone(),
    ));
    let registry = Rc::new(builtin_registry(services)?);
    let dispatcher = Rc::new(Dispatcher::new(registry, LogEventSink::new()));

    // ── 5. Link task ──────────────────────────────────────────
    let executor: Rc<LocalExecutor<'static>> = Rc::new(LocalExecutor::new());
    let link: Rc<Link> = ServerLink::new(dispatcher, executor.clone(), config.reassembly_timeout());
    link.start();

    let stop = link.clone();
    let stopped = async move { stop.stopped().await };
    future::block_on(executor.run(future::or(link_events(link.clone()), stopped)));
    link.disconnect();
    Ok(())
}

/// Forward transport-thread events into the link.
async fn link_events(link: Rc<Link>) {
    loop {
        match LINK_EVENTS.receive().await {
            LinkEvent::Connected { stream, max_frame } => {
                link.connect(StreamTransport::new(stream, max_frame));
            }
            LinkEvent::Frame(frame) => {
                // Framing errors are logged and reported by the link.
                let _ = link.on_receive(&frame);
            }
            LinkEvent::Disconnected => link.disconnect(),
        }
    }
}

// ── Transport thread ──────────────────────────────────────────

fn accept_loop(listener: &TcpListener, max_frame: usize) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("LINK: accept failed: {}", e);
                continue;
            }
        };
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_string(), |a| a.to_string());
        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                warn!("LINK: cannot split stream from {}: {}", peer, e);
                continue;
            }
        };
        let _ = stream.set_nodelay(true);

        info!("CLIENT[{}]: connected", peer);
        future::block_on(LINK_EVENTS.send(LinkEvent::Connected {
            stream: writer,
            max_frame,
        }));
        read_frames(stream, &peer);
        future::block_on(LINK_EVENTS.send(LinkEvent::Disconnected));
        info!("CLIENT[{}]: disconnected", peer);
    }
}

/// Blocking read loop for one client; returns on EOF or error.
fn read_frames(mut stream: TcpStream, peer: &str) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_BUF];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("CLIENT[{}]: read failed: {}", peer, e);
                return;
            }
        };
        for frame in decoder.feed(&buf[..n]) {
            future::block_on(LINK_EVENTS.send(LinkEvent::Frame(frame)));
        }
    }
}
