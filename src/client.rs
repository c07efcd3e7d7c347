//! Persistent relay connection for trackers and receivers.
//!
//! A [`ChannelClient`] owns one supervisor thread that connects, performs the
//! WebSocket handshake, registers, then services the socket until the session
//! ends, waits one retry interval and starts over. Only that thread ever dials
//! or touches the socket, so at most one attempt is in flight. Outbound frames
//! reach it through a small outbox. Inbound events are queued and handed to
//! the owner by [`ChannelClient::pump`] or [`ChannelClient::dispatch`]; nothing
//! is called back on the supervisor thread.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tungstenite::WebSocket;

use crate::protocol::{self, Registration, Role, TrackerRecord};
use crate::transport::{
    close_gracefully, flush_pending, read_text, send_text, socket_config, Endpoint, Incoming,
};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const IO_POLL: Duration = Duration::from_millis(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// Frames waiting for the session thread; a full outbox skips the frame.
const OUTBOX_DEPTH: usize = 8;
const WAIT_SLICE: Duration = Duration::from_millis(25);
const MAX_PENDING_EVENTS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
    Errored,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub role: Role,
    pub id: i32,
    pub flip_x: bool,
    pub flip_y: bool,
    pub retry_interval: Duration,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn emitter(endpoint: Endpoint, id: i32) -> Self {
        Self::new(endpoint, Role::Emitter, id)
    }

    pub fn subscriber(endpoint: Endpoint, id: i32) -> Self {
        Self::new(endpoint, Role::Subscriber, id)
    }

    fn new(endpoint: Endpoint, role: Role, id: i32) -> Self {
        Self {
            endpoint,
            role,
            id,
            flip_x: false,
            flip_y: false,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    fn registration(&self) -> Registration {
        Registration {
            role: self.role,
            id: self.id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    TrackerData(TrackerRecord),
    DebugToggle,
}

/// Receives drained client events on the owner's thread.
pub trait TrackerListener {
    fn on_tracker_data(&mut self, _record: TrackerRecord) {}

    fn on_debug_toggle(&mut self) {}

    fn on_state_changed(&mut self, _state: ConnectionState) {}
}

/// Turn one record received from the relay into the event it raises, if any.
///
/// The sentinel is recognized before any flip is applied; other records are
/// flipped and then filtered to this client's channel.
pub fn interpret_record(cfg: &ClientConfig, record: TrackerRecord) -> Option<ClientEvent> {
    if record.is_debug_sentinel() {
        return Some(ClientEvent::DebugToggle);
    }
    let mut record = record;
    if cfg.flip_x {
        record.x = 1.0 - record.x;
    }
    if cfg.flip_y {
        record.y = 1.0 - record.y;
    }
    (record.channel_id == cfg.id).then_some(ClientEvent::TrackerData(record))
}

struct Shared {
    cfg: ClientConfig,
    state: Mutex<ConnectionState>,
    outbox: Mutex<Option<SyncSender<String>>>,
    events: Mutex<VecDeque<ClientEvent>>,
    attempts: AtomicU64,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = lock(&self.state);
        if *state == next {
            return;
        }
        log::info!(
            "{} {}: {:?} -> {:?}",
            self.cfg.role,
            self.cfg.id,
            *state,
            next
        );
        *state = next;
        self.push_event(ClientEvent::StateChanged(next));
    }

    fn push_event(&self, event: ClientEvent) {
        let mut events = lock(&self.events);
        if events.len() >= MAX_PENDING_EVENTS {
            events.pop_front();
            log::debug!("event queue full; oldest event dropped");
        }
        events.push_back(event);
    }

    fn release_outbox(&self) {
        lock(&self.outbox).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct ChannelClient {
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ChannelClient {
    /// Start the supervisor thread; the first attempt is made immediately.
    pub fn spawn(cfg: ClientConfig) -> Result<Self> {
        if cfg.retry_interval.is_zero() {
            return Err(anyhow!("retry interval must be greater than zero"));
        }
        let shared = Arc::new(Shared {
            cfg,
            state: Mutex::new(ConnectionState::Disconnected),
            outbox: Mutex::new(None),
            events: Mutex::new(VecDeque::new()),
            attempts: AtomicU64::new(0),
        });
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_shared = shared.clone();
        let thread_shutdown = shutdown.clone();
        let join = std::thread::Builder::new()
            .name(format!("{}-{}", shared.cfg.role, shared.cfg.id))
            .spawn(move || supervise(&thread_shared, &thread_shutdown))
            .context("failed to start client thread")?;

        Ok(Self {
            shared,
            shutdown,
            join: Some(join),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.cfg
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Connection attempts made so far.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Send one frame's records as a single batch.
    ///
    /// Returns `false` without queueing when not connected or when earlier
    /// frames are still waiting to go out. A failed write tears the session
    /// down; the supervisor then reconnects.
    pub fn send_frame(&self, records: &[TrackerRecord]) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        let text = match protocol::encode(records) {
            Ok(text) => text,
            Err(err) => {
                log::error!("failed to encode batch: {}", err);
                return false;
            }
        };
        let mut outbox = lock(&self.shared.outbox);
        let Some(sender) = outbox.as_ref() else {
            return false;
        };
        match sender.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("outbox to {} full; frame skipped", self.shared.cfg.endpoint);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                outbox.take();
                false
            }
        }
    }

    /// Drain queued events in arrival order.
    pub fn pump(&self) -> Vec<ClientEvent> {
        lock(&self.shared.events).drain(..).collect()
    }

    /// Drain queued events into `listener`, returning how many were handled.
    pub fn dispatch<L: TrackerListener + ?Sized>(&self, listener: &mut L) -> usize {
        let events = self.pump();
        for event in &events {
            match *event {
                ClientEvent::StateChanged(state) => listener.on_state_changed(state),
                ClientEvent::TrackerData(record) => listener.on_tracker_data(record),
                ClientEvent::DebugToggle => listener.on_debug_toggle(),
            }
        }
        events.len()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shared.release_outbox();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("client thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn supervise(shared: &Shared, shutdown: &AtomicBool) {
    let cfg = &shared.cfg;
    while !shutdown.load(Ordering::SeqCst) {
        shared.set_state(ConnectionState::Connecting);
        shared.attempts.fetch_add(1, Ordering::SeqCst);
        match connect(cfg) {
            Ok(stream) => {
                let outcome = run_session(shared, stream, shutdown);
                shared.release_outbox();
                match outcome {
                    Ok(()) => shared.set_state(ConnectionState::Closed),
                    Err(err) => {
                        log::warn!("connection to {} failed: {:#}", cfg.endpoint, err);
                        shared.set_state(ConnectionState::Errored);
                    }
                }
            }
            Err(err) => {
                log::warn!("connect to {} failed: {:#}", cfg.endpoint, err);
                shared.set_state(ConnectionState::Errored);
            }
        }
        shared.set_state(ConnectionState::Disconnected);
        wait(cfg.retry_interval, shutdown);
    }
}

fn connect(cfg: &ClientConfig) -> Result<TcpStream> {
    let addr = cfg.endpoint.resolve()?;
    let stream = TcpStream::connect_timeout(&addr, cfg.connect_timeout)
        .with_context(|| format!("failed to connect to {}", cfg.endpoint))?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(cfg.connect_timeout))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    Ok(stream)
}

/// Upgrade, register, publish the outbox, then service the socket until the
/// peer goes away.
fn run_session(shared: &Shared, stream: TcpStream, shutdown: &AtomicBool) -> Result<()> {
    let cfg = &shared.cfg;
    let url = cfg.endpoint.url();
    let (mut socket, _) =
        tungstenite::client::client_with_config(url.as_str(), stream, Some(socket_config()))
            .map_err(|e| anyhow!("websocket handshake with {} failed: {}", cfg.endpoint, e))?;
    socket.get_ref().set_read_timeout(Some(IO_POLL))?;
    send_text(&mut socket, &protocol::encode(&cfg.registration())?)
        .context("failed to send registration")?;

    let (outbox, queued) = mpsc::sync_channel(OUTBOX_DEPTH);
    *lock(&shared.outbox) = Some(outbox);
    shared.set_state(ConnectionState::Connected);

    let outcome = service(shared, &mut socket, &queued, shutdown);
    close_gracefully(&mut socket);
    outcome
}

fn service(
    shared: &Shared,
    socket: &mut WebSocket<TcpStream>,
    queued: &Receiver<String>,
    shutdown: &AtomicBool,
) -> Result<()> {
    while !shutdown.load(Ordering::SeqCst) {
        loop {
            match queued.try_recv() {
                Ok(frame) => send_text(socket, &frame).context("send failed")?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
        flush_pending(socket).context("send failed")?;
        match read_text(socket).context("read failed")? {
            Incoming::Text(text) => handle_inbound(shared, &text),
            Incoming::Idle => {}
            Incoming::Closed => {
                log::info!("{} closed the connection", shared.cfg.endpoint);
                return Ok(());
            }
        }
    }
    Ok(())
}

fn handle_inbound(shared: &Shared, text: &str) {
    if shared.cfg.role == Role::Emitter {
        log::debug!("ignoring frame sent to a tracker: {}", text);
        return;
    }
    match protocol::decode_record(text) {
        Ok(record) => {
            if let Some(event) = interpret_record(&shared.cfg, record) {
                if event == ClientEvent::DebugToggle {
                    log::info!("debug toggle received");
                }
                shared.push_event(event);
            }
        }
        Err(err) => log::warn!("ignoring frame from relay: {}", err),
    }
}

fn wait(interval: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + interval;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(WAIT_SLICE.min(deadline - now));
    }
}
