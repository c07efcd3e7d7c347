//! WebSocket relay: accepts tracker and receiver connections and fans records out.
//!
//! One accept thread, one I/O thread per connection, and a single router
//! worker that owns the [`FrameRouter`] tables. Connection threads pass
//! inbound text to the worker over an mpsc channel. The worker hands each
//! outbound frame to its connection through a bounded outbox and never
//! touches a socket, so one slow receiver cannot stall routing for others.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{
    self, Receiver, RecvTimeoutError, Sender, SyncSender, TryRecvError, TrySendError,
};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tungstenite::WebSocket;

use crate::router::{ConnectionId, Delivery, FrameRouter, RouteReport};
use crate::transport::{
    close_gracefully, flush_pending, read_text, send_text, socket_config, Incoming,
};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const ROUTER_POLL: Duration = Duration::from_millis(100);
const IO_POLL: Duration = Duration::from_millis(10);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);
const STATS_TIMEOUT: Duration = Duration::from_secs(2);
/// Frames queued per connection before new ones are dropped.
const OUTBOX_DEPTH: usize = 256;

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub addr: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Snapshot of the router worker's tables and counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub connections: usize,
    pub emitters: usize,
    pub subscribers: usize,
    pub totals: RouteReport,
}

enum RouterCommand {
    Opened(ConnectionId, SyncSender<String>),
    Message(ConnectionId, String),
    Closed(ConnectionId),
    BroadcastDebug,
    Stats(Sender<RelayStats>),
    Shutdown,
}

#[derive(Debug)]
pub struct RelayHandle {
    pub addr: SocketAddr,
    commands: Sender<RouterCommand>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RelayHandle {
    /// Queue the debug sentinel for every connected receiver.
    pub fn broadcast_debug(&self) -> Result<()> {
        self.commands
            .send(RouterCommand::BroadcastDebug)
            .map_err(|_| anyhow!("relay router stopped"))
    }

    pub fn stats(&self) -> Result<RelayStats> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(RouterCommand::Stats(reply))
            .map_err(|_| anyhow!("relay router stopped"))?;
        response
            .recv_timeout(STATS_TIMEOUT)
            .map_err(|_| anyhow!("relay router did not answer"))
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("relay accept thread panicked"))?;
        }
        Ok(())
    }
}

pub struct RelayServer {
    cfg: RelayConfig,
}

impl RelayServer {
    pub fn new(cfg: RelayConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn(self) -> Result<RelayHandle> {
        let listener = TcpListener::bind(self.cfg.addr.as_str())
            .with_context(|| format!("failed to bind relay on {}", self.cfg.addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!("relay listening on {}", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let (commands, inbox) = mpsc::channel();

        let router_shutdown = shutdown.clone();
        let router = std::thread::spawn(move || run_router(inbox, router_shutdown));

        let accept_shutdown = shutdown.clone();
        let accept_commands = commands.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_accept(listener, accept_commands.clone(), accept_shutdown.clone())
            {
                log::error!("relay accept loop stopped: {}", err);
                accept_shutdown.store(true, Ordering::SeqCst);
            }
            let _ = accept_commands.send(RouterCommand::Shutdown);
            if router.join().is_err() {
                log::error!("relay router thread panicked");
            }
        });

        Ok(RelayHandle {
            addr,
            commands,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_accept(
    listener: TcpListener,
    commands: Sender<RouterCommand>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut next_id = 1u64;
    let mut connections: Vec<JoinHandle<()>> = Vec::new();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let id = ConnectionId(next_id);
                next_id += 1;
                log::debug!("{} accepted from {}", id, peer);
                let commands = commands.clone();
                let shutdown = shutdown.clone();
                connections.push(std::thread::spawn(move || {
                    if let Err(err) = serve_connection(id, stream, &commands, &shutdown) {
                        log::warn!("{} from {} dropped: {:#}", id, peer, err);
                    }
                }));
                connections.retain(|connection| !connection.is_finished());
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    for connection in connections {
        let _ = connection.join();
    }
    Ok(())
}

/// Upgrade one accepted stream and run it until either side goes away.
fn serve_connection(
    id: ConnectionId,
    stream: TcpStream,
    commands: &Sender<RouterCommand>,
    shutdown: &AtomicBool,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let mut socket = tungstenite::accept_with_config(stream, Some(socket_config()))
        .map_err(|e| anyhow!("websocket handshake failed: {}", e))?;
    socket.get_ref().set_read_timeout(Some(IO_POLL))?;

    let (outbox, queued) = mpsc::sync_channel(OUTBOX_DEPTH);
    commands
        .send(RouterCommand::Opened(id, outbox))
        .map_err(|_| anyhow!("relay router stopped"))?;

    let outcome = pump_connection(id, &mut socket, &queued, commands, shutdown);
    close_gracefully(&mut socket);
    let _ = commands.send(RouterCommand::Closed(id));
    outcome
}

/// Alternate between writing queued frames and reading one message.
fn pump_connection(
    id: ConnectionId,
    socket: &mut WebSocket<TcpStream>,
    queued: &Receiver<String>,
    commands: &Sender<RouterCommand>,
    shutdown: &AtomicBool,
) -> Result<()> {
    while !shutdown.load(Ordering::SeqCst) {
        loop {
            match queued.try_recv() {
                Ok(frame) => send_text(socket, &frame).context("write failed")?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
        flush_pending(socket).context("write failed")?;
        match read_text(socket).context("read failed")? {
            Incoming::Text(text) => {
                if commands.send(RouterCommand::Message(id, text)).is_err() {
                    return Ok(());
                }
            }
            Incoming::Idle => {}
            Incoming::Closed => {
                log::debug!("{} closed by peer", id);
                return Ok(());
            }
        }
    }
    Ok(())
}

fn run_router(inbox: Receiver<RouterCommand>, shutdown: Arc<AtomicBool>) {
    let mut router = FrameRouter::new();
    let mut outboxes: HashMap<ConnectionId, SyncSender<String>> = HashMap::new();
    let mut totals = RouteReport::default();

    loop {
        let command = match inbox.recv_timeout(ROUTER_POLL) {
            Ok(command) => command,
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        match command {
            RouterCommand::Opened(id, outbox) => {
                router.connection_opened(id);
                outboxes.insert(id, outbox);
            }
            RouterCommand::Message(id, text) => match router.handle_message(id, &text) {
                Ok(routing) => {
                    totals.delivered += routing.report.delivered;
                    totals.dropped += routing.report.dropped;
                    deliver(&mut router, &mut outboxes, routing.deliveries);
                }
                Err(err) => log::warn!("{} sent an unusable frame: {}", id, err),
            },
            RouterCommand::Closed(id) => {
                outboxes.remove(&id);
                router.connection_closed(id);
            }
            RouterCommand::BroadcastDebug => match router.broadcast_debug() {
                Ok(deliveries) => {
                    log::info!("broadcasting debug toggle to {} receiver(s)", deliveries.len());
                    deliver(&mut router, &mut outboxes, deliveries);
                }
                Err(err) => log::error!("debug broadcast failed: {}", err),
            },
            RouterCommand::Stats(reply) => {
                let _ = reply.send(RelayStats {
                    connections: outboxes.len(),
                    emitters: router.emitter_count(),
                    subscribers: router.subscriber_count(),
                    totals,
                });
            }
            RouterCommand::Shutdown => break,
        }
    }
    // Dropping the outboxes ends every connection thread.
    outboxes.clear();
}

/// Queue each delivery without blocking. A full outbox drops the frame; a
/// connection whose thread has exited is cleaned up.
fn deliver(
    router: &mut FrameRouter,
    outboxes: &mut HashMap<ConnectionId, SyncSender<String>>,
    deliveries: Vec<Delivery>,
) {
    let mut gone = Vec::new();
    for delivery in deliveries {
        let Some(outbox) = outboxes.get(&delivery.connection) else {
            continue;
        };
        match outbox.try_send(delivery.frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("{} is not keeping up; frame dropped", delivery.connection)
            }
            Err(TrySendError::Disconnected(_)) => gone.push(delivery.connection),
        }
    }
    for id in gone {
        if outboxes.remove(&id).is_some() {
            router.connection_closed(id);
        }
    }
}
