use anyhow::{anyhow, Result};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};
use tungstenite::{Message, WebSocket};

use tracker_relay::transport::Endpoint;
use tracker_relay::{ChannelClient, ClientConfig, ClientEvent, ConnectionState};

const RETRY: Duration = Duration::from_millis(300);

fn accept_within(listener: &TcpListener, wait: Duration) -> Result<WebSocket<TcpStream>> {
    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + wait;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                stream.set_read_timeout(Some(Duration::from_secs(3)))?;
                return tungstenite::accept(stream)
                    .map_err(|e| anyhow!("handshake failed: {}", e));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() > deadline {
                    return Err(anyhow!("client never connected"));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn read_registration(socket: &mut WebSocket<TcpStream>) -> Result<String> {
    match socket.read()? {
        Message::Text(text) => Ok(text),
        other => Err(anyhow!("expected a registration, got {:?}", other)),
    }
}

fn states(events: &[ClientEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

#[test]
fn reconnects_after_one_interval_and_registers_again() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let mut cfg = ClientConfig::subscriber(Endpoint::new("127.0.0.1", port), 4);
    cfg.retry_interval = RETRY;
    let client = ChannelClient::spawn(cfg)?;

    let mut first = accept_within(&listener, Duration::from_secs(3))?;
    assert_eq!(read_registration(&mut first)?, r#"{"type":"trackerreceiver","id":4}"#);

    let dropped_at = Instant::now();
    drop(first);

    let mut second = accept_within(&listener, Duration::from_secs(5))?;
    let elapsed = dropped_at.elapsed();
    assert!(elapsed >= RETRY, "reconnected after {:?}", elapsed);
    assert_eq!(read_registration(&mut second)?, r#"{"type":"trackerreceiver","id":4}"#);
    assert_eq!(client.connect_attempts(), 2);

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut events = Vec::new();
    while Instant::now() < deadline {
        events.extend(client.pump());
        if states(&events).len() >= 6 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(
        states(&events),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Closed,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );

    client.stop()
}

#[test]
fn unreachable_relay_is_retried_at_a_fixed_pace() -> Result<()> {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };
    let mut cfg = ClientConfig::emitter(Endpoint::new("127.0.0.1", port), 1);
    cfg.retry_interval = Duration::from_millis(200);
    let client = ChannelClient::spawn(cfg)?;

    let started = Instant::now();
    std::thread::sleep(Duration::from_millis(700));
    let attempts = client.connect_attempts();
    let ceiling = 1 + started.elapsed().as_millis() as u64 / 200;
    assert!(attempts >= 2, "only {} attempts", attempts);
    assert!(attempts <= ceiling, "{} attempts exceeds {}", attempts, ceiling);
    assert_ne!(client.state(), ConnectionState::Connected);

    let events = client.pump();
    let connecting = states(&events)
        .into_iter()
        .filter(|state| *state == ConnectionState::Connecting)
        .count() as u64;
    assert!(connecting <= attempts);

    client.stop()
}

#[test]
fn send_after_peer_loss_fails_and_recovers() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let mut cfg = ClientConfig::emitter(Endpoint::new("127.0.0.1", port), 2);
    cfg.retry_interval = RETRY;
    let client = ChannelClient::spawn(cfg)?;

    let mut first = accept_within(&listener, Duration::from_secs(3))?;
    read_registration(&mut first)?;
    drop(first);

    let deadline = Instant::now() + Duration::from_secs(3);
    while client.state() == ConnectionState::Connected && Instant::now() < deadline {
        client.send_frame(&[]);
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_ne!(client.state(), ConnectionState::Connected);
    assert!(!client.send_frame(&[]));

    let mut second = accept_within(&listener, Duration::from_secs(5))?;
    assert_eq!(read_registration(&mut second)?, r#"{"type":"tracker","id":2}"#);

    client.stop()
}
