//! tracker_receiver - print the records the relay forwards for one channel.
//!
//! Each tracker data event is written to stdout as one JSON line. The debug
//! sentinel toggles debug mode, which is logged.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracker_relay::config::ReceiverSettings;
use tracker_relay::transport::Endpoint;
use tracker_relay::{ChannelClient, ConnectionState, TrackerListener, TrackerRecord};

const PUMP_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Receive zone-local tracker records for one channel")]
struct Args {
    /// Relay address (`ws://host:port` or `host:port`); overrides the config file.
    #[arg(long)]
    server: Option<String>,

    /// Channel id to register for.
    #[arg(long)]
    id: Option<i32>,

    /// Mirror x (x := 1 - x).
    #[arg(long)]
    flipx: bool,

    /// Mirror y (y := 1 - y).
    #[arg(long)]
    flipy: bool,

    /// Map coordinates onto a screen of WIDTHxHEIGHT pixels.
    #[arg(long, value_parser = parse_screen)]
    screen: Option<Screen>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Screen {
    width: u32,
    height: u32,
}

impl Screen {
    /// Pixel position for zone-local coordinates, rounded to two decimals first.
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (
            round2(x) * self.width as f32,
            round2(y) * self.height as f32,
        )
    }
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

fn parse_screen(value: &str) -> Result<Screen> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: u32 = width.trim().parse().context("invalid screen width")?;
    let height: u32 = height.trim().parse().context("invalid screen height")?;
    if width == 0 || height == 0 {
        return Err(anyhow!("screen dimensions must be non-zero"));
    }
    Ok(Screen { width, height })
}

struct Console {
    screen: Option<Screen>,
    debug: bool,
}

impl TrackerListener for Console {
    fn on_tracker_data(&mut self, record: TrackerRecord) {
        let line = match self.screen {
            Some(screen) => {
                let (px, py) = screen.map(record.x, record.y);
                json!({"id": record.channel_id, "x": record.x, "y": record.y, "px": px, "py": py})
            }
            None => json!({"id": record.channel_id, "x": record.x, "y": record.y}),
        };
        println!("{}", line);
    }

    fn on_debug_toggle(&mut self) {
        self.debug = !self.debug;
        log::info!("debug mode {}", if self.debug { "on" } else { "off" });
    }

    fn on_state_changed(&mut self, state: ConnectionState) {
        if state == ConnectionState::Connected {
            log::info!("registered with relay");
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = ReceiverSettings::load()?;
    if let Some(server) = args.server.as_deref() {
        settings.server = Endpoint::parse(server)?;
    }
    if let Some(id) = args.id {
        settings.id = id;
    }
    settings.flip_x |= args.flipx;
    settings.flip_y |= args.flipy;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let client = ChannelClient::spawn(settings.client_config())?;
    log::info!(
        "tracker_receiver {} connecting to {}",
        client.config().id,
        client.config().endpoint
    );

    let mut console = Console {
        screen: args.screen,
        debug: false,
    };
    while running.load(Ordering::SeqCst) {
        client.dispatch(&mut console);
        std::thread::sleep(PUMP_INTERVAL);
    }

    log::info!("shutdown signal received, stopping receiver...");
    client.stop()
}
