//! tracker_emitter - classify detection frames and stream them to the relay.
//!
//! Reads one frame per stdin line as a JSON array of normalized points,
//! e.g. `[{"x":0.31,"y":0.42},{"x":0.8,"y":0.1}]`, classifies it against
//! the tracker's zone file, and sends the resulting batch when connected.

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;

use tracker_relay::config::EmitterSettings;
use tracker_relay::geometry::Point;
use tracker_relay::transport::Endpoint;
use tracker_relay::{ChannelClient, LoadSource, TrackerEmitter, ZoneStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream zone-classified detections to the tracker relay")]
struct Args {
    /// Relay address (`ws://host:port` or `host:port`); overrides the config file.
    #[arg(long)]
    server: Option<String>,

    /// Tracker id; also selects the zone file `areas<id>.json`.
    #[arg(long)]
    id: Option<i32>,

    /// Directory holding zone files.
    #[arg(long)]
    zones_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = EmitterSettings::load()?;
    if let Some(server) = args.server.as_deref() {
        settings.server = Endpoint::parse(server)?;
    }
    if let Some(id) = args.id {
        settings.id = id;
    }
    if let Some(dir) = args.zones_dir {
        settings.zones_dir = dir;
    }

    let (store, source) = ZoneStore::open(settings.zone_file_path(), settings.zone_capacity);
    if let LoadSource::Recovered { reason } = &source {
        log::warn!("starting with empty zones: {}", reason);
    }

    let client = ChannelClient::spawn(settings.client_config())?;
    let emitter = TrackerEmitter::new(store, client);
    log::info!(
        "tracker {} has {} complete zone(s) of {}, relay {}",
        settings.id,
        emitter.store().complete_count(),
        emitter.store().capacity(),
        emitter.client().config().endpoint
    );

    let stdin = io::stdin();
    for (index, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let points: Vec<Point> = match serde_json::from_str(&line) {
            Ok(points) => points,
            Err(err) => {
                log::warn!("frame {} rejected: {}", index + 1, err);
                continue;
            }
        };
        let outcome = emitter.process_frame(&points);
        log::debug!(
            "frame {}: {} detection(s) -> {} record(s), sent={}",
            index + 1,
            points.len(),
            outcome.records.len(),
            outcome.sent
        );
    }

    log::info!(
        "input closed, stopping tracker {} after {} connection attempt(s)",
        settings.id,
        emitter.client().connect_attempts()
    );
    emitter.stop()
}
