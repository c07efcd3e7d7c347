//! zone_admin - inspect and edit a tracker's zone file.
//!
//! Every mutating command saves the file before exiting.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

use tracker_relay::config::EmitterSettings;
use tracker_relay::geometry::Point;
use tracker_relay::zone::ZONE_VERTICES;
use tracker_relay::{classify, LoadSource, ZoneStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and edit tracker zone files")]
struct Args {
    /// Zone file to edit; defaults to `<zones_dir>/areas<id>.json` from the tracker config.
    #[arg(long, env = "TRACKER_ZONES_FILE")]
    file: Option<PathBuf>,

    /// Number of zone slots.
    #[arg(long)]
    capacity: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every slot as one JSON line.
    List,
    /// Fill the next empty slot with four corners (`x,y` each) bound to a channel.
    Define {
        #[arg(long, allow_negative_numbers = true)]
        custom_id: i32,
        #[arg(num_args = 4, value_parser = parse_point, required = true)]
        corners: Vec<Point>,
    },
    /// Reset a zone by index, or the first zone containing `--at x,y`.
    Clear {
        #[arg(conflicts_with = "at", required_unless_present = "at")]
        index: Option<usize>,
        #[arg(long, value_parser = parse_point)]
        at: Option<Point>,
    },
    /// Show which zone contains a point and the records it would produce.
    Locate {
        #[arg(value_parser = parse_point)]
        point: Point,
    },
}

fn parse_point(value: &str) -> Result<Point> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("expected x,y, got '{}'", value))?;
    let x: f32 = x.trim().parse().context("invalid x coordinate")?;
    let y: f32 = y.trim().parse().context("invalid y coordinate")?;
    Ok(Point::new(x, y))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = EmitterSettings::load()?;
    let path = args.file.unwrap_or_else(|| settings.zone_file_path());
    let capacity = args.capacity.unwrap_or(settings.zone_capacity);
    if capacity == 0 {
        return Err(anyhow!("capacity must be greater than zero"));
    }

    let (mut store, source) = ZoneStore::open(&path, capacity);
    if let LoadSource::Recovered { reason } = &source {
        if !matches!(args.command, Command::List | Command::Locate { .. }) {
            return Err(anyhow!(
                "refusing to overwrite unreadable zone file {}: {}",
                path.display(),
                reason
            ));
        }
    }

    match args.command {
        Command::List => {
            for zone in store.zones() {
                let rect = zone.bounding_rect();
                println!(
                    "{}",
                    json!({
                        "id": zone.id(),
                        "customId": zone.custom_id(),
                        "color": format!("{:?}", zone.color()),
                        "vertices": zone.vertices(),
                        "complete": zone.is_complete(),
                        "normalizedRect": rect,
                    })
                );
            }
        }
        Command::Define { custom_id, corners } => {
            let corners: [Point; ZONE_VERTICES] = corners
                .try_into()
                .map_err(|_| anyhow!("exactly {} corners are required", ZONE_VERTICES))?;
            let index = store.define_zone(custom_id, corners)?;
            store.save()?;
            println!("{}", json!({"defined": index, "customId": custom_id}));
        }
        Command::Clear { index, at } => {
            let index = match (index, at) {
                (Some(index), _) => index,
                (None, Some(point)) => store
                    .zone_at(point)
                    .ok_or_else(|| anyhow!("no zone contains ({}, {})", point.x, point.y))?,
                (None, None) => return Err(anyhow!("a zone index or --at is required")),
            };
            store.clear(index)?;
            store.save()?;
            println!("{}", json!({"cleared": index}));
        }
        Command::Locate { point } => {
            let records = classify(point, store.zones());
            println!(
                "{}",
                json!({"zone": store.zone_at(point), "records": records})
            );
        }
    }
    Ok(())
}
