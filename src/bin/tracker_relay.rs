//! tracker_relay - id-routed relay between trackers and receivers
//!
//! This daemon:
//! 1. Accepts tracker and receiver connections
//! 2. Forwards each tracker record to the receiver registered for its channel
//! 3. Broadcasts the debug toggle when `d` is entered on stdin

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead};
use std::sync::mpsc;

use tracker_relay::config::RelaySettings;
use tracker_relay::server::RelayServer;
use tracker_relay::transport::Endpoint;

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay tracker records to receivers by channel id")]
struct Args {
    /// Listen address (`host:port` or `ws://host:port`); overrides the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Ignore stdin instead of reading operator commands.
    #[arg(long)]
    no_console: bool,
}

enum Signal {
    Shutdown,
    DebugToggle,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut settings = RelaySettings::load()?;
    if let Some(listen) = args.listen.as_deref() {
        settings.listen = Endpoint::parse(listen)?;
    }

    let handle = RelayServer::new(settings.relay_config()).spawn()?;
    log::info!("tracker_relay running on {}", handle.addr);

    let (tx, rx) = mpsc::channel();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Signal::Shutdown);
    })
    .context("error setting Ctrl-C handler")?;

    if !args.no_console {
        std::thread::spawn(move || read_console(&tx));
        log::info!("enter 'd' to toggle debug on every receiver; Ctrl-C to stop");
    }

    serve_signals(&rx, || handle.broadcast_debug());

    log::info!("stopping relay...");
    handle.stop()
}

/// Act on operator signals until shutdown. A failed toggle also ends the
/// loop so the caller still stops the relay.
fn serve_signals<F: FnMut() -> Result<()>>(rx: &mpsc::Receiver<Signal>, mut toggle_debug: F) {
    while let Ok(signal) = rx.recv() {
        match signal {
            Signal::DebugToggle => {
                if let Err(err) = toggle_debug() {
                    log::error!("debug toggle failed, shutting down: {:#}", err);
                    break;
                }
            }
            Signal::Shutdown => break,
        }
    }
}

fn read_console(tx: &mpsc::Sender<Signal>) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::warn!("console read failed: {}", err);
                return;
            }
        };
        match line.trim() {
            "" => {}
            "d" | "D" => {
                if tx.send(Signal::DebugToggle).is_err() {
                    return;
                }
            }
            other => log::warn!("unknown console command '{}'", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn toggles_until_shutdown() {
        let (tx, rx) = mpsc::channel();
        tx.send(Signal::DebugToggle).unwrap();
        tx.send(Signal::DebugToggle).unwrap();
        tx.send(Signal::Shutdown).unwrap();
        tx.send(Signal::DebugToggle).unwrap();

        let mut toggles = 0;
        serve_signals(&rx, || {
            toggles += 1;
            Ok(())
        });
        assert_eq!(toggles, 2);
    }

    #[test]
    fn failed_toggle_returns_so_the_relay_is_stopped() {
        let (tx, rx) = mpsc::channel();
        tx.send(Signal::DebugToggle).unwrap();
        tx.send(Signal::DebugToggle).unwrap();

        let mut toggles = 0;
        serve_signals(&rx, || {
            toggles += 1;
            Err(anyhow!("relay router stopped"))
        });
        assert_eq!(toggles, 1);
        assert!(matches!(rx.try_recv(), Ok(Signal::DebugToggle)));
    }
}
