use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{ClientConfig, DEFAULT_RETRY_INTERVAL};
use crate::server::RelayConfig;
use crate::transport::Endpoint;
use crate::zone::DEFAULT_CAPACITY;

const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
const DEFAULT_SERVER_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ID: i32 = 1;
const DEFAULT_ZONES_DIR: &str = ".";

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RelayConfigFile {
    server_address: Option<String>,
    server_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct EmitterConfigFile {
    tracker_server_ip_address: Option<String>,
    tracker_server_port: Option<u16>,
    id: Option<i32>,
    zone_capacity: Option<usize>,
    zones_dir: Option<PathBuf>,
    retry_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ReceiverConfigFile {
    server_ip_address: Option<String>,
    server_port: Option<u16>,
    id: Option<i32>,
    flipx: Option<bool>,
    flipy: Option<bool>,
    retry_interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub listen: Endpoint,
}

impl RelaySettings {
    /// Settings from `RELAY_CONFIG` (if set) and `RELAY_LISTEN_ADDR`.
    pub fn load() -> Result<Self> {
        let path = std::env::var("RELAY_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file: RelayConfigFile = match path {
            Some(path) => read_config_file(path)?,
            None => RelayConfigFile::default(),
        };
        let mut cfg = Self {
            listen: Endpoint::new(
                file.server_address
                    .unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string()),
                file.server_port.unwrap_or(DEFAULT_PORT),
            ),
        };
        if let Some(addr) = env_value("RELAY_LISTEN_ADDR") {
            cfg.listen = Endpoint::parse(&addr)
                .map_err(|e| anyhow!("RELAY_LISTEN_ADDR is invalid: {}", e))?;
        }
        Ok(cfg)
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            addr: self.listen.authority(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmitterSettings {
    pub server: Endpoint,
    pub id: i32,
    pub zone_capacity: usize,
    pub zones_dir: PathBuf,
    pub retry_interval: Duration,
}

impl EmitterSettings {
    /// Settings from `TRACKER_CONFIG` (if set) and the `TRACKER_*` overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("TRACKER_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file: EmitterConfigFile = match path {
            Some(path) => read_config_file(path)?,
            None => EmitterConfigFile::default(),
        };
        let mut cfg = Self::from_file(file);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EmitterConfigFile) -> Self {
        Self {
            server: Endpoint::new(
                file.tracker_server_ip_address
                    .unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                file.tracker_server_port.unwrap_or(DEFAULT_PORT),
            ),
            id: file.id.unwrap_or(DEFAULT_ID),
            zone_capacity: file.zone_capacity.unwrap_or(DEFAULT_CAPACITY),
            zones_dir: file
                .zones_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ZONES_DIR)),
            retry_interval: file
                .retry_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_INTERVAL),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("TRACKER_SERVER_ADDR") {
            self.server = Endpoint::parse(&addr)
                .map_err(|e| anyhow!("TRACKER_SERVER_ADDR is invalid: {}", e))?;
        }
        if let Some(id) = env_value("TRACKER_ID") {
            self.id = id
                .parse()
                .map_err(|_| anyhow!("TRACKER_ID must be an integer"))?;
        }
        if let Some(capacity) = env_value("TRACKER_ZONE_CAPACITY") {
            self.zone_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("TRACKER_ZONE_CAPACITY must be a positive integer"))?;
        }
        if let Some(dir) = env_value("TRACKER_ZONES_DIR") {
            self.zones_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.zone_capacity == 0 {
            return Err(anyhow!("zone capacity must be greater than zero"));
        }
        if self.retry_interval.is_zero() {
            return Err(anyhow!("retry interval must be greater than zero"));
        }
        Ok(())
    }

    /// `<zones_dir>/areas<id>.json`
    pub fn zone_file_path(&self) -> PathBuf {
        self.zones_dir.join(format!("areas{}.json", self.id))
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::emitter(self.server.clone(), self.id);
        cfg.retry_interval = self.retry_interval;
        cfg
    }
}

#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub server: Endpoint,
    pub id: i32,
    pub flip_x: bool,
    pub flip_y: bool,
    pub retry_interval: Duration,
}

impl ReceiverSettings {
    /// Settings from `RECEIVER_CONFIG` (if set) and the `RECEIVER_*` overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("RECEIVER_CONFIG").ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file: ReceiverConfigFile = match path {
            Some(path) => read_config_file(path)?,
            None => ReceiverConfigFile::default(),
        };
        let mut cfg = Self {
            server: Endpoint::new(
                file.server_ip_address
                    .unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                file.server_port.unwrap_or(DEFAULT_PORT),
            ),
            id: file.id.unwrap_or(DEFAULT_ID),
            flip_x: file.flipx.unwrap_or(false),
            flip_y: file.flipy.unwrap_or(false),
            retry_interval: file
                .retry_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_INTERVAL),
        };
        cfg.apply_env()?;
        if cfg.retry_interval.is_zero() {
            return Err(anyhow!("retry interval must be greater than zero"));
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("RECEIVER_SERVER_ADDR") {
            self.server = Endpoint::parse(&addr)
                .map_err(|e| anyhow!("RECEIVER_SERVER_ADDR is invalid: {}", e))?;
        }
        if let Some(id) = env_value("RECEIVER_ID") {
            self.id = id
                .parse()
                .map_err(|_| anyhow!("RECEIVER_ID must be an integer"))?;
        }
        if let Some(flip) = env_value("RECEIVER_FLIPX") {
            self.flip_x = parse_flag("RECEIVER_FLIPX", &flip)?;
        }
        if let Some(flip) = env_value("RECEIVER_FLIPY") {
            self.flip_y = parse_flag("RECEIVER_FLIPY", &flip)?;
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::subscriber(self.server.clone(), self.id);
        cfg.flip_x = self.flip_x;
        cfg.flip_y = self.flip_y;
        cfg.retry_interval = self.retry_interval;
        cfg
    }
}

fn read_config_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be true or false", key)),
    }
}
