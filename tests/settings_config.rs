use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use tracker_relay::config::{EmitterSettings, ReceiverSettings, RelaySettings};
use tracker_relay::transport::Endpoint;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "RELAY_CONFIG",
        "RELAY_LISTEN_ADDR",
        "TRACKER_CONFIG",
        "TRACKER_SERVER_ADDR",
        "TRACKER_ID",
        "TRACKER_ZONE_CAPACITY",
        "TRACKER_ZONES_DIR",
        "RECEIVER_CONFIG",
        "RECEIVER_SERVER_ADDR",
        "RECEIVER_ID",
        "RECEIVER_FLIPX",
        "RECEIVER_FLIPY",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn missing_config_files_mean_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let relay = RelaySettings::load().expect("relay defaults");
    assert_eq!(relay.listen, Endpoint::new("127.0.0.1", 8080));
    assert_eq!(relay.relay_config().addr, "127.0.0.1:8080");

    let emitter = EmitterSettings::load().expect("emitter defaults");
    assert_eq!(emitter.server, Endpoint::new("localhost", 8080));
    assert_eq!(emitter.id, 1);
    assert_eq!(emitter.zone_capacity, 4);
    assert_eq!(emitter.zone_file_path(), PathBuf::from("./areas1.json"));

    let receiver = ReceiverSettings::load().expect("receiver defaults");
    assert_eq!(receiver.id, 1);
    assert!(!receiver.flip_x);
    assert!(!receiver.flip_y);
    assert_eq!(receiver.retry_interval, Duration::from_secs(5));
}

#[test]
fn loads_emitter_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        r#"{
            "tracker_server_ip_address": "10.0.0.5",
            "tracker_server_port": 9001,
            "id": 2,
            "zone_capacity": 6,
            "zones_dir": "/tmp/zones",
            "retry_interval_secs": 2
        }"#,
    );
    std::env::set_var("TRACKER_CONFIG", file.path());
    std::env::set_var("TRACKER_ID", "5");
    std::env::set_var("TRACKER_ZONES_DIR", "/srv/zones");

    let cfg = EmitterSettings::load().expect("load config");
    assert_eq!(cfg.server, Endpoint::new("10.0.0.5", 9001));
    assert_eq!(cfg.id, 5);
    assert_eq!(cfg.zone_capacity, 6);
    assert_eq!(cfg.retry_interval, Duration::from_secs(2));
    assert_eq!(cfg.zone_file_path(), PathBuf::from("/srv/zones/areas5.json"));

    let client = cfg.client_config();
    assert_eq!(client.id, 5);
    assert_eq!(client.retry_interval, Duration::from_secs(2));

    clear_env();
}

#[test]
fn loads_receiver_config_with_flip_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        r#"{"server_ip_address":"relay.local","server_port":8081,"id":3,"flipx":true}"#,
    );
    std::env::set_var("RECEIVER_CONFIG", file.path());
    std::env::set_var("RECEIVER_FLIPY", "yes");
    std::env::set_var("RECEIVER_SERVER_ADDR", "ws://127.0.0.1:9100");

    let cfg = ReceiverSettings::load().expect("load config");
    assert_eq!(cfg.server, Endpoint::new("127.0.0.1", 9100));
    assert_eq!(cfg.id, 3);
    assert!(cfg.flip_x);
    assert!(cfg.flip_y);
    let client = cfg.client_config();
    assert!(client.flip_x && client.flip_y);

    clear_env();
}

#[test]
fn relay_config_uses_server_address_and_port() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(r#"{"serverAddress":"0.0.0.0","serverPort":9200}"#);
    std::env::set_var("RELAY_CONFIG", file.path());
    let cfg = RelaySettings::load().expect("load config");
    assert_eq!(cfg.relay_config().addr, "0.0.0.0:9200");

    std::env::set_var("RELAY_LISTEN_ADDR", "127.0.0.1:0");
    let cfg = RelaySettings::load().expect("load config");
    assert_eq!(cfg.listen, Endpoint::new("127.0.0.1", 0));

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("TRACKER_ZONE_CAPACITY", "0");
    assert!(EmitterSettings::load().is_err());
    std::env::set_var("TRACKER_ZONE_CAPACITY", "lots");
    assert!(EmitterSettings::load().is_err());
    clear_env();

    std::env::set_var("RECEIVER_FLIPX", "sideways");
    assert!(ReceiverSettings::load().is_err());
    clear_env();

    let file = config_file("{not json");
    std::env::set_var("RELAY_CONFIG", file.path());
    assert!(RelaySettings::load().is_err());
    std::env::set_var("RELAY_CONFIG", "/nonexistent/relay.json");
    assert!(RelaySettings::load().is_err());

    clear_env();
}
