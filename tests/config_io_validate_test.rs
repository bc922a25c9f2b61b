use powerocean::config::{Config, HistoryFailurePolicy, MergePolicy, MqttChannel};
use std::fs;

fn valid() -> Config {
    let mut cfg = Config::default();
    cfg.credentials.access_key = "ak".to_string();
    cfg.credentials.secret_key = "sk".to_string();
    cfg.credentials.device_sn = "HJ31ZDH4ZF6N0123".to_string();
    cfg
}

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("powerocean.yaml");

    let mut cfg = valid();
    cfg.coordinator.merge_policy = MergePolicy::RestWins;
    cfg.coordinator.history_failure_policy = HistoryFailurePolicy::RetryNextTick;
    cfg.mqtt.channels = vec![MqttChannel::Quota, MqttChannel::Status];
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.credentials.device_sn, "HJ31ZDH4ZF6N0123");
    assert_eq!(loaded.coordinator.merge_policy, MergePolicy::RestWins);
    assert_eq!(
        loaded.coordinator.history_failure_policy,
        HistoryFailurePolicy::RetryNextTick
    );
    assert_eq!(loaded.mqtt.channels, cfg.mqtt.channels);
    assert_eq!(loaded.logging.file, cfg.logging.file);
    assert!(loaded.validate().is_ok());
}

#[test]
fn partial_yaml_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        "credentials:\n  access_key: ak\n  secret_key: sk\n  device_sn: SN1\n\
         coordinator:\n  merge_policy: rest_wins\n",
    )
    .unwrap();
    let cfg = Config::from_file(tmp.path()).unwrap();
    assert_eq!(cfg.coordinator.merge_policy, MergePolicy::RestWins);
    assert_eq!(cfg.coordinator.poll_interval_ms, 5_000);
    assert_eq!(cfg.api.base_url, "https://api-e.ecoflow.com");
}

#[test]
fn config_validation_errors() {
    let mut cfg = valid();
    cfg.credentials.secret_key = "  ".to_string();
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.api.request_timeout_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.coordinator.poll_interval_ms = 0;
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.coordinator.timezone = "Nowhere/Special".to_string();
    assert!(cfg.validate().is_err());

    cfg = valid();
    cfg.mqtt.enabled = true;
    cfg.mqtt.channels.clear();
    assert!(cfg.validate().is_err());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}

#[test]
fn missing_file_is_an_io_error() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(tmp_dir.path().join("absent.yaml")).unwrap_err();
    assert!(format!("{}", err).contains("I/O error"));
}
