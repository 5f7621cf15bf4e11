use std::io::Write;

use field_coordinator::config::{CoordinatorConfig, PathPolicy};
use field_coordinator::CoordinatorError;
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(text.as_bytes()).expect("write config");
    file
}

#[test]
fn test_load_yaml_file() {
    let file = write_config(
        r#"
port:
  baud_rate: 57600
network:
  pan_id: 0x1234
  channel: 15
  tx_power_dbm: -2
valve:
  close_above: 80
  open_below: 10
  path: direct
transmit:
  retry: false
"#,
    );

    let config = CoordinatorConfig::load(file.path()).unwrap();
    assert_eq!(config.port.baud_rate, 57600);
    assert_eq!(config.port.max_line, 220);
    assert_eq!(config.network.pan_id, 0x1234);
    assert_eq!(config.network.channel, 15);
    assert_eq!(config.network.tx_power_dbm, -2);
    assert_eq!(config.valve.path, PathPolicy::Direct);
    assert_eq!(config.valve.close_above, 80);
    assert!(config.transmit.ack_request);
    assert!(!config.transmit.retry);
}

#[test]
fn test_empty_file_gives_defaults() {
    let file = write_config("");
    let config = CoordinatorConfig::load(file.path()).unwrap();
    assert_eq!(config.network, CoordinatorConfig::default().network);
    assert_eq!(config.timing, CoordinatorConfig::default().timing);
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = write_config("network:\n  channel: 30\n");
    assert!(matches!(
        CoordinatorConfig::load(file.path()),
        Err(CoordinatorError::ConfigError(_))
    ));

    let file = write_config("valve:\n  close_above: 5\n  open_below: 5\n");
    assert!(CoordinatorConfig::load(file.path()).is_err());
}

#[test]
fn test_malformed_yaml_is_an_error() {
    let file = write_config("network: [unclosed\n");
    assert!(matches!(
        CoordinatorConfig::load(file.path()),
        Err(CoordinatorError::YamlError(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let result = CoordinatorConfig::load(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(CoordinatorError::IoError(_))));
}
