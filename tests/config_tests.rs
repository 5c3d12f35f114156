// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use kinect_bridge::backends::{BridgeType, SecondOpenPolicy};
use kinect_bridge::{AppError, Config};

#[test]
fn test_config_default() {
    // Test that default config can be created
    let config = Config::default();

    // Check sensible defaults
    assert_eq!(
        config.backend,
        BridgeType::Emulated,
        "The emulator should be the default bridge"
    );
    assert!(config.emulator.sensor_attached);
    assert!(config.audio_buffer_size > 0);
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.open_retry.max_attempts = 3;
    config.emulator.second_open = SecondOpenPolicy::Refuse;
    config.emulator.frame_rate = Some(15);
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config, "Saved config should load back unchanged");
}

#[test]
fn test_config_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "emulator": { "tracked_bodies": 3 } }"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.emulator.tracked_bodies, 3);
    assert!(config.emulator.sensor_attached);
    assert_eq!(config.open_retry, Config::default().open_retry);
}

#[test]
fn test_config_malformed_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    match Config::load_from(&path) {
        Err(AppError::Config(msg)) => {
            assert!(msg.contains("config.json"), "Error should name the file")
        }
        other => panic!("Expected a configuration error, got {:?}", other),
    }
}
