//! Configuration integration tests: parsing, validation, and the contract
//! between the config schema and driver construction.

use std::io::Write as _;

use fieldgate_config::{load_config, parse_config, ConfigError};
use fieldgate_tests::common::fixtures::{gateway_config, GATEWAY_JSON};

#[test]
fn test_fixture_parses_and_validates() {
    let config = gateway_config();
    assert_eq!(config.gateway.id, "gw-test");
    assert_eq!(config.devices.len(), 2);

    let sim = config.get_device("sim-01").unwrap();
    assert_eq!(sim.protocol, "simulator");
    let level = sim.get_tag("level").unwrap();
    assert_eq!(level.format, Some(1));
    assert_eq!(level.scale.unwrap().raw_high, 4095.0);
    assert_eq!(level.deadband.unwrap().value, 1.0);
    assert!(level.daq.enabled);

    let ctl = config.get_device("ctl-01").unwrap();
    assert_eq!(ctl.protocol, "scriptlink");
    // The property bag stays opaque at this layer.
    assert_eq!(ctl.property["host"], "192.168.10.40");
}

#[test]
fn test_load_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(GATEWAY_JSON.as_bytes()).unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.devices.len(), 2);
}

#[test]
fn test_json_roundtrip_preserves_config() {
    let config = gateway_config();
    let rendered = serde_json::to_string(&config).unwrap();
    let reparsed = parse_config(&rendered).unwrap();
    assert_eq!(config, reparsed);
}

#[test]
fn test_duplicate_device_rejected() {
    let raw = GATEWAY_JSON.replace("ctl-01", "sim-01");
    assert!(matches!(
        parse_config(&raw),
        Err(ConfigError::DuplicateDeviceId { .. })
    ));
}

#[test]
fn test_tag_key_id_mismatch_rejected() {
    let raw = GATEWAY_JSON.replace(r#""id": "speed""#, r#""id": "velocity""#);
    assert!(matches!(
        parse_config(&raw),
        Err(ConfigError::Validation { .. })
    ));
}

#[test]
fn test_polling_interval_bounds() {
    let raw = GATEWAY_JSON.replace(r#""polling_ms": 500"#, r#""polling_ms": 5"#);
    assert!(matches!(
        parse_config(&raw),
        Err(ConfigError::OutOfRange { .. })
    ));
}

#[test]
fn test_unknown_field_rejected() {
    let raw = GATEWAY_JSON.replace(
        r#""gateway": { "id": "gw-test""#,
        r#""gateway": { "mystery": 1, "id": "gw-test""#,
    );
    assert!(matches!(parse_config(&raw), Err(ConfigError::Parse { .. })));
}

#[test]
fn test_scriptlink_property_contract() {
    // The driver layer, not the config layer, owns property validation.
    let config = gateway_config();
    let ctl = config.get_device("ctl-01").unwrap();

    let parsed =
        fieldgate_scriptlink::ScriptLinkConfig::from_property(&ctl.id, &ctl.property).unwrap();
    assert_eq!(parsed.endpoint(), "192.168.10.40:9300");
    assert!(parsed.expect_greeting);

    let bad = serde_json::json!({ "port": 1 });
    assert!(matches!(
        fieldgate_scriptlink::ScriptLinkConfig::from_property("ctl-01", &bad),
        Err(ConfigError::InvalidProperty { .. })
    ));
}
