//! Canned configurations for integration tests.

use fieldgate_config::{DeviceConfig, GatewayConfig};

use super::builders::{DeviceConfigBuilder, TagConfigBuilder};

/// A complete gateway configuration document, as it would sit on disk.
pub const GATEWAY_JSON: &str = r#"{
    "gateway": { "id": "gw-test", "name": "Test Gateway" },
    "devices": [
        {
            "id": "sim-01",
            "name": "Line Simulator",
            "type": "simulator",
            "polling_ms": 500,
            "tags": {
                "level": {
                    "id": "level",
                    "name": "Tank Level",
                    "address": "ramp:0:4095",
                    "format": 1,
                    "scale": {
                        "raw_low": 0.0, "raw_high": 4095.0,
                        "scaled_low": 0.0, "scaled_high": 100.0
                    },
                    "deadband": { "value": 1.0 },
                    "daq": { "enabled": true, "changed": true, "interval_s": 60 }
                }
            }
        },
        {
            "id": "ctl-01",
            "name": "Packager Controller",
            "type": "scriptlink",
            "polling_ms": 1000,
            "timeout_ms": 2000,
            "property": {
                "host": "192.168.10.40",
                "port": 9300,
                "expect_greeting": true,
                "state_roots": ["Device"]
            },
            "tags": {
                "speed": { "id": "speed", "address": "Device.drive.speed" }
            }
        }
    ],
    "logging": { "level": "info", "format": "text" }
}"#;

/// Device fixtures.
pub struct DeviceFixtures;

impl DeviceFixtures {
    /// The canonical scaled device: raw 0..4095 onto 0..100 with a 1.0
    /// deadband, one decimal of precision, and change-gated DAQ.
    pub fn scaled_simulator(id: &str) -> DeviceConfig {
        DeviceConfigBuilder::new(id, "simulator")
            .tag(
                TagConfigBuilder::new("level", "static:2048")
                    .scale(0.0, 4095.0, 0.0, 100.0)
                    .format(1)
                    .deadband(1.0)
                    .daq(true, 60)
                    .build(),
            )
            .build()
    }

    /// A minimal one-tag mock device.
    pub fn mock(id: &str, protocol: &str) -> DeviceConfig {
        DeviceConfigBuilder::new(id, protocol)
            .tag(TagConfigBuilder::new("t1", "addr-1").build())
            .build()
    }
}

/// Parses [`GATEWAY_JSON`] into a validated configuration.
pub fn gateway_config() -> GatewayConfig {
    fieldgate_config::parse_config(GATEWAY_JSON).expect("fixture must be valid")
}
