//! ScriptLink configuration and wire constants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use fieldgate_config::ConfigError;

// =============================================================================
// Wire Constants
// =============================================================================

/// Frame start marker.
pub const FRAME_MARKER: u8 = 0xAA;

/// Fixed header length: marker, service, sequence, u32 big-endian length.
pub const HEADER_LEN: usize = 7;

/// Trailing checksum length.
pub const CHECKSUM_LEN: usize = 1;

/// Hard maximum payload length, validated before any buffer allocation.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

/// Service identifiers understood by ScriptLink controllers.
pub mod service {
    /// Request the controller's full state script.
    pub const STATE_REQUEST: u8 = 0x01;
    /// State script response.
    pub const STATE_RESPONSE: u8 = 0x81;
    /// Write a value by dotted path.
    pub const WRITE_REQUEST: u8 = 0x02;
    /// Write acknowledgement (1-byte payload, 0x01 on success).
    pub const WRITE_ACK: u8 = 0x82;
}

// =============================================================================
// ScriptLinkConfig
// =============================================================================

fn default_port() -> u16 {
    9300
}

fn default_request_timeout_ms() -> u64 {
    3000
}

fn default_greeting_timeout_ms() -> u64 {
    500
}

fn default_state_roots() -> Vec<String> {
    vec!["Device".to_string()]
}

fn default_max_state_depth() -> usize {
    10
}

/// Connection settings for one ScriptLink controller.
///
/// Parsed from the device's opaque `property` bag; the core never looks
/// inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptLinkConfig {
    /// Controller hostname or IP address.
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Whether the controller sends an unsolicited greeting line after
    /// accept. The client waits for it up to the grace period either way.
    #[serde(default)]
    pub expect_greeting: bool,

    /// Grace period for the greeting line in milliseconds.
    #[serde(default = "default_greeting_timeout_ms")]
    pub greeting_timeout_ms: u64,

    /// Names of the script globals read back as the state tree.
    #[serde(default = "default_state_roots")]
    pub state_roots: Vec<String>,

    /// Maximum depth of the extracted state tree.
    #[serde(default = "default_max_state_depth")]
    pub max_state_depth: usize,
}

impl ScriptLinkConfig {
    /// Creates a config for the given endpoint with defaults elsewhere.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            request_timeout_ms: default_request_timeout_ms(),
            expect_greeting: false,
            greeting_timeout_ms: default_greeting_timeout_ms(),
            state_roots: default_state_roots(),
            max_state_depth: default_max_state_depth(),
        }
    }

    /// Parses the config from a device's `property` bag.
    pub fn from_property(
        device_id: &str,
        property: &serde_json::Value,
    ) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(property.clone())
            .map_err(|e| ConfigError::invalid_property(device_id, e.to_string()))?;
        if config.host.is_empty() {
            return Err(ConfigError::invalid_property(device_id, "host cannot be empty"));
        }
        if config.max_state_depth == 0 {
            return Err(ConfigError::invalid_property(
                device_id,
                "max_state_depth cannot be zero",
            ));
        }
        Ok(config)
    }

    /// Returns the request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the greeting grace period.
    pub fn greeting_timeout(&self) -> Duration {
        Duration::from_millis(self.greeting_timeout_ms)
    }

    /// Returns the `host:port` endpoint string.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Tests
// =============================================================================
