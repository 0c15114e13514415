//! Configuration schema definitions for FieldGate.
//!
//! # Schema Structure
//!
//! ```text
//! GatewayConfig
//! ├── gateway: GatewayInfo
//! ├── devices: Vec<DeviceConfig>
//! │             ├── property: opaque JSON bag (driver-interpreted)
//! │             └── tags: map<tag id, TagConfig>
//! └── logging: LoggingConfig
//! ```

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Default poll interval in milliseconds.
pub const DEFAULT_POLLING_MS: u64 = 1000;

/// Default connect/request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Minimum poll interval in milliseconds.
pub const MIN_POLLING_MS: u64 = 100;

/// Maximum poll interval in milliseconds (1 hour).
pub const MAX_POLLING_MS: u64 = 3_600_000;

/// Default DAQ persistence interval in seconds.
pub const DEFAULT_DAQ_INTERVAL_S: u64 = 60;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for a FieldGate instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway identification.
    pub gateway: GatewayInfo,

    /// Device configurations.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Validates the entire configuration.
    ///
    /// Checks gateway identity, device uniqueness, and every nested device
    /// and tag definition. The first failure is returned; a failing device
    /// definition here prevents loading, while driver-level failures later
    /// are isolated per device.
    pub fn validate(&self) -> ConfigResult<()> {
        self.gateway.validate()?;

        let mut device_ids = std::collections::HashSet::new();
        for device in &self.devices {
            if !device_ids.insert(&device.id) {
                return Err(ConfigError::duplicate_device_id(&device.id));
            }
            device.validate()?;
        }

        Ok(())
    }

    /// Returns a device configuration by ID.
    pub fn get_device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == device_id)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayInfo::default(),
            devices: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

// =============================================================================
// Gateway Identity
// =============================================================================

/// Gateway identification and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayInfo {
    /// Unique gateway identifier.
    pub id: String,

    /// Human-readable gateway name.
    #[serde(default = "default_gateway_name")]
    pub name: String,
}

fn default_gateway_name() -> String {
    "FieldGate".to_string()
}

impl GatewayInfo {
    /// Validates the gateway identity.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.id.is_empty() {
            return Err(ConfigError::validation("gateway.id", "cannot be empty"));
        }
        if self.id.len() > 64 {
            return Err(ConfigError::validation(
                "gateway.id",
                "cannot exceed 64 characters",
            ));
        }
        Ok(())
    }
}

impl Default for GatewayInfo {
    fn default() -> Self {
        Self {
            id: "fieldgate-01".to_string(),
            name: default_gateway_name(),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for a single device.
///
/// The `property` bag is an opaque JSON value interpreted only by the driver
/// selected through `protocol`. Tags are keyed by tag ID; insertion order is
/// irrelevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Unique device identifier.
    pub id: String,

    /// Human-readable device name.
    pub name: String,

    /// Protocol identifier resolved against the driver registry.
    #[serde(rename = "type")]
    pub protocol: String,

    /// Whether the device participates in polling.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Polling interval in milliseconds.
    #[serde(default = "default_polling")]
    pub polling_ms: u64,

    /// Connect/request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Protocol-specific settings (address, port, credentials, ...).
    #[serde(default)]
    pub property: serde_json::Value,

    /// Tag definitions keyed by tag ID.
    #[serde(default)]
    pub tags: HashMap<String, TagConfig>,
}

fn default_enabled() -> bool {
    true
}

fn default_polling() -> u64 {
    DEFAULT_POLLING_MS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl DeviceConfig {
    /// Validates the device configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.id.is_empty() {
            return Err(ConfigError::validation("device.id", "cannot be empty"));
        }
        if self.name.is_empty() {
            return Err(ConfigError::validation(
                format!("devices.{}.name", self.id),
                "cannot be empty",
            ));
        }
        if self.protocol.is_empty() {
            return Err(ConfigError::validation(
                format!("devices.{}.type", self.id),
                "cannot be empty",
            ));
        }
        if self.polling_ms < MIN_POLLING_MS || self.polling_ms > MAX_POLLING_MS {
            return Err(ConfigError::out_of_range(
                format!("devices.{}.polling_ms", self.id),
                self.polling_ms,
                MIN_POLLING_MS,
                MAX_POLLING_MS,
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::validation(
                format!("devices.{}.timeout_ms", self.id),
                "cannot be zero",
            ));
        }

        for (key, tag) in &self.tags {
            if key != &tag.id {
                return Err(ConfigError::validation(
                    format!("devices.{}.tags.{}", self.id, key),
                    format!("key does not match tag id '{}'", tag.id),
                ));
            }
            tag.validate(&self.id)?;
        }

        Ok(())
    }

    /// Returns a tag configuration by ID.
    pub fn get_tag(&self, tag_id: &str) -> Option<&TagConfig> {
        self.tags.get(tag_id)
    }

    /// Returns the poll interval as a `Duration`.
    pub fn polling(&self) -> Duration {
        Duration::from_millis(self.polling_ms)
    }

    /// Returns the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// =============================================================================
// Tag Configuration
// =============================================================================

/// Configuration for a single tag (data point).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagConfig {
    /// Unique tag identifier within the device.
    pub id: String,

    /// Human-readable tag name.
    #[serde(default)]
    pub name: String,

    /// Protocol-specific address, interpreted only by the owning driver.
    pub address: String,

    /// Declared value type (informational; drivers may ignore it).
    #[serde(default)]
    pub data_type: Option<String>,

    /// Decimal precision for composed values.
    #[serde(default)]
    pub format: Option<u8>,

    /// Linear raw-to-engineering scaling window.
    #[serde(default)]
    pub scale: Option<ScaleConfig>,

    /// Minimum delta for a sample to count as changed.
    #[serde(default)]
    pub deadband: Option<DeadbandConfig>,

    /// Data-acquisition (history) settings.
    #[serde(default)]
    pub daq: DaqConfig,
}

impl TagConfig {
    /// Creates a minimal tag with an id and address.
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            address: address.into(),
            data_type: None,
            format: None,
            scale: None,
            deadband: None,
            daq: DaqConfig::default(),
        }
    }

    /// Sets the scaling window.
    pub fn with_scale(mut self, scale: ScaleConfig) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Sets the deadband.
    pub fn with_deadband(mut self, value: f64) -> Self {
        self.deadband = Some(DeadbandConfig { value });
        self
    }

    /// Sets the decimal precision.
    pub fn with_format(mut self, decimals: u8) -> Self {
        self.format = Some(decimals);
        self
    }

    /// Sets the DAQ settings.
    pub fn with_daq(mut self, daq: DaqConfig) -> Self {
        self.daq = daq;
        self
    }

    /// Validates the tag configuration.
    pub fn validate(&self, device_id: &str) -> ConfigResult<()> {
        if self.id.is_empty() {
            return Err(ConfigError::validation(
                format!("devices.{}.tags.id", device_id),
                "cannot be empty",
            ));
        }
        if self.address.is_empty() {
            return Err(ConfigError::validation(
                format!("devices.{}.tags.{}.address", device_id, self.id),
                "cannot be empty",
            ));
        }
        if let Some(scale) = &self.scale {
            scale.validate(device_id, &self.id)?;
        }
        if let Some(deadband) = &self.deadband {
            if !deadband.value.is_finite() || deadband.value < 0.0 {
                return Err(ConfigError::validation(
                    format!("devices.{}.tags.{}.deadband.value", device_id, self.id),
                    "must be a non-negative number",
                ));
            }
        }
        if self.daq.enabled && self.daq.interval_s == 0 {
            return Err(ConfigError::validation(
                format!("devices.{}.tags.{}.daq.interval_s", device_id, self.id),
                "cannot be zero when DAQ is enabled",
            ));
        }
        Ok(())
    }
}

/// Linear scaling window mapping a raw range onto an engineering range.
///
/// A degenerate window (`raw_low == raw_high`) is accepted by validation;
/// the pipeline skips scaling for it rather than dividing by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleConfig {
    /// Raw range lower bound.
    pub raw_low: f64,
    /// Raw range upper bound.
    pub raw_high: f64,
    /// Scaled range lower bound.
    pub scaled_low: f64,
    /// Scaled range upper bound.
    pub scaled_high: f64,
}

impl ScaleConfig {
    /// Creates a scaling window.
    pub fn new(raw_low: f64, raw_high: f64, scaled_low: f64, scaled_high: f64) -> Self {
        Self {
            raw_low,
            raw_high,
            scaled_low,
            scaled_high,
        }
    }

    /// Validates the scaling window.
    pub fn validate(&self, device_id: &str, tag_id: &str) -> ConfigResult<()> {
        for (field, value) in [
            ("raw_low", self.raw_low),
            ("raw_high", self.raw_high),
            ("scaled_low", self.scaled_low),
            ("scaled_high", self.scaled_high),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::validation(
                    format!("devices.{}.tags.{}.scale.{}", device_id, tag_id, field),
                    "must be a finite number",
                ));
            }
        }
        Ok(())
    }

    /// Returns the raw range width.
    pub fn raw_width(&self) -> f64 {
        self.raw_high - self.raw_low
    }

    /// Returns the scaled range width.
    pub fn scaled_width(&self) -> f64 {
        self.scaled_high - self.scaled_low
    }
}

/// Deadband configuration: the minimum absolute delta for a sample to count
/// as changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeadbandConfig {
    /// Minimum absolute delta.
    pub value: f64,
}

/// Data-acquisition settings controlling selective history persistence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaqConfig {
    /// Whether samples of this tag are eligible for history.
    #[serde(default)]
    pub enabled: bool,

    /// Persist only on change; unchanged samples are still persisted once
    /// `interval_s` has elapsed since the last write.
    #[serde(default = "default_daq_changed")]
    pub changed: bool,

    /// Minimum persistence interval in seconds.
    #[serde(default = "default_daq_interval")]
    pub interval_s: u64,
}

fn default_daq_changed() -> bool {
    true
}

fn default_daq_interval() -> u64 {
    DEFAULT_DAQ_INTERVAL_S
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            changed: default_daq_changed(),
            interval_s: default_daq_interval(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for log aggregation.
    Json,
    /// Minimal single-line output.
    Compact,
}

// =============================================================================
// Tests
// =============================================================================
