//! Fluent builders for device and tag configurations.

use std::collections::HashMap;

use fieldgate_config::{DaqConfig, DeviceConfig, ScaleConfig, TagConfig};

// =============================================================================
// DeviceConfigBuilder
// =============================================================================

/// Builder for [`DeviceConfig`] with test-friendly defaults.
#[derive(Debug, Clone)]
pub struct DeviceConfigBuilder {
    id: String,
    name: Option<String>,
    protocol: String,
    enabled: bool,
    polling_ms: u64,
    timeout_ms: u64,
    property: serde_json::Value,
    tags: HashMap<String, TagConfig>,
}

impl DeviceConfigBuilder {
    /// Creates a builder for a device of the given protocol.
    pub fn new(id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            protocol: protocol.into(),
            enabled: true,
            polling_ms: 100,
            timeout_ms: 1000,
            property: serde_json::Value::Null,
            tags: HashMap::new(),
        }
    }

    /// Sets the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the enabled flag.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the poll interval in milliseconds.
    pub fn polling_ms(mut self, polling_ms: u64) -> Self {
        self.polling_ms = polling_ms;
        self
    }

    /// Sets the request timeout in milliseconds.
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the protocol property bag.
    pub fn property(mut self, property: serde_json::Value) -> Self {
        self.property = property;
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: TagConfig) -> Self {
        self.tags.insert(tag.id.clone(), tag);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DeviceConfig {
        DeviceConfig {
            name: self.name.unwrap_or_else(|| format!("Device {}", self.id)),
            id: self.id,
            protocol: self.protocol,
            enabled: self.enabled,
            polling_ms: self.polling_ms,
            timeout_ms: self.timeout_ms,
            property: self.property,
            tags: self.tags,
        }
    }
}

// =============================================================================
// TagConfigBuilder
// =============================================================================

/// Builder for [`TagConfig`].
#[derive(Debug, Clone)]
pub struct TagConfigBuilder {
    tag: TagConfig,
}

impl TagConfigBuilder {
    /// Creates a builder for a tag with the given id and address.
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            tag: TagConfig::new(id, address),
        }
    }

    /// Sets the linear scaling window.
    pub fn scale(mut self, raw_low: f64, raw_high: f64, scaled_low: f64, scaled_high: f64) -> Self {
        self.tag = self
            .tag
            .with_scale(ScaleConfig::new(raw_low, raw_high, scaled_low, scaled_high));
        self
    }

    /// Sets the deadband.
    pub fn deadband(mut self, value: f64) -> Self {
        self.tag = self.tag.with_deadband(value);
        self
    }

    /// Sets the decimal precision.
    pub fn format(mut self, decimals: u8) -> Self {
        self.tag = self.tag.with_format(decimals);
        self
    }

    /// Enables DAQ with the given policy.
    pub fn daq(mut self, only_on_change: bool, interval_s: u64) -> Self {
        self.tag = self.tag.with_daq(DaqConfig {
            enabled: true,
            changed: only_on_change,
            interval_s,
        });
        self
    }

    /// Builds the tag.
    pub fn build(self) -> TagConfig {
        self.tag
    }
}
