//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration-related errors.
///
/// A configuration error is fatal only to the device it concerns: the
/// registry records the device as failed and continues loading the rest.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration document.
    #[error("Failed to parse config '{path}': {message}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Parser error message.
        message: String,
    },

    /// A field failed validation.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation (dotted path).
        field: String,
        /// Error message.
        message: String,
    },

    /// Required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// A numeric field is outside its permitted range.
    #[error("Value for '{field}' out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        /// The field (dotted path).
        field: String,
        /// The offending value.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },

    /// Duplicate device ID.
    #[error("Duplicate device ID: {device_id}")]
    DuplicateDeviceId {
        /// The duplicated device ID.
        device_id: String,
    },

    /// Duplicate tag ID within a device.
    #[error("Duplicate tag ID '{tag_id}' in device '{device_id}'")]
    DuplicateTagId {
        /// The owning device ID.
        device_id: String,
        /// The duplicated tag ID.
        tag_id: String,
    },

    /// No driver is registered for the device's protocol type.
    #[error("Unknown protocol type '{protocol}' for device '{device_id}'")]
    UnknownProtocol {
        /// The device ID.
        device_id: String,
        /// The unknown protocol identifier.
        protocol: String,
    },

    /// A required external dependency could not be resolved.
    #[error("Missing dependency '{name}' for device '{device_id}'")]
    MissingDependency {
        /// The device ID.
        device_id: String,
        /// The dependency name requested from the loader.
        name: String,
    },

    /// The protocol-specific property bag is malformed.
    #[error("Invalid properties for device '{device_id}': {message}")]
    InvalidProperty {
        /// The device ID.
        device_id: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an out-of-range error.
    pub fn out_of_range(field: impl Into<String>, value: u64, min: u64, max: u64) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value,
            min,
            max,
        }
    }

    /// Creates a duplicate device ID error.
    pub fn duplicate_device_id(device_id: impl Into<String>) -> Self {
        Self::DuplicateDeviceId {
            device_id: device_id.into(),
        }
    }

    /// Creates a duplicate tag ID error.
    pub fn duplicate_tag_id(device_id: impl Into<String>, tag_id: impl Into<String>) -> Self {
        Self::DuplicateTagId {
            device_id: device_id.into(),
            tag_id: tag_id.into(),
        }
    }

    /// Creates an unknown protocol error.
    pub fn unknown_protocol(device_id: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self::UnknownProtocol {
            device_id: device_id.into(),
            protocol: protocol.into(),
        }
    }

    /// Creates a missing dependency error.
    pub fn missing_dependency(device_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingDependency {
            device_id: device_id.into(),
            name: name.into(),
        }
    }

    /// Creates an invalid property error.
    pub fn invalid_property(device_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidProperty {
            device_id: device_id.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::validation("devices.plc-01.polling_ms", "cannot be zero");
        assert!(err.to_string().contains("devices.plc-01.polling_ms"));

        let err = ConfigError::duplicate_tag_id("plc-01", "temp");
        assert!(err.to_string().contains("plc-01"));
        assert!(err.to_string().contains("temp"));

        let err = ConfigError::unknown_protocol("plc-01", "dnp3");
        assert!(err.to_string().contains("dnp3"));
    }

    #[test]
    fn test_out_of_range() {
        let err = ConfigError::out_of_range("polling_ms", 5, 100, 3_600_000);
        let text = err.to_string();
        assert!(text.contains('5'));
        assert!(text.contains("100"));
    }
}
