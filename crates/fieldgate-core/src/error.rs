//! Unified error hierarchy for FieldGate.
//!
//! # Error Hierarchy
//!
//! ```text
//! GatewayError (root)
//! ├── ConfigError    - Configuration parsing and validation (fieldgate-config)
//! ├── DriverError    - Protocol driver operations
//! ├── PipelineError  - Tag value transformation
//! ├── BusError       - Event bus operations
//! └── HistoryError   - History sink operations
//! ```
//!
//! Retryability drives the reconnect supervisor: connection-level failures
//! are retryable, configuration and type errors are not.
//!
//! # Examples
//!
//! ```
//! use fieldgate_core::error::DriverError;
//! use std::time::Duration;
//!
//! let error = DriverError::timeout(Duration::from_secs(5));
//! assert!(error.is_retryable());
//! ```

use std::time::Duration;
use thiserror::Error;

pub use fieldgate_config::ConfigError;

// =============================================================================
// GatewayError - Root Error Type
// =============================================================================

/// The root error type for FieldGate.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Protocol driver error.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Tag value pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Event bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// History sink error.
    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

impl GatewayError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Driver(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns the error category as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config",
            GatewayError::Driver(_) => "driver",
            GatewayError::Pipeline(_) => "pipeline",
            GatewayError::Bus(_) => "bus",
            GatewayError::History(_) => "history",
        }
    }
}

// =============================================================================
// DriverError
// =============================================================================

/// Protocol driver errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Connection failed (refused, unreachable, handshake failure).
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// The timeout duration.
        duration: Duration,
    },

    /// Device is not connected.
    #[error("Device is not connected")]
    NotConnected,

    /// Protocol-level failure: frame desync, oversize length, checksum
    /// mismatch, malformed response. Recovered by forcing a reconnect.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },

    /// A single tag read failed; isolated to that tag within a poll cycle.
    #[error("Read failed for '{address}': {message}")]
    ReadFailed {
        /// The address that failed.
        address: String,
        /// Error message.
        message: String,
    },

    /// Write operation failed.
    #[error("Write failed for '{address}': {message}")]
    WriteFailed {
        /// The address that failed.
        address: String,
        /// Error message.
        message: String,
    },

    /// The adapter's overload guard rejected the operation.
    #[error("Device is busy: a previous operation is still in flight")]
    Busy,

    /// The requested operation is not supported by this driver.
    #[error("Operation not supported: {operation}")]
    Unsupported {
        /// The operation name.
        operation: String,
    },

    /// Tag not found in the device configuration.
    #[error("Tag not found: {tag_id}")]
    TagNotFound {
        /// The tag ID.
        tag_id: String,
    },

    /// Device not found in the registry.
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// The device ID.
        device_id: String,
    },
}

impl DriverError {
    /// Creates a connection failure error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection failure error with a source.
    pub fn connection_failed_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a read failure error.
    pub fn read_failed(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReadFailed {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates a write failure error.
    pub fn write_failed(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Creates a tag-not-found error.
    pub fn tag_not_found(tag_id: impl Into<String>) -> Self {
        Self::TagNotFound {
            tag_id: tag_id.into(),
        }
    }

    /// Creates a device-not-found error.
    pub fn device_not_found(device_id: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device_id: device_id.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    ///
    /// Retryable errors cause the adapter to transition to `Error` and
    /// re-attempt the connection on the supervisory period. Non-retryable
    /// errors are surfaced to the caller without a reconnect.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionFailed { .. }
                | DriverError::Timeout { .. }
                | DriverError::NotConnected
                | DriverError::Protocol { .. }
                | DriverError::Busy
        )
    }

    /// Returns `true` if this error must force a reconnect.
    pub fn forces_reconnect(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionFailed { .. }
                | DriverError::NotConnected
                | DriverError::Protocol { .. }
        )
    }

    /// Returns the error category as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            DriverError::ConnectionFailed { .. } => "connection_failed",
            DriverError::Timeout { .. } => "timeout",
            DriverError::NotConnected => "not_connected",
            DriverError::Protocol { .. } => "protocol",
            DriverError::ReadFailed { .. } => "read_failed",
            DriverError::WriteFailed { .. } => "write_failed",
            DriverError::Busy => "busy",
            DriverError::Unsupported { .. } => "unsupported",
            DriverError::TagNotFound { .. } => "tag_not_found",
            DriverError::DeviceNotFound { .. } => "device_not_found",
        }
    }
}

// =============================================================================
// PipelineError
// =============================================================================

/// Tag value pipeline errors.
///
/// The pipeline never coerces between numeric and string shapes; a mismatch
/// is surfaced to the caller and isolated to the offending tag.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The raw value's type does not match what the transform requires.
    #[error("Type mismatch for tag '{tag_id}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The tag ID.
        tag_id: String,
        /// The expected type name.
        expected: &'static str,
        /// The actual type name.
        actual: &'static str,
    },

    /// A scaling transform was requested for a non-numeric value.
    #[error("Cannot scale non-numeric value for tag '{tag_id}' ({actual})")]
    NotNumeric {
        /// The tag ID.
        tag_id: String,
        /// The actual type name.
        actual: &'static str,
    },
}

impl PipelineError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(
        tag_id: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            tag_id: tag_id.into(),
            expected,
            actual,
        }
    }

    /// Creates a not-numeric error.
    pub fn not_numeric(tag_id: impl Into<String>, actual: &'static str) -> Self {
        Self::NotNumeric {
            tag_id: tag_id.into(),
            actual,
        }
    }
}

// =============================================================================
// BusError
// =============================================================================

/// Event bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// The subscriber lagged behind and missed events.
    #[error("Subscriber lagged, {missed} events dropped")]
    Lagged {
        /// Number of missed events.
        missed: u64,
    },

    /// The bus has been closed.
    #[error("Event bus closed")]
    Closed,
}

// =============================================================================
// HistoryError
// =============================================================================

/// History sink errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Writing samples to the sink failed.
    #[error("History write failed: {message}")]
    Write {
        /// Error message.
        message: String,
    },
}

impl HistoryError {
    /// Creates a write error.
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write {
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DriverError::timeout(Duration::from_secs(5)).is_retryable());
        assert!(DriverError::connection_failed("refused").is_retryable());
        assert!(DriverError::protocol("desync").is_retryable());
        assert!(DriverError::Busy.is_retryable());

        assert!(!DriverError::unsupported("browse").is_retryable());
        assert!(!DriverError::tag_not_found("t1").is_retryable());
        assert!(!DriverError::read_failed("a", "boom").is_retryable());
    }

    #[test]
    fn test_forces_reconnect() {
        assert!(DriverError::protocol("oversize frame").forces_reconnect());
        assert!(DriverError::NotConnected.forces_reconnect());
        // A timed-out request leaves the socket open; reconnect only after
        // repeated failures, decided by the adapter.
        assert!(!DriverError::timeout(Duration::from_secs(1)).forces_reconnect());
    }

    #[test]
    fn test_root_error_conversion() {
        let err: GatewayError = DriverError::NotConnected.into();
        assert!(err.is_retryable());
        assert_eq!(err.error_type(), "driver");

        let err: GatewayError = PipelineError::not_numeric("t1", "string").into();
        assert!(!err.is_retryable());
        assert_eq!(err.error_type(), "pipeline");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::type_mismatch("flow", "float", "string");
        let text = err.to_string();
        assert!(text.contains("flow"));
        assert!(text.contains("float"));
        assert!(text.contains("string"));
    }
}
