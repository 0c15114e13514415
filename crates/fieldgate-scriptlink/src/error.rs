//! ScriptLink error types and mapping into the core driver error.

use std::time::Duration;
use thiserror::Error;

use fieldgate_core::DriverError;

/// Convenience result alias for ScriptLink operations.
pub type ScriptLinkResult<T> = Result<T, ScriptLinkError>;

/// Errors raised by the ScriptLink client, extractor, and driver.
#[derive(Debug, Error)]
pub enum ScriptLinkError {
    /// Socket-level I/O failure.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: std::io::Error,
    },

    /// The peer closed the connection.
    #[error("Connection closed by peer")]
    Closed,

    /// Not connected.
    #[error("Not connected")]
    NotConnected,

    /// A request did not complete within its timeout. The socket stays
    /// open; reconnect policy belongs to the adapter.
    #[error("Request timed out after {duration:?}")]
    Timeout {
        /// The request timeout.
        duration: Duration,
    },

    /// The receive stream lost frame alignment.
    #[error("Stream desynchronized: {reason}")]
    Desync {
        /// What broke the framing.
        reason: String,
    },

    /// A frame declared a length beyond the hard maximum. Rejected before
    /// any buffer allocation.
    #[error("Frame length {length} exceeds maximum {max}")]
    Oversize {
        /// The declared payload length.
        length: usize,
        /// The hard maximum.
        max: usize,
    },

    /// Frame checksum mismatch.
    #[error("Frame checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum {
        /// Checksum computed over the received bytes.
        expected: u8,
        /// Checksum carried by the frame.
        actual: u8,
    },

    /// The script interpreter could not be initialized. Hard error: the
    /// connection is unusable.
    #[error("Script interpreter initialization failed: {message}")]
    ScriptInit {
        /// Error message.
        message: String,
    },

    /// Script execution failed. Tolerated: extraction proceeds with
    /// whatever state the script populated before failing.
    #[error("Script execution failed: {message}")]
    ScriptExec {
        /// Error message.
        message: String,
    },

    /// A tag address does not parse under the dotted-path grammar.
    #[error("Invalid address '{address}': {message}")]
    InvalidAddress {
        /// The offending address.
        address: String,
        /// Why it failed to parse.
        message: String,
    },
}

impl ScriptLinkError {
    /// Creates a desync error.
    pub fn desync(reason: impl Into<String>) -> Self {
        Self::Desync {
            reason: reason.into(),
        }
    }

    /// Creates a script init error.
    pub fn script_init(message: impl Into<String>) -> Self {
        Self::ScriptInit {
            message: message.into(),
        }
    }

    /// Creates a script execution error.
    pub fn script_exec(message: impl Into<String>) -> Self {
        Self::ScriptExec {
            message: message.into(),
        }
    }

    /// Creates an invalid address error.
    pub fn invalid_address(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the error indicates lost frame alignment and the
    /// receive buffer was reset.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::Desync { .. } | Self::Oversize { .. } | Self::Checksum { .. }
        )
    }
}

impl From<ScriptLinkError> for DriverError {
    fn from(e: ScriptLinkError) -> Self {
        match e {
            ScriptLinkError::Io { source } => {
                DriverError::connection_failed_with("socket error", source)
            }
            ScriptLinkError::Closed => DriverError::connection_failed("connection closed by peer"),
            ScriptLinkError::NotConnected => DriverError::NotConnected,
            ScriptLinkError::Timeout { duration } => DriverError::timeout(duration),
            e @ (ScriptLinkError::Desync { .. }
            | ScriptLinkError::Oversize { .. }
            | ScriptLinkError::Checksum { .. }) => DriverError::protocol(e.to_string()),
            ScriptLinkError::ScriptInit { message } => DriverError::connection_failed(format!(
                "script interpreter initialization failed: {}",
                message
            )),
            ScriptLinkError::ScriptExec { message } => DriverError::protocol(message),
            ScriptLinkError::InvalidAddress { address, message } => {
                DriverError::read_failed(address, message)
            }
        }
    }
}
