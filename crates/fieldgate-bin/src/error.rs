//! Binary-level error types.

use thiserror::Error;

/// Convenience result alias for the binary crate.
pub type BinResult<T> = Result<T, BinError>;

/// Errors surfaced by the gateway binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A component failed to initialize.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A runtime failure forced the gateway down.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl BinError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BinError::Configuration(_) => 2,
            BinError::Initialization(_) => 3,
            BinError::Runtime(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::Configuration("x".into()).exit_code(), 2);
        assert_eq!(BinError::Initialization("x".into()).exit_code(), 3);
        assert_eq!(BinError::Runtime("x".into()).exit_code(), 1);
    }
}
