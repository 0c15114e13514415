//! Configuration file loading.
//!
//! Device and tag definitions are JSON documents. Loading always validates:
//! a configuration that parses but fails validation is rejected as a whole.

use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::GatewayConfig;

/// Loads and validates a gateway configuration from a JSON file.
///
/// # Errors
///
/// - [`ConfigError::Io`] if the file cannot be read
/// - [`ConfigError::Parse`] if the document is not valid JSON for the schema
/// - any validation error from [`GatewayConfig::validate`]
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: GatewayConfig =
        serde_json::from_str(&raw).map_err(|e| ConfigError::parse(path, e.to_string()))?;

    config.validate()?;

    debug!(
        path = %path.display(),
        devices = config.devices.len(),
        "Loaded gateway configuration"
    );

    Ok(config)
}

/// Parses and validates a gateway configuration from a JSON string.
pub fn parse_config(raw: &str) -> ConfigResult<GatewayConfig> {
    let config: GatewayConfig =
        serde_json::from_str(raw).map_err(|e| ConfigError::parse("<inline>", e.to_string()))?;
    config.validate()?;
    Ok(config)
}
