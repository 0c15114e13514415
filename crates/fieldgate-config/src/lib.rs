//! # fieldgate-config
//!
//! Configuration schema, loading, and validation for the FieldGate gateway.
//!
//! Device and tag definitions arrive as JSON documents. The schema keeps the
//! protocol-specific `property` bag opaque: only the driver selected by the
//! device's `type` field interprets it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldgate_config::load_config;
//!
//! let config = load_config("gateway.json")?;
//! for device in &config.devices {
//!     println!("{} ({})", device.name, device.protocol);
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, parse_config};
pub use schema::{
    DaqConfig, DeadbandConfig, DeviceConfig, GatewayConfig, GatewayInfo, LogFormat, LoggingConfig,
    ScaleConfig, TagConfig,
};
