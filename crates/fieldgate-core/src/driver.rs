//! Protocol driver abstraction layer.
//!
//! This module provides the contract every protocol implementation must
//! satisfy, plus the table-driven registry that maps protocol identifier
//! strings to driver constructors. Adding a protocol means registering a
//! constructor; no dispatch code is edited.
//!
//! # Concurrency Contract
//!
//! None of the driver operations are invoked concurrently with themselves
//! on the same instance. This is enforced by the owning adapter's overload
//! guard, not by the driver: implementations may assume exclusive access
//! for the duration of each call.
//!
//! # Example
//!
//! ```rust,ignore
//! use fieldgate_core::driver::{DriverRegistry, DriverContext};
//!
//! let mut registry = DriverRegistry::new();
//! registry.register("simulator", fieldgate_core::simulator::constructor);
//!
//! let driver = registry.create(context)?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fieldgate_config::{ConfigError, DeviceConfig, TagConfig};

use crate::error::DriverError;
use crate::types::{TagId, TagSample, Value};

// =============================================================================
// PollOutcome
// =============================================================================

/// The result of one poll cycle.
///
/// Per-tag read failures never appear here: the driver logs them and emits
/// a null sample for the affected tag, so a single bad tag cannot abort the
/// rest of the cycle.
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    /// All samples produced this cycle, keyed by tag ID.
    pub samples: HashMap<TagId, TagSample>,

    /// The subset of tag IDs whose value changed past the deadband.
    pub changed: Vec<TagId>,
}

impl PollOutcome {
    /// Creates an empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sample, tracking it in the changed set when appropriate.
    pub fn push(&mut self, sample: TagSample) {
        if sample.changed {
            self.changed.push(sample.tag_id.clone());
        }
        self.samples.insert(sample.tag_id.clone(), sample);
    }

    /// Returns `true` if no samples were produced.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns `true` if any sample changed this cycle.
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }
}

// =============================================================================
// BrowseNode
// =============================================================================

/// One node of a driver's discoverable address space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseNode {
    /// Node identifier, usable as a tag address.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Whether the node contains children.
    pub container: bool,

    /// Data type of leaf nodes, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
}

impl BrowseNode {
    /// Creates a leaf node.
    pub fn leaf(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            container: false,
            data_type: None,
        }
    }

    /// Creates a container node.
    pub fn container(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            container: true,
            data_type: None,
        }
    }

    /// Sets the data type.
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }
}

// =============================================================================
// DeviceDriver Trait
// =============================================================================

/// The contract every protocol driver implements.
///
/// # Lifecycle
///
/// 1. Constructed via a registered [`DriverConstructor`]
/// 2. `connect()` establishes the session (bounded by the adapter's timeout)
/// 3. `poll()` runs once per poll tick while connected
/// 4. `write()` runs on demand between polls
/// 5. `disconnect()` tears the session down; safe to call from any state
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Returns the driver's display name (used in logs).
    fn name(&self) -> &str;

    /// Establishes a connection to the device.
    ///
    /// # Errors
    ///
    /// [`DriverError::ConnectionFailed`] or [`DriverError::Timeout`] when
    /// the session cannot be established. The adapter owns the resulting
    /// status transition and retry schedule.
    async fn connect(&mut self) -> Result<(), DriverError>;

    /// Closes the connection.
    ///
    /// Must be safe to call from any state and must clear driver-local
    /// value caches as a side effect.
    async fn disconnect(&mut self) -> Result<(), DriverError>;

    /// Returns `true` if currently connected.
    fn is_connected(&self) -> bool;

    /// Polls every configured tag once.
    ///
    /// For each tag: resolve a raw value, run it through the tag value
    /// pipeline, and record the sample. Per-tag failures are logged and
    /// yield null samples; only connection-level failures are returned.
    async fn poll(&mut self) -> Result<PollOutcome, DriverError>;

    /// Writes a value to a tag, running the inverse pipeline transform
    /// before sending. Returns whether the device acknowledged the write.
    async fn write(&mut self, tag_id: &TagId, value: Value) -> Result<bool, DriverError>;

    /// Returns `true` if the driver can take a new tag set without a
    /// reconnect. Drivers that return `false` are stop/start cycled on tag
    /// updates.
    fn supports_tag_reload(&self) -> bool {
        false
    }

    /// Applies a new tag set to a running driver.
    ///
    /// Only called when [`supports_tag_reload`](Self::supports_tag_reload)
    /// returns `true`.
    fn apply_tags(&mut self, tags: Vec<TagConfig>) {
        let _ = tags;
    }

    /// Browses the device's address space.
    ///
    /// `node` selects the subtree (`None` for the root). Only protocols
    /// with a discoverable address space implement this.
    async fn browse(&mut self, node: Option<&str>) -> Result<Vec<BrowseNode>, DriverError> {
        let _ = node;
        Err(DriverError::unsupported("browse"))
    }
}

// =============================================================================
// Construction Boundary
// =============================================================================

/// Resolves optional external protocol libraries by name.
///
/// Returns `None` if the dependency is unavailable; driver construction
/// then fails gracefully with a per-device error instead of crashing the
/// registry.
pub trait DependencyLoader: Send + Sync {
    /// Resolves a dependency by name.
    fn load(&self, name: &str) -> Option<Arc<dyn std::any::Any + Send + Sync>>;
}

/// A loader that resolves nothing; the default for gateways whose drivers
/// are all self-contained.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExternalDependencies;

impl DependencyLoader for NoExternalDependencies {
    fn load(&self, _name: &str) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        None
    }
}

/// Everything a driver constructor needs.
#[derive(Clone)]
pub struct DriverContext {
    /// The device configuration, including the opaque `property` bag.
    pub device: Arc<DeviceConfig>,

    /// Loader for optional external protocol libraries.
    pub deps: Arc<dyn DependencyLoader>,
}

impl DriverContext {
    /// Creates a context with no external dependencies.
    pub fn new(device: Arc<DeviceConfig>) -> Self {
        Self {
            device,
            deps: Arc::new(NoExternalDependencies),
        }
    }

    /// Creates a context with a dependency loader.
    pub fn with_deps(device: Arc<DeviceConfig>, deps: Arc<dyn DependencyLoader>) -> Self {
        Self { device, deps }
    }
}

impl fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverContext")
            .field("device", &self.device.id)
            .field("protocol", &self.device.protocol)
            .finish()
    }
}

/// A driver constructor.
///
/// Plain functions and closures both register; the registry stays a data
/// table either way: protocol identifier in, driver out.
pub type DriverConstructor =
    Arc<dyn Fn(DriverContext) -> Result<Box<dyn DeviceDriver>, ConfigError> + Send + Sync>;

// =============================================================================
// DriverRegistry
// =============================================================================

/// A table mapping protocol identifier strings to driver constructors.
///
/// Driver-type resolution is pure table lookup; adding a protocol requires
/// only registering a constructor, never editing existing dispatch logic.
#[derive(Default)]
pub struct DriverRegistry {
    constructors: HashMap<String, DriverConstructor>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for a protocol identifier.
    ///
    /// Registering the same identifier twice replaces the previous
    /// constructor.
    pub fn register<F>(&mut self, protocol: impl Into<String>, constructor: F)
    where
        F: Fn(DriverContext) -> Result<Box<dyn DeviceDriver>, ConfigError> + Send + Sync + 'static,
    {
        let protocol = protocol.into();
        tracing::debug!(protocol = %protocol, "Registered driver constructor");
        self.constructors.insert(protocol, Arc::new(constructor));
    }

    /// Creates a driver for the context's device.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownProtocol`] if no constructor is registered for
    /// the device's protocol type, or any error from the constructor
    /// itself.
    pub fn create(&self, context: DriverContext) -> Result<Box<dyn DeviceDriver>, ConfigError> {
        let protocol = context.device.protocol.clone();
        let constructor = self.constructors.get(&protocol).ok_or_else(|| {
            ConfigError::unknown_protocol(&context.device.id, &protocol)
        })?;
        constructor(context)
    }

    /// Returns the registered protocol identifiers.
    pub fn supported_protocols(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Returns `true` if a constructor is registered for the protocol.
    pub fn supports(&self, protocol: &str) -> bool {
        self.constructors.contains_key(protocol)
    }

    /// Returns the number of registered constructors.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns `true` if no constructors are registered.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("protocols", &self.supported_protocols())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
