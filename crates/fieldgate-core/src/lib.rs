//! # fieldgate-core
//!
//! Core device-communication runtime for the FieldGate gateway.
//!
//! This crate provides the foundational types and machinery shared by all
//! FieldGate components:
//!
//! - **Types**: `DeviceId`, `TagId`, `Value`, `TagSample`, `DeviceStatus`
//! - **Error**: unified error hierarchy with retryability classification
//! - **Pipeline**: raw-to-engineering value transformation and history gating
//! - **Driver**: the protocol driver contract and the table-driven registry
//! - **Adapter**: per-device lifecycle state machine with overload protection
//! - **Registry**: the authoritative device set and event fan-out
//! - **Events**: broadcast bus for status and value events
//! - **History**: the history-sink boundary and gating forwarder
//! - **Simulator**: built-in waveform driver for commissioning and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldgate_core::{DeviceRegistry, MemoryHistorySink, simulator};
//! use std::sync::Arc;
//!
//! let registry = DeviceRegistry::new(Arc::new(MemoryHistorySink::default()));
//! registry.register_driver("simulator", simulator::constructor);
//! registry.load(configs);
//! registry.start_all();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod pipeline;
pub mod types;

// =============================================================================
// Driver & Lifecycle Modules
// =============================================================================

pub mod adapter;
pub mod driver;
pub mod registry;
pub mod simulator;

// =============================================================================
// Event & History Modules
// =============================================================================

pub mod events;
pub mod history;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::{BusError, DriverError, GatewayError, HistoryError, PipelineError};
pub use types::{DeviceId, DeviceStatus, TagId, TagSample, Value};

pub use pipeline::{compose, decompose, should_persist, ComposedValue};

pub use driver::{
    BrowseNode, DependencyLoader, DeviceDriver, DriverConstructor, DriverContext, DriverRegistry,
    NoExternalDependencies, PollOutcome,
};

pub use adapter::{AdapterTiming, DeviceAdapter, OVERLOAD_THRESHOLD};

pub use events::{DeviceEvent, EventBus, EventSubscriber};

pub use history::{HistoryGate, HistorySink, MemoryHistorySink, NoopHistorySink};

pub use registry::DeviceRegistry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
