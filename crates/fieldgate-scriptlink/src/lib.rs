//! # fieldgate-scriptlink
//!
//! ScriptLink protocol driver for FieldGate.
//!
//! ScriptLink controllers speak a length-prefixed, checksummed frame
//! protocol over a persistent TCP connection. Their poll response is not a
//! fixed binary layout: the payload is a block of script text that, when
//! executed, populates named tables representing the controller's full
//! state. This crate provides:
//!
//! - **client**: the generic framed stream client (frame codec, partial-read
//!   reassembly, desync detection, request timeouts, inflate probing)
//! - **extractor**: the sandboxed script-state extractor built on `rhai`
//! - **driver**: the [`fieldgate_core::DeviceDriver`] implementation wiring
//!   both together with the tag value pipeline
//!
//! ## Example
//!
//! ```rust,ignore
//! registry.register_driver(fieldgate_scriptlink::PROTOCOL, fieldgate_scriptlink::constructor);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod types;

pub use client::{Frame, FrameDecoder, FramedStreamClient};
pub use driver::{constructor, ScriptLinkDriver, PROTOCOL};
pub use error::ScriptLinkError;
pub use extractor::{AddressPath, PathSegment, ScriptStateExtractor, StateValue};
pub use types::ScriptLinkConfig;
