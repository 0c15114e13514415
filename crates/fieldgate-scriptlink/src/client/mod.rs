//! Framed stream client for ScriptLink controllers.
//!
//! Turns a raw byte-oriented TCP stream into a sequence of delimited
//! request/response exchanges:
//!
//! - [`frame`]: the wire codec and incremental reassembly decoder
//! - [`stream`]: the persistent TCP client with per-request timeouts

pub mod frame;
pub mod stream;

pub use frame::{inflate_probe, Frame, FrameDecoder};
pub use stream::FramedStreamClient;
