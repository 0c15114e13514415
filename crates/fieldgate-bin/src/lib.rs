//! # fieldgate-bin
//!
//! The `fieldgate` gateway binary: CLI parsing, logging initialization,
//! runtime orchestration, and graceful shutdown coordination.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use runtime::{GatewayRuntime, RuntimeBuilder};
pub use shutdown::ShutdownCoordinator;
