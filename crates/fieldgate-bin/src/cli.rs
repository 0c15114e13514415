//! CLI argument parsing and command definitions.
//!
//! Subcommands:
//!
//! - `run`: start the gateway (default when no subcommand is given)
//! - `validate`: check a configuration file without starting anything

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// FieldGate - industrial data-acquisition gateway.
///
/// Maintains live connections to field devices, normalizes their tag
/// values, and republishes them to consumers while selectively persisting
/// history.
#[derive(Parser, Debug)]
#[command(
    name = "fieldgate",
    version = fieldgate_core::VERSION,
    about = "Industrial data-acquisition gateway",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path.
    #[arg(
        short,
        long,
        default_value = "fieldgate.json",
        env = "FIELDGATE_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(
        short,
        long,
        default_value = "info",
        env = "FIELDGATE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log output format.
    #[arg(long, default_value = "text", env = "FIELDGATE_LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway.
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Validate the configuration file.
    ///
    /// Parses and validates the configuration without starting the
    /// gateway. Useful for checking a configuration before deployment.
    Validate(ValidateArgs),
}

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Load devices but do not start polling them.
    #[arg(long)]
    pub no_start: bool,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Print the parsed configuration after validation.
    #[arg(short, long)]
    pub show_config: bool,
}

// =============================================================================
// Log Format
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for log aggregation.
    Json,
    /// Minimal single-line output.
    Compact,
}

impl From<fieldgate_config::LogFormat> for LogFormat {
    fn from(format: fieldgate_config::LogFormat) -> Self {
        match format {
            fieldgate_config::LogFormat::Text => LogFormat::Text,
            fieldgate_config::LogFormat::Json => LogFormat::Json,
            fieldgate_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
