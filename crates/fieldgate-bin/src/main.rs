//! FieldGate gateway entry point.

use clap::Parser;
use tracing::error;

use fieldgate_bin::cli::{Cli, Commands, ValidateArgs};
use fieldgate_bin::error::{BinError, BinResult};
use fieldgate_bin::logging::init_logging;
use fieldgate_bin::runtime::RuntimeBuilder;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let result = run(cli);
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> BinResult<()> {
    match cli.command {
        Some(Commands::Validate(args)) => validate(&cli.config, &args),
        Some(Commands::Run(args)) => serve(&cli.config, args.no_start),
        None => serve(&cli.config, false),
    }
}

/// Validates the configuration file and reports the result.
fn validate(path: &std::path::Path, args: &ValidateArgs) -> BinResult<()> {
    let config = fieldgate_config::load_config(path)
        .map_err(|e| BinError::Configuration(e.to_string()))?;

    println!(
        "OK: {} ({} devices)",
        config.gateway.id,
        config.devices.len()
    );
    if args.show_config {
        let rendered = serde_json::to_string_pretty(&config)
            .map_err(|e| BinError::Configuration(e.to_string()))?;
        println!("{}", rendered);
    }
    Ok(())
}

/// Builds the tokio runtime and runs the gateway until shutdown.
fn serve(path: &std::path::Path, no_start: bool) -> BinResult<()> {
    let runtime = RuntimeBuilder::new()
        .config_path(path)
        .skip_start(no_start)
        .build()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BinError::Initialization(format!("tokio runtime: {}", e)))?
        .block_on(runtime.run())
}
