//! Session exporter binary.
//!
//! Parses the command line, loads configuration, initializes tracing and runs one export of a
//! day of vendor data: session data in stream or historical mode, or the message definitions.

use clap::Parser;
use export::encryption::install_crypto_provider;
use std::process::ExitCode;
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::cli::{Cli, Command};
use crate::config::load_exporter_config;
use crate::core::run_export;
use crate::error::{ExporterError, ExporterResult};

mod cli;
mod config;
mod core;
mod error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> ExporterResult<()> {
    let exporter_config = load_exporter_config(&command)?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME")).map_err(ExporterError::config)?;

    install_crypto_provider();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(exporter_config, command))
}

async fn async_main(
    exporter_config: ::config::shared::ExporterConfig,
    command: Command,
) -> ExporterResult<()> {
    if let Err(err) = run_export(exporter_config, command).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
