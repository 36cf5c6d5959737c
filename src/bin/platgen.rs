// src/bin/platgen.rs

use clap::Parser;
use platgen::cli::{Cli, dispatcher};

/// The main entry point of the `platgen` application.
/// It sets up logging, parses arguments, dispatches to the matching command
/// and maps the outcome to the process exit code.
#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    log::debug!("CLI args parsed: {:?}", cli);

    let outcome = dispatcher::dispatch(cli.args).await;
    // --- Centralized Error Handling ---
    // 0 on success or listing, 130 on Ctrl+C, 1 for everything else.
    outcome.report();
    std::process::exit(outcome.exit_code());
}
