//! Stratum CLI - Command-line interface for the Stratum migration engine.

use clap::Parser;

use stratum_cli::cli::{Cli, Command};
use stratum_cli::commands;
use stratum_cli::error::CliResult;
use stratum_cli::output;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    stratum_cli::init_tracing(cli.verbose);

    // Run the CLI and handle errors
    if let Err(e) = run(cli).await {
        output::newline();
        output::error(&e.to_string());
        if let Some(hint) = e.hint() {
            output::hint(hint);
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = cli.config;

    match cli.command {
        Command::Makemigrations(args) => commands::makemigrations::run(&config, args).await,
        Command::Migrate(args) => commands::migrate::run(&config, args).await,
        Command::Status(args) => commands::status::run(&config, args).await,
        Command::Show(args) => commands::show::run(&config, args).await,
        Command::Check(args) => commands::check::run(&config, args).await,
    }
}
