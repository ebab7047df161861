//! CLI command implementations.

use std::path::Path;

use stratum_migrate::{FileLedger, MigrationConfig, MigrationEngine};

use crate::config::Config;
use crate::error::CliResult;

pub mod check;
pub mod makemigrations;
pub mod migrate;
pub mod show;
pub mod status;

/// Load the config and open the migration engine it describes.
pub(crate) fn open(
    config_path: &Path,
    dry_run: bool,
    allow_destructive: bool,
) -> CliResult<(Config, MigrationEngine<FileLedger>)> {
    let config = Config::load_or_default(config_path)?;
    let engine = MigrationEngine::new(
        MigrationConfig::new()
            .migrations_dir(config.migrations_dir())
            .dry_run(dry_run)
            .allow_destructive(allow_destructive),
        FileLedger::new(config.ledger_dir()),
    );
    Ok((config, engine))
}
