//! `stratum check` - Validate migration history without touching the ledger.

use std::path::Path;

use crate::cli::CheckArgs;
use crate::commands::open;
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the check command
pub async fn run(config_path: &Path, args: CheckArgs) -> CliResult<()> {
    output::header("Check Migrations");

    let (config, engine) = open(config_path, false, false)?;
    let engines = match args.engine {
        Some(name) => vec![name],
        None => {
            let mut engines = engine.engines().await?;
            for name in config.engines.keys() {
                if !engines.contains(name) {
                    engines.push(name.clone());
                }
            }
            engines.sort();
            engines
        }
    };

    if engines.is_empty() {
        output::info("No engines with migrations");
        return Ok(());
    }

    for check in engine.check_all(&engines).await? {
        output::list_item(&format!(
            "{}: {} migration(s), {} model(s)",
            check.engine, check.migrations, check.models
        ));
    }
    output::newline();
    success("Migration history is consistent");

    Ok(())
}
