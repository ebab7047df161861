//! `stratum show` - Print the actions of a migration.

use std::path::Path;

use crate::cli::ShowArgs;
use crate::commands::open;
use crate::error::CliResult;
use crate::output;

/// Run the show command
pub async fn run(config_path: &Path, args: ShowArgs) -> CliResult<()> {
    let (config, engine) = open(config_path, false, false)?;
    let name = args
        .engine
        .unwrap_or_else(|| config.migrations.default_engine.clone());

    let migration = engine.find(&name, &args.migration).await?;

    output::header(&migration.name);
    output::kv("Engine", &migration.database);
    output::kv(
        "Depends on",
        migration.depends_on.as_deref().unwrap_or("(root)"),
    );
    output::kv("Checksum", &migration.checksum()?);
    output::newline();

    if migration.operations.is_empty() {
        output::dim("No operations");
        return Ok(());
    }

    output::section("Operations");
    for (i, action) in migration.operations.iter().enumerate() {
        output::action(Some(i), action);
    }

    Ok(())
}
