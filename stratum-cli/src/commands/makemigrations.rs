//! `stratum makemigrations` - Write migrations for model changes.

use std::path::Path;

use stratum_migrate::MigrationError;

use crate::cli::MakemigrationsArgs;
use crate::commands::open;
use crate::error::CliResult;
use crate::models::load_models;
use crate::output::{self, success, warn};

/// Run the makemigrations command
pub async fn run(config_path: &Path, args: MakemigrationsArgs) -> CliResult<()> {
    output::header("Make Migrations");

    let (config, engine) = open(config_path, args.dry_run, args.allow_destructive)?;
    output::kv("Migrations", &config.migrations_dir().display().to_string());
    output::newline();

    for name in config.select_engines(args.engine.as_deref()) {
        let models = load_models(&config.models_path(&name)?)?;

        let plan = match engine
            .make_migration(&name, &models, args.name.as_deref())
            .await
        {
            Ok(plan) => plan,
            Err(MigrationError::NoChanges) => {
                output::info(&format!("No changes detected for engine '{}'", name));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let Some(migration) = &plan.migration else {
            continue;
        };

        output::section(&format!("{} ({})", migration.name, name));
        for action in plan.diff.iter() {
            output::action(None, action);
        }
        for warning in &plan.warnings {
            warn(warning);
        }

        match &plan.path {
            Some(path) => success(&format!("Created {}", path.display())),
            None => output::dim("[DRY RUN] Migration not written"),
        }
        output::newline();
    }

    Ok(())
}
