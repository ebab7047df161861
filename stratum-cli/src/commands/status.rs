//! `stratum status` - Show applied and pending migrations.

use std::path::Path;

use serde::Serialize;
use stratum_migrate::{LedgerEntry, MigrationStatus};

use crate::cli::StatusArgs;
use crate::commands::open;
use crate::error::CliResult;
use crate::output::{self, success};

/// Status of one engine as printed by `--json`.
#[derive(Debug, Serialize)]
struct StatusReport {
    engine: String,
    head: Option<String>,
    applied: Vec<LedgerEntry>,
    pending: Vec<String>,
}

impl From<MigrationStatus> for StatusReport {
    fn from(status: MigrationStatus) -> Self {
        Self {
            engine: status.engine,
            head: status.head,
            applied: status.applied,
            pending: status.pending,
        }
    }
}

/// Run the status command
pub async fn run(config_path: &Path, args: StatusArgs) -> CliResult<()> {
    let (config, engine) = open(config_path, false, false)?;

    let mut statuses = Vec::new();
    for name in config.select_engines(args.engine.as_deref()) {
        statuses.push(engine.status(&name).await?);
    }

    if args.json {
        let reports: Vec<StatusReport> = statuses.into_iter().map(Into::into).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    output::header("Migration Status");
    for status in &statuses {
        output::section(&format!("Engine '{}'", status.engine));
        output::kv("Applied", &status.total_applied().to_string());
        output::kv("Pending", &status.total_pending().to_string());
        output::newline();

        for entry in &status.applied {
            output::list_item(&format!(
                "{} {} ({})",
                output::style_success("✔"),
                entry.migration,
                entry.applied_at.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        for name in &status.pending {
            output::list_item(&format!("{} {}", output::style_pending("…"), name));
        }

        if status.is_up_to_date() {
            success("Up to date");
        } else {
            output::info(&format!(
                "{} pending migration(s); run `stratum migrate`",
                status.total_pending()
            ));
        }
        output::newline();
    }

    Ok(())
}
