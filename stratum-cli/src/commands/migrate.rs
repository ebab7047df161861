//! `stratum migrate` - Apply pending migrations.
//!
//! Actions are rendered as PostgreSQL DDL through the script adapter. Each
//! migration's script is printed, or appended to `--sql-out`, as its
//! transaction commits. The ledger only advances past a migration once its
//! SQL has been emitted.

use std::path::{Path, PathBuf};

use stratum_migrate::{
    Action, EngineAdapter, EngineError, EngineErrorKind, FieldDescription, PostgresScriptAdapter,
    SchemaState, SqlScript,
};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::cli::MigrateArgs;
use crate::commands::open;
use crate::error::CliResult;
use crate::output::{self, success};

/// Run the migrate command
pub async fn run(config_path: &Path, args: MigrateArgs) -> CliResult<()> {
    output::header("Migrate");

    let (config, engine) = open(config_path, args.dry_run, false)?;
    output::kv("Migrations", &config.migrations_dir().display().to_string());
    output::kv("Ledger", &config.ledger_dir().display().to_string());
    output::newline();

    let adapter = EmittingAdapter::default();
    let mut emitter = Emitter::new(match &args.sql_out {
        Some(path) => Sink::File {
            path: path.clone(),
            file: None,
        },
        None => Sink::Stdout,
    });

    let mut outcome: CliResult<()> = Ok(());
    for name in config.select_engines(args.engine.as_deref()) {
        output::section(&format!("Engine '{}'", name));
        emitter.engine = name.clone();

        let result = match engine.migrate(&name, &adapter, &mut emitter).await {
            Ok(result) => result,
            Err(e) => {
                outcome = Err(e.into());
                break;
            }
        };

        for migration in &result.applied_migrations {
            output::list_item(&format!("{} {}", output::style_success("applied"), migration));
        }
        for migration in &result.planned_migrations {
            output::list_item(&format!("{} {}", output::style_pending("pending"), migration));
        }
        success(&result.summary());
        output::newline();
    }

    if let Sink::File { path, file: Some(_) } = &emitter.sink {
        success(&format!("SQL written to {}", path.display()));
    }

    outcome
}

/// Destination of committed statements.
enum Sink {
    Stdout,
    File {
        path: PathBuf,
        file: Option<tokio::fs::File>,
    },
}

/// Connection of [`EmittingAdapter`]: the script and where it goes.
struct Emitter {
    script: SqlScript,
    sink: Sink,
    /// Engine currently being migrated.
    engine: String,
    /// Engine whose header was written last.
    announced: Option<String>,
}

impl Emitter {
    fn new(sink: Sink) -> Self {
        Self {
            script: SqlScript::new(),
            sink,
            engine: String::new(),
            announced: None,
        }
    }

    /// Write out every committed statement.
    async fn flush(&mut self) -> std::io::Result<()> {
        let statements = self.script.drain();
        if statements.is_empty() {
            return Ok(());
        }

        let mut text = String::new();
        if self.announced.as_deref() != Some(self.engine.as_str()) {
            text.push_str(&format!("-- engine: {}\n", self.engine));
            self.announced = Some(self.engine.clone());
        }
        for statement in statements {
            text.push_str(&statement);
            text.push('\n');
        }

        match &mut self.sink {
            Sink::Stdout => output::code(&text),
            Sink::File { path, file } => {
                if file.is_none() {
                    *file = Some(tokio::fs::File::create(path.as_path()).await?);
                }
                if let Some(file) = file {
                    file.write_all(text.as_bytes()).await?;
                    file.flush().await?;
                }
            }
        }
        debug!(engine = %self.engine, bytes = text.len(), "Emitted SQL");
        Ok(())
    }
}

/// PostgreSQL script adapter that emits each migration as it commits.
#[derive(Default)]
struct EmittingAdapter {
    inner: PostgresScriptAdapter,
}

#[async_trait::async_trait]
impl EngineAdapter for EmittingAdapter {
    type Connection = Emitter;

    async fn apply_action(
        &self,
        action: &Action,
        schema: &SchemaState,
        conn: &mut Emitter,
    ) -> Result<(), EngineError> {
        self.inner.apply_action(action, schema, &mut conn.script).await
    }

    fn render_column_type(&self, field: &FieldDescription) -> String {
        self.inner.render_column_type(field)
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.inner.supports_transactional_ddl()
    }

    async fn begin(&self, conn: &mut Emitter) -> Result<(), EngineError> {
        self.inner.begin(&mut conn.script).await
    }

    async fn commit(&self, conn: &mut Emitter) -> Result<(), EngineError> {
        self.inner.commit(&mut conn.script).await?;
        conn.flush().await.map_err(|e| {
            EngineError::new(EngineErrorKind::Other, format!("cannot emit SQL: {}", e))
        })
    }

    async fn rollback(&self, conn: &mut Emitter) -> Result<(), EngineError> {
        self.inner.rollback(&mut conn.script).await
    }
}
