//! Migration engine implementation.

use std::path::PathBuf;
use std::time::Instant;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::adapter::EngineAdapter;
use crate::diff::{SchemaDiff, SchemaDiffer};
use crate::error::{EngineError, MigrateResult, MigrationError};
use crate::file::MigrationFileManager;
use crate::ledger::{LedgerEntry, MigrationLedger};
use crate::migration::{Migration, suggest_label};
use crate::model::ModelDescription;
use crate::reconstruct::{reconstruct, reconstruct_through};
use crate::resolver::{pending, resolve};
use crate::state::SchemaState;

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Path to the migrations directory.
    pub migrations_dir: PathBuf,
    /// Whether to run in dry-run mode.
    pub dry_run: bool,
    /// Whether destructive actions are expected (suppresses warnings).
    pub allow_destructive: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            dry_run: false,
            allow_destructive: false,
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Allow destructive actions without warnings.
    pub fn allow_destructive(mut self, allow: bool) -> Self {
        self.allow_destructive = allow;
        self
    }
}

/// A new migration computed from the live models.
#[derive(Debug)]
pub struct MigrationPlan {
    /// Engine the plan is for.
    pub engine: String,
    /// The computed diff.
    pub diff: SchemaDiff,
    /// The migration to write, `None` when the diff is empty.
    pub migration: Option<Migration>,
    /// Path the migration was written to, `None` in dry-run mode.
    pub path: Option<PathBuf>,
    /// Warnings.
    pub warnings: Vec<String>,
}

impl MigrationPlan {
    /// Check if there's anything to write.
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }

    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        match &self.migration {
            Some(migration) => format!("{}: {}", migration.name, self.diff.summary()),
            None => "No changes detected".to_string(),
        }
    }
}

/// Result of a migration operation.
#[derive(Debug, Default)]
pub struct MigrationResult {
    /// Engine that was migrated.
    pub engine: String,
    /// Names of applied migrations.
    pub applied_migrations: Vec<String>,
    /// Names of migrations a dry run would apply.
    pub planned_migrations: Vec<String>,
    /// Total number of actions executed.
    pub actions_applied: usize,
    /// Total duration in milliseconds.
    pub duration_ms: i64,
    /// Warnings generated during migration.
    pub warnings: Vec<String>,
}

impl MigrationResult {
    /// Check if any migrations were applied.
    pub fn has_changes(&self) -> bool {
        !self.applied_migrations.is_empty()
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        if !self.planned_migrations.is_empty() {
            return format!("[DRY RUN] {} pending", self.planned_migrations.len());
        }
        if self.applied_migrations.is_empty() {
            "No migrations applied".to_string()
        } else {
            format!(
                "{} applied ({} actions) in {}ms",
                self.applied_migrations.len(),
                self.actions_applied,
                self.duration_ms
            )
        }
    }
}

/// Migration status information.
#[derive(Debug)]
pub struct MigrationStatus {
    /// Engine name.
    pub engine: String,
    /// Applied migrations, oldest first.
    pub applied: Vec<LedgerEntry>,
    /// Pending migration names, in application order.
    pub pending: Vec<String>,
    /// Newest migration of the chain.
    pub head: Option<String>,
}

impl MigrationStatus {
    /// Total number of applied migrations.
    pub fn total_applied(&self) -> usize {
        self.applied.len()
    }

    /// Total number of pending migrations.
    pub fn total_pending(&self) -> usize {
        self.pending.len()
    }

    /// Check if the ledger is at the head of the chain.
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Result of validating one engine's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCheck {
    /// Engine name.
    pub engine: String,
    /// Number of migrations in the chain.
    pub migrations: usize,
    /// Number of models after replaying the chain.
    pub models: usize,
}

/// The main migration engine.
pub struct MigrationEngine<L: MigrationLedger> {
    config: MigrationConfig,
    ledger: L,
    file_manager: MigrationFileManager,
}

impl<L: MigrationLedger> MigrationEngine<L> {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig, ledger: L) -> Self {
        let file_manager = MigrationFileManager::new(&config.migrations_dir);
        Self {
            config,
            ledger,
            file_manager,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Get the ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Get the file manager.
    pub fn file_manager(&self) -> &MigrationFileManager {
        &self.file_manager
    }

    /// Engines with a migration directory.
    pub async fn engines(&self) -> MigrateResult<Vec<String>> {
        self.file_manager.engines().await
    }

    /// Load and resolve an engine's migration chain.
    pub async fn load_chain(&self, engine: &str) -> MigrateResult<Vec<Migration>> {
        let migrations = self.file_manager.list_migrations(engine).await?;
        resolve(engine, &migrations)
    }

    /// Find a migration of an engine by name.
    pub async fn find(&self, engine: &str, name: &str) -> MigrateResult<Migration> {
        self.file_manager
            .list_migrations(engine)
            .await?
            .into_iter()
            .find(|m| m.name == name)
            .ok_or_else(|| MigrationError::NotFound(name.to_string()))
    }

    /// Diff the live models against the head of the chain.
    ///
    /// The baseline is the whole chain, not only the applied prefix, since
    /// the new migration depends on the current head. Migrations the ledger
    /// has not recorded yet are reported as a warning.
    pub async fn plan(
        &self,
        engine: &str,
        models: &[ModelDescription],
        label: Option<&str>,
    ) -> MigrateResult<MigrationPlan> {
        let chain = self.load_chain(engine).await?;
        let baseline = reconstruct(&chain)?;
        let diff = SchemaDiffer::new(&baseline).diff(models)?;

        let mut plan = MigrationPlan {
            engine: engine.to_string(),
            diff,
            migration: None,
            path: None,
            warnings: Vec::new(),
        };

        if plan.diff.is_empty() {
            debug!(engine, "No schema changes detected");
            return Ok(plan);
        }

        let applied = self.ledger.applied(engine).await?;
        let unapplied = chain
            .iter()
            .filter(|m| !applied.iter().any(|e| e.migration == m.name))
            .count();
        if unapplied > 0 {
            plan.warnings.push(format!(
                "{} migration(s) not applied yet; the new migration builds on them",
                unapplied
            ));
        }

        if !self.config.allow_destructive {
            for action in plan.diff.iter().filter(|a| a.is_destructive()) {
                plan.warnings
                    .push(format!("{} drops data and cannot be reversed", action.describe()));
            }
        }

        let actions = plan.diff.actions();
        let label = match label {
            Some(label) => label.to_string(),
            None => suggest_label(&actions, chain.is_empty()),
        };
        let name = self.file_manager.generate_name(&chain, &label);
        plan.migration = Some(
            Migration::new(name, engine)
                .with_parent(chain.last().map(|m| m.name.clone()))
                .with_operations(actions),
        );

        Ok(plan)
    }

    /// Create a new migration file from model changes.
    ///
    /// Returns [`MigrationError::NoChanges`] when the models match the head
    /// of the chain. Takes no lock and never writes the ledger.
    pub async fn make_migration(
        &self,
        engine: &str,
        models: &[ModelDescription],
        label: Option<&str>,
    ) -> MigrateResult<MigrationPlan> {
        let mut plan = self.plan(engine, models, label).await?;
        let Some(migration) = &plan.migration else {
            return Err(MigrationError::NoChanges);
        };

        for warning in &plan.warnings {
            warn!(engine, "{}", warning);
        }

        if self.config.dry_run {
            info!(engine, migration = %migration.name, "[DRY RUN] Would write migration");
            return Ok(plan);
        }

        plan.path = Some(self.file_manager.write_migration(migration).await?);
        Ok(plan)
    }

    /// Apply pending migrations of an engine through an adapter.
    ///
    /// The whole chain is replayed in memory before the first action is
    /// executed. Each migration is recorded in the ledger only after all of
    /// its actions succeed.
    pub async fn migrate<A: EngineAdapter>(
        &self,
        engine: &str,
        adapter: &A,
        conn: &mut A::Connection,
    ) -> MigrateResult<MigrationResult> {
        let start = Instant::now();
        let mut result = MigrationResult {
            engine: engine.to_string(),
            ..Default::default()
        };

        // Acquire lock
        let _lock = self.ledger.acquire_lock(engine).await?;

        let chain = self.load_chain(engine).await?;
        let applied = self.ledger.applied(engine).await?;
        let last = verify_ledger(engine, &chain, &applied)?;
        let pending = pending(engine, &chain, last)?;

        // Validate every pending migration against the replayed state.
        let head = reconstruct(&chain)?;
        debug!(
            engine,
            chain = chain.len(),
            pending = pending.len(),
            models = head.len(),
            "Validated migration chain"
        );
        let mut schema = reconstruct_through(&chain, last)?;

        for migration in pending {
            if self.config.dry_run {
                result.planned_migrations.push(migration.name.clone());
                result
                    .warnings
                    .push(format!("[DRY RUN] Would apply: {}", migration.name));
                continue;
            }

            let checksum = migration.checksum()?;
            self.apply_migration(adapter, conn, migration, &mut schema).await?;
            self.ledger
                .record_applied(&migration.name, engine, &checksum)
                .await?;

            info!(
                engine,
                migration = %migration.name,
                actions = migration.operations.len(),
                "Applied migration"
            );
            result.applied_migrations.push(migration.name.clone());
            result.actions_applied += migration.operations.len();
        }

        result.duration_ms = start.elapsed().as_millis() as i64;
        Ok(result)
    }

    /// Apply a single migration, advancing `schema` past each executed action.
    async fn apply_migration<A: EngineAdapter>(
        &self,
        adapter: &A,
        conn: &mut A::Connection,
        migration: &Migration,
        schema: &mut SchemaState,
    ) -> MigrateResult<()> {
        let transactional = adapter.supports_transactional_ddl();
        let engine_error = |action_index: usize, partial: bool, source: EngineError| {
            MigrationError::Engine {
                migration: migration.name.clone(),
                action_index,
                partial,
                source,
            }
        };

        if transactional {
            adapter
                .begin(conn)
                .await
                .map_err(|e| engine_error(0, false, e))?;
        }

        for (index, action) in migration.operations.iter().enumerate() {
            debug!(migration = %migration.name, index, "{}", action.describe());
            if let Err(source) = adapter.apply_action(action, schema, conn).await {
                let partial = if transactional {
                    match adapter.rollback(conn).await {
                        Ok(()) => false,
                        Err(e) => {
                            warn!(migration = %migration.name, error = %e, "Rollback failed");
                            index > 0
                        }
                    }
                } else {
                    index > 0
                };
                return Err(engine_error(index, partial, source));
            }
            action
                .apply(schema)
                .map_err(|source| MigrationError::Replay {
                    migration: migration.name.clone(),
                    index,
                    source,
                })?;
        }

        if transactional {
            adapter
                .commit(conn)
                .await
                .map_err(|e| engine_error(migration.operations.len(), false, e))?;
        }

        Ok(())
    }

    /// Get migration status.
    pub async fn status(&self, engine: &str) -> MigrateResult<MigrationStatus> {
        let chain = self.load_chain(engine).await?;
        let applied = self.ledger.applied(engine).await?;
        let last = verify_ledger(engine, &chain, &applied)?;
        let pending = pending(engine, &chain, last)?
            .iter()
            .map(|m| m.name.clone())
            .collect();

        Ok(MigrationStatus {
            engine: engine.to_string(),
            applied,
            pending,
            head: chain.last().map(|m| m.name.clone()),
        })
    }

    /// Resolve and replay one engine's history.
    pub async fn check(&self, engine: &str) -> MigrateResult<EngineCheck> {
        let chain = self.load_chain(engine).await?;
        let state = reconstruct(&chain)?;
        Ok(EngineCheck {
            engine: engine.to_string(),
            migrations: chain.len(),
            models: state.len(),
        })
    }

    /// Validate several engines concurrently.
    pub async fn check_all(&self, engines: &[String]) -> MigrateResult<Vec<EngineCheck>> {
        try_join_all(engines.iter().map(|engine| self.check(engine))).await
    }
}

/// Check the ledger against the chain and return the last applied name.
///
/// Applied entries must be a prefix of the chain, in order, with matching
/// checksums.
fn verify_ledger<'a>(
    engine: &str,
    chain: &[Migration],
    applied: &'a [LedgerEntry],
) -> MigrateResult<Option<&'a str>> {
    for (position, entry) in applied.iter().enumerate() {
        let Some(migration) = chain.get(position).filter(|m| m.name == entry.migration) else {
            return Err(MigrationError::LedgerMismatch {
                engine: engine.to_string(),
                migration: entry.migration.clone(),
            });
        };

        let actual = migration.checksum()?;
        if actual != entry.checksum {
            return Err(MigrationError::ChecksumMismatch {
                id: entry.migration.clone(),
                expected: entry.checksum.clone(),
                actual,
            });
        }
    }

    Ok(applied.last().map(|e| e.migration.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::ledger::MemoryLedger;
    use crate::model::{FieldDescription, ModelBuilder, OnDelete, Relation};
    use crate::sql::{PostgresScriptAdapter, SqlScript};

    /// Adapter recording every call, failing on actions targeting one model.
    #[derive(Default)]
    struct RecordingAdapter {
        transactional: bool,
        fail_on: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl EngineAdapter for RecordingAdapter {
        type Connection = Vec<String>;

        async fn apply_action(
            &self,
            action: &Action,
            _schema: &SchemaState,
            conn: &mut Vec<String>,
        ) -> Result<(), EngineError> {
            if self.fail_on.is_some() && action.model() == self.fail_on {
                return Err(EngineError::constraint("boom"));
            }
            conn.push(action.describe());
            Ok(())
        }

        fn render_column_type(&self, _field: &FieldDescription) -> String {
            "ANY".to_string()
        }

        fn supports_transactional_ddl(&self) -> bool {
            self.transactional
        }

        async fn begin(&self, conn: &mut Vec<String>) -> Result<(), EngineError> {
            conn.push("begin".to_string());
            Ok(())
        }

        async fn commit(&self, conn: &mut Vec<String>) -> Result<(), EngineError> {
            conn.push("commit".to_string());
            Ok(())
        }

        async fn rollback(&self, conn: &mut Vec<String>) -> Result<(), EngineError> {
            conn.push("rollback".to_string());
            Ok(())
        }
    }

    fn user() -> ModelBuilder {
        ModelBuilder::new("User").field(FieldDescription::text("name"))
    }

    fn engine(dir: &std::path::Path) -> MigrationEngine<MemoryLedger> {
        MigrationEngine::new(
            MigrationConfig::new().migrations_dir(dir),
            MemoryLedger::new(),
        )
    }

    #[test]
    fn test_config_builder() {
        let config = MigrationConfig::new()
            .migrations_dir("./custom_migrations")
            .dry_run(true)
            .allow_destructive(true);

        assert_eq!(config.migrations_dir, PathBuf::from("./custom_migrations"));
        assert!(config.dry_run);
        assert!(config.allow_destructive);
    }

    #[tokio::test]
    async fn test_make_migrations_chain() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());

        let first = engine
            .make_migration("default", &[user().build().unwrap()], None)
            .await
            .unwrap();
        let first = first.migration.unwrap();
        assert!(first.name.starts_with("0001_"));
        assert!(first.name.ends_with("_initial"));
        assert!(first.depends_on.is_none());

        let again = engine
            .make_migration("default", &[user().build().unwrap()], None)
            .await;
        assert!(matches!(again, Err(MigrationError::NoChanges)));

        let models = [user()
            .field(FieldDescription::text("email").nullable())
            .build()
            .unwrap()];
        let second = engine
            .make_migration("default", &models, None)
            .await
            .unwrap();
        let second = second.migration.unwrap();
        assert!(second.name.starts_with("0002_"));
        assert!(second.name.ends_with("_user_email"));
        assert_eq!(second.depends_on.as_deref(), Some(first.name.as_str()));

        assert_eq!(engine.load_chain("default").await.unwrap().len(), 2);
        assert!(engine.ledger().entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MigrationEngine::new(
            MigrationConfig::new().migrations_dir(dir.path()).dry_run(true),
            MemoryLedger::new(),
        );

        let plan = engine
            .make_migration("default", &[user().build().unwrap()], Some("first"))
            .await
            .unwrap();
        assert!(plan.path.is_none());
        assert!(plan.migration.unwrap().name.ends_with("_first"));
        assert!(engine.load_chain("default").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_migrate_applies_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .make_migration("default", &[user().build().unwrap()], None)
            .await
            .unwrap();

        let adapter = PostgresScriptAdapter::new();
        let mut script = SqlScript::new();
        let result = engine.migrate("default", &adapter, &mut script).await.unwrap();
        assert_eq!(result.applied_migrations.len(), 1);
        assert!(script.to_sql().contains("CREATE TABLE \"User\""));

        let status = engine.status("default").await.unwrap();
        assert!(status.is_up_to_date());
        assert_eq!(status.total_applied(), 1);

        let result = engine.migrate("default", &adapter, &mut script).await.unwrap();
        assert!(!result.has_changes());
        assert_eq!(result.summary(), "No migrations applied");
    }

    #[tokio::test]
    async fn test_partial_failure_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let post = ModelBuilder::new("Post")
            .field(FieldDescription::foreign_key("author", "User", OnDelete::Cascade))
            .build()
            .unwrap();
        engine
            .make_migration("default", &[user().build().unwrap(), post], None)
            .await
            .unwrap();

        let adapter = RecordingAdapter {
            transactional: false,
            fail_on: Some("Post"),
        };
        let mut log = Vec::new();
        let err = engine.migrate("default", &adapter, &mut log).await.unwrap_err();

        match &err {
            MigrationError::Engine {
                action_index,
                partial,
                ..
            } => {
                assert_eq!(*action_index, 1);
                assert!(*partial);
            }
            other => panic!("expected engine error, got {:?}", other),
        }
        assert!(err.to_string().contains("manual intervention"));
        assert_eq!(log, vec!["Create model User (2 fields)".to_string()]);
        assert!(engine.ledger().entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_transactional_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .make_migration("default", &[user().build().unwrap()], None)
            .await
            .unwrap();
        let tag = ModelBuilder::new("Tag").build().unwrap();
        engine
            .make_migration("default", &[user().build().unwrap(), tag], None)
            .await
            .unwrap();

        let adapter = RecordingAdapter {
            transactional: true,
            fail_on: Some("Tag"),
        };
        let mut log = Vec::new();
        let err = engine.migrate("default", &adapter, &mut log).await.unwrap_err();

        assert!(matches!(err, MigrationError::Engine { partial: false, .. }));
        assert_eq!(log.last().map(String::as_str), Some("rollback"));

        let status = engine.status("default").await.unwrap();
        assert_eq!(status.total_applied(), 1);
        assert_eq!(status.total_pending(), 1);
    }

    #[tokio::test]
    async fn test_cycle_applies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let files = engine.file_manager();
        files
            .write_migration(&Migration::new("a", "default").depends_on("b"))
            .await
            .unwrap();
        files
            .write_migration(
                &Migration::new("b", "default")
                    .depends_on("a")
                    .operation(Action::DeleteModel { name: "X".into() }),
            )
            .await
            .unwrap();

        let adapter = RecordingAdapter::default();
        let mut log = Vec::new();
        let err = engine.migrate("default", &adapter, &mut log).await.unwrap_err();
        assert!(matches!(err, MigrationError::Cycle { .. }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_pending_migration_applies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let files = engine.file_manager();
        files
            .write_migration(&Migration::new("0001_20240101000000_initial", "default").operation(
                Action::CreateModel {
                    name: "User".into(),
                    fields: vec![FieldDescription::auto_primary_key("id")],
                },
            ))
            .await
            .unwrap();
        files
            .write_migration(
                &Migration::new("0002_20240102000000_broken", "default")
                    .depends_on("0001_20240101000000_initial")
                    .operation(Action::DeleteModel { name: "Nope".into() }),
            )
            .await
            .unwrap();

        let adapter = RecordingAdapter::default();
        let mut log = Vec::new();
        let err = engine.migrate("default", &adapter, &mut log).await.unwrap_err();
        assert!(matches!(err, MigrationError::Replay { index: 0, .. }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_modified_migration_is_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let plan = engine
            .make_migration("default", &[user().build().unwrap()], None)
            .await
            .unwrap();

        let adapter = RecordingAdapter::default();
        engine.migrate("default", &adapter, &mut Vec::new()).await.unwrap();

        let path = plan.path.unwrap();
        let edited = plan
            .migration
            .unwrap()
            .operation(Action::DeleteModel { name: "User".into() });
        tokio::fs::write(&path, edited.to_toml().unwrap()).await.unwrap();

        let err = engine.status("default").await.unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_unknown_ledger_entry_is_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .ledger()
            .record_applied("0001_gone", "default", "abc")
            .await
            .unwrap();

        let err = engine.status("default").await.unwrap_err();
        assert!(matches!(err, MigrationError::LedgerMismatch { .. }));
    }

    #[tokio::test]
    async fn test_migrate_dry_run_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        engine(dir.path())
            .make_migration("default", &[user().build().unwrap()], None)
            .await
            .unwrap();

        let engine = MigrationEngine::new(
            MigrationConfig::new().migrations_dir(dir.path()).dry_run(true),
            MemoryLedger::new(),
        );
        let adapter = RecordingAdapter::default();
        let mut log = Vec::new();
        let result = engine.migrate("default", &adapter, &mut log).await.unwrap();

        assert_eq!(result.planned_migrations.len(), 1);
        assert!(log.is_empty());
        assert!(engine.ledger().entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_check_all_engines() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .make_migration("default", &[user().build().unwrap()], None)
            .await
            .unwrap();
        engine
            .make_migration(
                "analytics",
                &[ModelBuilder::new("Event").build().unwrap(), ModelBuilder::new("Metric").build().unwrap()],
                None,
            )
            .await
            .unwrap();

        let engines = engine.engines().await.unwrap();
        assert_eq!(engines, vec!["analytics".to_string(), "default".to_string()]);

        let checks = engine.check_all(&engines).await.unwrap();
        assert_eq!(checks[0].models, 2);
        assert_eq!(checks[1].models, 1);
    }

    #[tokio::test]
    async fn test_destructive_changes_warn() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .make_migration(
                "default",
                &[user().field(FieldDescription::text("bio")).build().unwrap()],
                None,
            )
            .await
            .unwrap();

        let plan = engine
            .plan("default", &[user().build().unwrap()], None)
            .await
            .unwrap();
        assert_eq!(plan.warnings.len(), 2);
        assert!(plan.warnings[0].contains("1 migration(s) not applied yet"));
        assert!(plan.warnings[1].contains("Remove field bio"));
    }

    #[tokio::test]
    async fn test_plan_after_migrate_has_no_pending_warning() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine
            .make_migration("default", &[user().build().unwrap()], None)
            .await
            .unwrap();
        engine
            .migrate("default", &PostgresScriptAdapter::new(), &mut SqlScript::new())
            .await
            .unwrap();

        let models = [user().field(FieldDescription::text("bio").nullable()).build().unwrap()];
        let plan = engine.plan("default", &models, None).await.unwrap();
        assert!(plan.warnings.is_empty());
        assert!(plan.summary().contains("Add 1 fields"));
    }

    #[tokio::test]
    async fn test_foreign_key_type_follows_earlier_runs() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        let country = ModelBuilder::new("Country")
            .field(FieldDescription::varchar("code", 2).primary_key())
            .build()
            .unwrap();
        engine
            .make_migration("default", &[country.clone()], None)
            .await
            .unwrap();

        let adapter = PostgresScriptAdapter::new();
        engine
            .migrate("default", &adapter, &mut SqlScript::new())
            .await
            .unwrap();

        let city = ModelBuilder::new("City")
            .field(
                FieldDescription::foreign_key("country", "Country", OnDelete::Cascade)
                    .relation(Relation::new("Country", OnDelete::Cascade).to_field("code")),
            )
            .build()
            .unwrap();
        engine
            .make_migration("default", &[country, city], None)
            .await
            .unwrap();

        let mut script = SqlScript::new();
        engine.migrate("default", &adapter, &mut script).await.unwrap();
        assert!(script.to_sql().contains(
            "\"country\" VARCHAR(2) NOT NULL REFERENCES \"Country\" (\"code\") ON DELETE CASCADE"
        ));
    }
}
