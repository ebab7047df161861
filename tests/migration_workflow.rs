//! Integration tests for the full migration workflow.
//!
//! These tests drive the public API the way an application would: describe
//! models, write migrations for them, replay history and apply it.

use pretty_assertions::assert_eq;
use stratum::migrate::{
    Action, DefaultValue, FieldDescription, FieldSet, FileLedger, MemoryLedger, Migration,
    MigrationConfig, MigrationEngine, MigrationError, MigrationLedger, ModelBuilder,
    ModelDescription, OnDelete, PostgresScriptAdapter, SchemaDiffer, SchemaState, SqlScript,
    reconstruct, resolve,
};

fn timestamps() -> FieldSet {
    FieldSet::new()
        .field(FieldDescription::datetime("created_at"))
        .field(FieldDescription::datetime("updated_at").nullable())
}

fn user(extra: Vec<FieldDescription>) -> ModelDescription {
    extra
        .into_iter()
        .fold(
            ModelBuilder::new("User")
                .field(FieldDescription::varchar("email", 255).unique())
                .include(&timestamps()),
            |builder, field| builder.field(field),
        )
        .build()
        .unwrap()
}

fn post() -> ModelDescription {
    ModelBuilder::new("Post")
        .field(FieldDescription::foreign_key("author", "User", OnDelete::Cascade))
        .field(FieldDescription::text("title"))
        .field(FieldDescription::enumeration("status", ["draft", "published"]))
        .index(["author", "title"], false)
        .build()
        .unwrap()
}

/// Append a migration for `live` to `history` and check the round trip.
fn evolve(history: &mut Vec<Migration>, live: &[ModelDescription]) -> usize {
    let baseline = reconstruct(history).unwrap();
    let diff = SchemaDiffer::new(&baseline).diff(live).unwrap();
    let count = diff.len();

    let name = format!("{:04}_step", history.len() + 1);
    let migration = Migration::new(name, "default")
        .with_parent(history.last().map(|m| m.name.clone()))
        .with_operations(diff.into_actions());
    history.push(migration);

    let replayed = reconstruct(history).unwrap();
    assert_eq!(replayed, SchemaState::from_models(live.to_vec()));
    assert!(SchemaDiffer::new(&replayed).diff(live).unwrap().is_empty());
    count
}

#[test]
fn test_history_round_trips_through_many_changes() {
    let mut history = Vec::new();

    assert_eq!(evolve(&mut history, &[user(vec![]), post()]), 3);

    // Add a nullable column.
    let with_bio = user(vec![FieldDescription::text("bio").nullable()]);
    assert_eq!(evolve(&mut history, &[with_bio.clone(), post()]), 1);

    // Rename a column, keeping its shape.
    let renamed = user(vec![FieldDescription::text("about").nullable()]);
    assert_eq!(evolve(&mut history, &[renamed.clone(), post()]), 1);
    assert!(matches!(
        history.last().unwrap().operations[0],
        Action::RenameField { .. }
    ));

    // Change nullability and default together.
    let changed = user(vec![
        FieldDescription::text("about").default_value(DefaultValue::Text(String::new())),
    ]);
    assert_eq!(evolve(&mut history, &[changed.clone(), post()]), 1);

    // Drop the referencing model, then everything.
    evolve(&mut history, &[changed]);
    evolve(&mut history, &[]);

    let chain = resolve("default", &history).unwrap();
    assert_eq!(chain, history);
    assert!(reconstruct(&chain).unwrap().is_empty());
}

#[test]
fn test_migrations_survive_toml() {
    let mut history = Vec::new();
    evolve(&mut history, &[user(vec![]), post()]);

    for migration in &history {
        let text = migration.to_toml().unwrap();
        let parsed = Migration::from_toml(&text).unwrap();
        assert_eq!(&parsed, migration);
        assert_eq!(parsed.checksum().unwrap(), migration.checksum().unwrap());
    }
}

#[test]
fn test_dropping_referenced_model_is_rejected() {
    let mut history = Vec::new();
    evolve(&mut history, &[user(vec![]), post()]);

    let baseline = reconstruct(&history).unwrap();
    let err = SchemaDiffer::new(&baseline).diff(&[post()]).unwrap_err();
    assert!(matches!(err, MigrationError::DanglingForeignKey { .. }));
}

#[tokio::test]
async fn test_engines_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MigrationEngine::new(
        MigrationConfig::new().migrations_dir(dir.path().join("migrations")),
        MemoryLedger::new(),
    );

    engine
        .make_migration("default", &[user(vec![])], None)
        .await
        .unwrap();
    engine
        .make_migration(
            "analytics",
            &[ModelBuilder::new("Event").build().unwrap()],
            None,
        )
        .await
        .unwrap();

    let adapter = PostgresScriptAdapter::new();
    let mut script = SqlScript::new();
    engine
        .migrate("analytics", &adapter, &mut script)
        .await
        .unwrap();

    assert!(script.to_sql().contains("\"Event\""));
    assert!(!script.to_sql().contains("\"User\""));
    assert_eq!(engine.status("analytics").await.unwrap().total_pending(), 0);
    assert_eq!(engine.status("default").await.unwrap().total_pending(), 1);
}

#[tokio::test]
async fn test_file_ledger_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let open = || {
        MigrationEngine::new(
            MigrationConfig::new().migrations_dir(dir.path().join("migrations")),
            FileLedger::new(dir.path().join(".stratum")),
        )
    };

    let engine = open();
    engine
        .make_migration("default", &[user(vec![])], None)
        .await
        .unwrap();
    engine
        .make_migration("default", &[user(vec![]), post()], None)
        .await
        .unwrap();

    let adapter = PostgresScriptAdapter::new();
    let mut script = SqlScript::new();
    let result = engine.migrate("default", &adapter, &mut script).await.unwrap();
    assert_eq!(result.applied_migrations.len(), 2);

    let sql = script.to_sql();
    let users = sql.find("CREATE TABLE \"User\"").unwrap();
    let posts = sql.find("CREATE TABLE \"Post\"").unwrap();
    assert!(users < posts);
    assert!(sql.contains("REFERENCES \"User\""));

    // A fresh process sees the same ledger.
    let reopened = open();
    let applied = reopened.ledger().applied("default").await.unwrap();
    assert_eq!(applied.len(), 2);
    assert!(reopened.status("default").await.unwrap().is_up_to_date());

    let again = reopened
        .make_migration("default", &[user(vec![]), post()], None)
        .await;
    assert!(matches!(again, Err(MigrationError::NoChanges)));
}

#[tokio::test]
async fn test_mutually_referencing_models_render_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let engine = MigrationEngine::new(
        MigrationConfig::new().migrations_dir(dir.path()),
        MemoryLedger::new(),
    );
    let team = ModelBuilder::new("Team")
        .field(FieldDescription::foreign_key("captain", "Player", OnDelete::SetNull).nullable())
        .build()
        .unwrap();
    let player = ModelBuilder::new("Player")
        .field(FieldDescription::foreign_key("team", "Team", OnDelete::Cascade))
        .build()
        .unwrap();
    engine
        .make_migration("default", &[team, player], None)
        .await
        .unwrap();

    let mut script = SqlScript::new();
    engine
        .migrate("default", &PostgresScriptAdapter::new(), &mut script)
        .await
        .unwrap();

    let sql = script.to_sql();
    let players = sql.find("CREATE TABLE \"Player\"").unwrap();
    let teams = sql.find("CREATE TABLE \"Team\"").unwrap();
    let back_edge = sql
        .find("ALTER TABLE \"Player\" ADD COLUMN \"team\" INTEGER NOT NULL REFERENCES \"Team\"")
        .unwrap();
    assert!(players < teams);
    assert!(teams < back_edge);
    assert!(sql.contains("\"captain\" INTEGER REFERENCES \"Player\" (\"id\") ON DELETE SET NULL"));
}
