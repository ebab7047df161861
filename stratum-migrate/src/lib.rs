//! # stratum-migrate
//!
//! Schema migration engine for Stratum.
//!
//! This crate provides functionality for:
//! - Describing models as plain data ([`ModelDescription`])
//! - Replaying migration files into an in-memory [`SchemaState`]
//! - Diffing live models against that state into ordered [`Action`]s
//! - Resolving per-engine dependency chains of migrations
//! - Tracking applied migrations in a [`MigrationLedger`]
//! - Executing actions through an [`EngineAdapter`]
//!
//! ## Architecture
//!
//! The engine never reads the schema back from a database. The expected
//! schema is rebuilt from the migration files on every run, and the live
//! models are compared against it.
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ Migration    │────▶│ Resolver       │────▶│ Reconstruct  │
//! │ Files        │     │ (chain)        │     │ (state)      │
//! └──────────────┘     └────────────────┘     └──────────────┘
//!                              │                     │
//!                              ▼                     ▼
//!                      ┌────────────────┐     ┌──────────────┐
//!                      │ Engine Adapter │◀────│ Schema Diff  │◀── live models
//!                      └────────────────┘     └──────────────┘
//!                              │
//!                              ▼
//!                      ┌────────────────┐
//!                      │ Ledger         │
//!                      └────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use stratum_migrate::{
//!     FieldDescription, FileLedger, MigrationConfig, MigrationEngine, ModelBuilder,
//!     PostgresScriptAdapter, SqlScript,
//! };
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let user = ModelBuilder::new("User")
//!         .field(FieldDescription::varchar("email", 255).unique())
//!         .field(FieldDescription::text("name").nullable())
//!         .build()?;
//!
//!     let config = MigrationConfig::new().migrations_dir("./migrations");
//!     let engine = MigrationEngine::new(config, FileLedger::new("./.stratum"));
//!
//!     // Write a migration for whatever changed
//!     let plan = engine.make_migration("default", &[user], None).await?;
//!     println!("{}", plan.summary());
//!
//!     // Apply pending migrations
//!     let mut script = SqlScript::new();
//!     let result = engine
//!         .migrate("default", &PostgresScriptAdapter::new(), &mut script)
//!         .await?;
//!     println!("{}", result.summary());
//!     println!("{}", script.to_sql());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! Migrations are TOML documents stored under one directory per engine:
//!
//! ```text
//! migrations/
//! ├── default/
//! │   ├── 0001_20240101120000_initial.toml
//! │   └── 0002_20240102093000_user_email.toml
//! └── analytics/
//!     └── 0001_20240101120000_initial.toml
//! ```

pub mod action;
pub mod adapter;
pub mod diff;
pub mod engine;
pub mod error;
pub mod file;
pub mod ledger;
pub mod migration;
pub mod model;
pub mod reconstruct;
pub mod resolver;
pub mod sql;
pub mod state;

// Re-exports
pub use action::Action;
pub use adapter::EngineAdapter;
pub use diff::{SchemaDiff, SchemaDiffer};
pub use engine::{
    EngineCheck, MigrationConfig, MigrationEngine, MigrationPlan, MigrationResult,
    MigrationStatus,
};
pub use error::{EngineError, EngineErrorKind, InconsistentState, MigrateResult, MigrationError};
pub use file::MigrationFileManager;
pub use ledger::{FileLedger, LedgerEntry, MemoryLedger, MigrationLedger, MigrationLock};
pub use migration::{Migration, MigrationName, compute_checksum, suggest_label};
pub use model::{
    DefaultValue, FieldDescription, FieldSet, FieldType, IndexDescription, ModelBuilder,
    ModelDescription, OnDelete, Relation,
};
pub use reconstruct::{reconstruct, reconstruct_through, reconstruct_up_to};
pub use resolver::{pending, resolve};
pub use sql::{PostgresScriptAdapter, SqlScript};
pub use state::SchemaState;
