//! # Stratum
//!
//! A schema migration engine that never inspects a live database.
//!
//! Stratum provides:
//! - Declarative model descriptions with reusable field sets
//! - Migration files as immutable, checksummed TOML documents
//! - State reconstruction by replaying migrations in memory
//! - Per-engine dependency resolution with cycle and head detection
//! - A diff engine producing dependency-ordered schema actions
//! - A ledger of applied migrations and a pluggable engine adapter
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stratum::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MigrationError> {
//!     let timestamps = FieldSet::new()
//!         .field(FieldDescription::datetime("created_at"));
//!
//!     let user = ModelBuilder::new("User")
//!         .field(FieldDescription::varchar("email", 255).unique())
//!         .include(&timestamps)
//!         .build()?;
//!
//!     let engine = MigrationEngine::new(
//!         MigrationConfig::new().migrations_dir("./migrations"),
//!         FileLedger::new("./.stratum"),
//!     );
//!
//!     engine.make_migration("default", &[user], None).await?;
//!
//!     let mut script = SqlScript::new();
//!     engine
//!         .migrate("default", &PostgresScriptAdapter::new(), &mut script)
//!         .await?;
//!     println!("{}", script.to_sql());
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Migration engine, models, diffing and ledgers.
pub mod migrate {
    pub use stratum_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use stratum_migrate::{
        Action, EngineAdapter, FieldDescription, FieldSet, FileLedger, MemoryLedger, Migration,
        MigrationConfig, MigrationEngine, MigrationError, MigrationLedger, ModelBuilder,
        ModelDescription, OnDelete, PostgresScriptAdapter, SchemaDiffer, SchemaState, SqlScript,
        reconstruct, resolve,
    };
}

// Re-export key types at the crate root
pub use stratum_migrate::{MigrateResult, MigrationError};
