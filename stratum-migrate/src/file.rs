//! Migration file management.
//!
//! Migrations live under one directory per engine:
//!
//! ```text
//! migrations/
//! ├── default/
//! │   ├── 0001_20240101120000_initial.toml
//! │   └── 0002_20240102093000_user_email.toml
//! └── analytics/
//!     └── 0001_20240101120000_initial.toml
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::ledger::validate_engine_name;
use crate::migration::{Migration, MigrationName};

/// Extension of migration files.
pub const MIGRATION_EXTENSION: &str = "toml";

/// Migration file reader/writer.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    /// Directory where migrations are stored.
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Create a new file manager.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Directory holding one engine's migrations.
    pub fn engine_dir(&self, engine: &str) -> MigrateResult<PathBuf> {
        validate_engine_name(engine)?;
        Ok(self.migrations_dir.join(engine))
    }

    /// Ensure an engine's migration directory exists.
    pub async fn ensure_dir(&self, engine: &str) -> MigrateResult<()> {
        tokio::fs::create_dir_all(self.engine_dir(engine)?)
            .await
            .map_err(MigrationError::Io)?;
        Ok(())
    }

    /// Engines that have a migration directory, sorted.
    pub async fn engines(&self) -> MigrateResult<Vec<String>> {
        let mut engines = Vec::new();
        if !tokio::fs::try_exists(&self.migrations_dir).await? {
            return Ok(engines);
        }

        let mut entries = tokio::fs::read_dir(&self.migrations_dir)
            .await
            .map_err(MigrationError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(MigrationError::Io)? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_engine_name(name).is_ok() {
                    engines.push(name.to_string());
                }
            }
        }

        engines.sort();
        Ok(engines)
    }

    /// Load every migration file of an engine, sorted by file name.
    ///
    /// A file that cannot be parsed, whose name does not match its file
    /// name, or that belongs to another engine is an error rather than
    /// being skipped.
    pub async fn list_migrations(&self, engine: &str) -> MigrateResult<Vec<Migration>> {
        let dir = self.engine_dir(engine)?;
        let mut migrations = Vec::new();

        if !tokio::fs::try_exists(&dir).await? {
            return Ok(migrations);
        }

        let mut entries = tokio::fs::read_dir(&dir).await.map_err(MigrationError::Io)?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(MigrationError::Io)? {
            let path = entry.path();
            if is_migration_file(&path) {
                paths.push(path);
            }
        }

        paths.sort();

        for path in paths {
            let migration = self.read_migration(&path).await?;
            if migration.database != engine {
                return Err(MigrationError::migration_file(format!(
                    "{} declares database '{}' but lives in the '{}' directory",
                    path.display(),
                    migration.database,
                    engine
                )));
            }
            migrations.push(migration);
        }

        debug!(engine, count = migrations.len(), "Loaded migration files");
        Ok(migrations)
    }

    /// Load the migrations of every engine.
    pub async fn list_all(&self) -> MigrateResult<Vec<Migration>> {
        let mut migrations = Vec::new();
        for engine in self.engines().await? {
            migrations.extend(self.list_migrations(&engine).await?);
        }
        Ok(migrations)
    }

    /// Read a migration file.
    pub async fn read_migration(&self, path: &Path) -> MigrateResult<Migration> {
        let stem = path
            .file_stem()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::InvalidMigration("Invalid path".to_string()))?;

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(MigrationError::Io)?;
        let migration = Migration::from_toml(&content).map_err(|e| match e {
            MigrationError::Serialization(msg) => {
                MigrationError::migration_file(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        if migration.name != stem {
            return Err(MigrationError::migration_file(format!(
                "{} declares name '{}'",
                path.display(),
                migration.name
            )));
        }

        Ok(migration)
    }

    /// Write a new migration file. Existing files are never overwritten.
    pub async fn write_migration(&self, migration: &Migration) -> MigrateResult<PathBuf> {
        self.ensure_dir(&migration.database).await?;

        let path = self
            .engine_dir(&migration.database)?
            .join(format!("{}.{}", migration.name, MIGRATION_EXTENSION));
        let content = migration.to_toml()?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(MigrationError::migration_file(format!(
                    "{} already exists; migrations are immutable once written",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        write_fresh(&mut file, &path, content.as_bytes()).await?;

        info!(path = %path.display(), "Wrote migration");
        Ok(path)
    }

    /// Generate the name of the next migration of a chain.
    pub fn next_name(&self, chain: &[Migration], label: &str, at: DateTime<Utc>) -> String {
        let sequence = chain
            .iter()
            .filter_map(Migration::sequence)
            .max()
            .unwrap_or(0)
            .max(chain.len() as u32)
            + 1;
        MigrationName::generate(sequence, at, label)
    }

    /// Generate a new migration name stamped with the current time.
    pub fn generate_name(&self, chain: &[Migration], label: &str) -> String {
        self.next_name(chain, label, Utc::now())
    }
}

/// Check if a path is a migration file.
fn is_migration_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == MIGRATION_EXTENSION)
}

/// Write `content` into a file that was just created at `path`.
///
/// The file is removed again when the write fails, so no truncated file is
/// left behind.
pub(crate) async fn write_fresh<W>(writer: &mut W, path: &Path, content: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(content).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove partially written file");
        }
    }
    written
}
