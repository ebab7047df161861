//! Applied migration tracking.
//!
//! The ledger is an append-only record of which migrations have been applied
//! to each engine. The most recent entry of an engine, by insertion order, is
//! its current position in the chain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{MigrateResult, MigrationError};
use crate::file::write_fresh;

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Migration name.
    pub migration: String,
    /// Engine the migration was applied to.
    pub engine: String,
    /// Checksum of the migration when it was applied.
    pub checksum: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        migration: impl Into<String>,
        engine: impl Into<String>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            migration: migration.into(),
            engine: engine.into(),
            checksum: checksum.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Persistent record of applied migrations.
#[async_trait::async_trait]
pub trait MigrationLedger: Send + Sync {
    /// Append an entry for a fully applied migration.
    async fn record_applied(&self, migration: &str, engine: &str, checksum: &str)
    -> MigrateResult<()>;

    /// All entries of an engine, in insertion order.
    async fn applied(&self, engine: &str) -> MigrateResult<Vec<LedgerEntry>>;

    /// The most recent entry of an engine.
    async fn last_applied(&self, engine: &str) -> MigrateResult<Option<LedgerEntry>> {
        Ok(self.applied(engine).await?.pop())
    }

    /// Acquire the exclusive migration lock of an engine.
    async fn acquire_lock(&self, engine: &str) -> MigrateResult<MigrationLock>;
}

/// Migration lock to prevent concurrent migrations of one engine.
///
/// The lock is released when the guard is dropped.
pub struct MigrationLock {
    engine: String,
    release_fn: Option<Box<dyn FnOnce() + Send>>,
}

impl MigrationLock {
    /// Create a new migration lock.
    pub fn new(engine: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            engine: engine.into(),
            release_fn: Some(Box::new(release)),
        }
    }

    /// Get the locked engine.
    pub fn engine(&self) -> &str {
        &self.engine
    }
}

impl std::fmt::Debug for MigrationLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationLock")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Drop for MigrationLock {
    fn drop(&mut self) {
        if let Some(release) = self.release_fn.take() {
            release();
        }
    }
}

/// In-memory ledger for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry across engines, in insertion order.
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl MigrationLedger for MemoryLedger {
    async fn record_applied(
        &self,
        migration: &str,
        engine: &str,
        checksum: &str,
    ) -> MigrateResult<()> {
        self.entries
            .lock()
            .await
            .push(LedgerEntry::new(migration, engine, checksum));
        Ok(())
    }

    async fn applied(&self, engine: &str) -> MigrateResult<Vec<LedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.engine == engine)
            .cloned()
            .collect())
    }

    async fn acquire_lock(&self, engine: &str) -> MigrateResult<MigrationLock> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(engine.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        debug!(engine, "Acquired in-memory migration lock");
        Ok(MigrationLock::new(engine, move || drop(guard)))
    }
}

/// On-disk contents of one engine's ledger.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    entries: Vec<LedgerEntry>,
}

/// Ledger stored as one TOML file per engine, with lock files for exclusion.
#[derive(Debug, Clone)]
pub struct FileLedger {
    dir: PathBuf,
}

impl FileLedger {
    /// Create a ledger rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The ledger directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ledger_path(&self, engine: &str) -> MigrateResult<PathBuf> {
        validate_engine_name(engine)?;
        Ok(self.dir.join(format!("{}.toml", engine)))
    }

    fn lock_path(&self, engine: &str) -> MigrateResult<PathBuf> {
        validate_engine_name(engine)?;
        Ok(self.dir.join(format!("{}.lock", engine)))
    }

    async fn read(&self, engine: &str) -> MigrateResult<LedgerFile> {
        let path = self.ledger_path(engine)?;
        if !tokio::fs::try_exists(&path).await? {
            return Ok(LedgerFile::default());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let file: LedgerFile = toml::from_str(&content)?;
        if let Some(foreign) = file.entries.iter().find(|e| e.engine != engine) {
            return Err(MigrationError::serialization(format!(
                "ledger file {} holds an entry for engine '{}'",
                path.display(),
                foreign.engine
            )));
        }
        Ok(file)
    }
}

#[async_trait::async_trait]
impl MigrationLedger for FileLedger {
    async fn record_applied(
        &self,
        migration: &str,
        engine: &str,
        checksum: &str,
    ) -> MigrateResult<()> {
        let mut file = self.read(engine).await?;
        file.entries.push(LedgerEntry::new(migration, engine, checksum));

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.ledger_path(engine)?;
        let tmp = path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, toml::to_string(&file)?).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(engine, migration, "Recorded migration in ledger");
        Ok(())
    }

    async fn applied(&self, engine: &str) -> MigrateResult<Vec<LedgerEntry>> {
        Ok(self.read(engine).await?.entries)
    }

    async fn acquire_lock(&self, engine: &str) -> MigrateResult<MigrationLock> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.lock_path(engine)?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(MigrationError::lock_failed(format!(
                    "engine '{}' is locked by another process (remove {} if no migration is running)",
                    engine,
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let owner = format!(
            "pid = {}\nacquired_at = \"{}\"\n",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        write_fresh(&mut file, &path, owner.as_bytes()).await?;

        debug!(engine, path = %path.display(), "Acquired migration lock file");
        Ok(MigrationLock::new(engine, move || {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to release migration lock");
            }
        }))
    }
}

/// Engine names become file and directory names.
pub fn validate_engine_name(engine: &str) -> MigrateResult<()> {
    let valid = !engine.is_empty()
        && engine
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(MigrationError::other(format!(
            "invalid engine name '{}': use letters, digits, '_' or '-'",
            engine
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_memory_ledger_per_engine() {
        let ledger = MemoryLedger::new();
        ledger.record_applied("a", "default", "c1").await.unwrap();
        ledger.record_applied("x", "analytics", "c2").await.unwrap();
        ledger.record_applied("b", "default", "c3").await.unwrap();

        let applied = ledger.applied("default").await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(
            ledger.last_applied("default").await.unwrap().unwrap().migration,
            "b"
        );
        assert_eq!(
            ledger.last_applied("analytics").await.unwrap().unwrap().migration,
            "x"
        );
        assert!(ledger.last_applied("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_lock_is_exclusive_per_engine() {
        let ledger = MemoryLedger::new();
        let lock = ledger.acquire_lock("default").await.unwrap();
        assert_eq!(lock.engine(), "default");

        // Other engines are independent.
        let _other = ledger.acquire_lock("analytics").await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), ledger.acquire_lock("default")).await;
        assert!(waiting.is_err());

        drop(lock);
        let again = tokio::time::timeout(Duration::from_millis(500), ledger.acquire_lock("default")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_file_ledger_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("ledger"));

        assert!(ledger.applied("default").await.unwrap().is_empty());
        ledger.record_applied("a", "default", "c1").await.unwrap();
        ledger.record_applied("b", "default", "c2").await.unwrap();

        let reopened = FileLedger::new(dir.path().join("ledger"));
        let applied = reopened.applied("default").await.unwrap();
        assert_eq!(
            applied.iter().map(|e| e.migration.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(applied[1].checksum, "c2");
    }

    #[tokio::test]
    async fn test_file_lock_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path());

        let lock = ledger.acquire_lock("default").await.unwrap();
        let err = ledger.acquire_lock("default").await.unwrap_err();
        assert!(matches!(err, MigrationError::LockFailed(_)));

        drop(lock);
        assert!(!dir.path().join("default.lock").exists());
        assert!(ledger.acquire_lock("default").await.is_ok());
    }

    #[test]
    fn test_engine_name_validation() {
        assert!(validate_engine_name("default").is_ok());
        assert!(validate_engine_name("read-replica_2").is_ok());
        assert!(validate_engine_name("").is_err());
        assert!(validate_engine_name("../etc").is_err());
    }
}
