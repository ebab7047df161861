//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Broad grouping of migration errors, used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The migration history itself is malformed.
    History,
    /// Replaying the history failed.
    Replay,
    /// The live model set cannot be diffed.
    Diff,
    /// The engine adapter failed while applying actions.
    Application,
    /// Filesystem, serialization and other ambient failures.
    Environment,
}

/// An action's preconditions did not hold against the current schema state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct InconsistentState {
    /// What was wrong.
    pub reason: String,
}

impl InconsistentState {
    /// Create a new inconsistent state error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Kind of failure reported by an engine adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorKind {
    /// A constraint was violated by the DDL.
    Constraint,
    /// The connection to the engine failed.
    Connectivity,
    /// The engine did not answer in time.
    Timeout,
    /// The adapter cannot express the action.
    Unsupported,
    /// Anything else.
    Other,
}

/// Error raised by an engine adapter while executing an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct EngineError {
    /// Failure kind.
    pub kind: EngineErrorKind,
    /// Adapter supplied message.
    pub message: String,
}

impl EngineError {
    /// Create a new engine error.
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Constraint, message)
    }

    /// Create a connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Connectivity, message)
    }

    /// Create an unsupported action error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Unsupported, message)
    }
}

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration, ledger or model file could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid migration file or format.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// Invalid model description.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Migration not found.
    #[error("Migration '{0}' not found")]
    NotFound(String),

    /// Following `depends_on` pointers revisited a migration.
    #[error("Dependency cycle in engine '{engine}': {}", .path.join(" -> "))]
    Cycle {
        /// Engine name.
        engine: String,
        /// Migrations forming the cycle, first entry repeated at the end.
        path: Vec<String>,
    },

    /// A `depends_on` reference points at an unknown migration.
    #[error("Migration '{migration}' depends on unknown migration '{dependency}' (engine '{engine}')")]
    MissingDependency {
        /// Engine name.
        engine: String,
        /// The migration holding the reference.
        migration: String,
        /// The unresolved parent name.
        dependency: String,
    },

    /// More than one migration is not depended upon by any other.
    #[error(
        "Multiple heads in engine '{engine}': {}. Merge the conflicting migrations by hand",
        .heads.join(", ")
    )]
    MultipleHeads {
        /// Engine name.
        engine: String,
        /// Head migration names, sorted.
        heads: Vec<String>,
    },

    /// The ledger records a migration that is not part of the chain.
    #[error("Ledger for engine '{engine}' records '{migration}', which is not in the migration chain")]
    LedgerMismatch {
        /// Engine name.
        engine: String,
        /// The recorded migration name.
        migration: String,
    },

    /// Migration checksum mismatch.
    #[error("Checksum mismatch for migration '{id}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Migration ID.
        id: String,
        /// Expected checksum.
        expected: String,
        /// Actual checksum.
        actual: String,
    },

    /// An action's preconditions failed outside of a replay.
    #[error("Inconsistent state: {0}")]
    InconsistentState(#[from] InconsistentState),

    /// An action failed while replaying a migration.
    #[error("Replay of migration '{migration}' failed at action #{index}: {source}")]
    Replay {
        /// Migration being replayed.
        migration: String,
        /// Index of the failing action within the migration.
        index: usize,
        /// Underlying precondition failure.
        #[source]
        source: InconsistentState,
    },

    /// A live foreign key targets a model that is missing from the live set.
    #[error("Foreign key '{model}.{field}' references model '{target}', which does not exist")]
    DanglingForeignKey {
        /// Model holding the foreign key.
        model: String,
        /// Foreign key field.
        field: String,
        /// Missing target model.
        target: String,
    },

    /// No changes to migrate.
    #[error("No schema changes detected")]
    NoChanges,

    /// The engine adapter failed.
    #[error("{}", engine_message(.migration, .action_index, .partial, .source))]
    Engine {
        /// Migration being applied.
        migration: String,
        /// Index of the failing action.
        action_index: usize,
        /// Whether earlier actions of the migration were applied and not rolled back.
        partial: bool,
        /// Adapter error.
        #[source]
        source: EngineError,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire migration lock: {0}")]
    LockFailed(String),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

fn engine_message(migration: &str, index: &usize, partial: &bool, source: &EngineError) -> String {
    if *partial {
        format!(
            "Engine error applying '{migration}' at action #{index}: {source}. \
             The migration was partially applied and could not be rolled back; \
             manual intervention is required before retrying"
        )
    } else {
        format!("Engine error applying '{migration}' at action #{index}: {source}")
    }
}

impl MigrationError {
    /// Create a serialization error.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid model error.
    pub fn invalid_model(msg: impl Into<String>) -> Self {
        Self::InvalidModel(msg.into())
    }

    /// Create a migration file error.
    pub fn migration_file(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create a lock failed error.
    pub fn lock_failed(msg: impl Into<String>) -> Self {
        Self::LockFailed(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if this is a recoverable error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockFailed(_) | Self::NoChanges)
    }

    /// The category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Cycle { .. }
            | Self::MissingDependency { .. }
            | Self::MultipleHeads { .. }
            | Self::LedgerMismatch { .. }
            | Self::ChecksumMismatch { .. } => ErrorCategory::History,
            Self::InconsistentState(_) | Self::Replay { .. } => ErrorCategory::Replay,
            Self::DanglingForeignKey { .. } | Self::InvalidModel(_) | Self::NoChanges => {
                ErrorCategory::Diff
            }
            Self::Engine { .. } | Self::LockFailed(_) => ErrorCategory::Application,
            Self::Io(_)
            | Self::Serialization(_)
            | Self::InvalidMigration(_)
            | Self::NotFound(_)
            | Self::Other(_) => ErrorCategory::Environment,
        }
    }

    /// Process exit code for this error. Every error kind maps to its own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoChanges => 0,
            Self::Cycle { .. } => 10,
            Self::MissingDependency { .. } => 11,
            Self::MultipleHeads { .. } => 12,
            Self::LedgerMismatch { .. } => 13,
            Self::ChecksumMismatch { .. } => 14,
            Self::Replay { .. } | Self::InconsistentState(_) => 20,
            Self::DanglingForeignKey { .. } => 30,
            Self::InvalidModel(_) => 31,
            Self::Engine { .. } => 40,
            Self::LockFailed(_) => 41,
            Self::InvalidMigration(_) => 50,
            Self::NotFound(_) => 51,
            Self::Io(_) => 60,
            Self::Serialization(_) => 61,
            Self::Other(_) => 1,
        }
    }
}

impl From<toml::de::Error> for MigrationError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(format!("Failed to parse TOML: {}", err))
    }
}

impl From<toml::ser::Error> for MigrationError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(format!("Failed to serialize TOML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::NotFound("0001_20240101120000_initial".to_string());
        assert!(err.to_string().contains("0001_20240101120000_initial"));
    }

    #[test]
    fn test_cycle_display() {
        let err = MigrationError::Cycle {
            engine: "default".to_string(),
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "Dependency cycle in engine 'default': a -> b -> a"
        );
    }

    #[test]
    fn test_partial_engine_error_requires_manual_intervention() {
        let err = MigrationError::Engine {
            migration: "0002_x".to_string(),
            action_index: 1,
            partial: true,
            source: EngineError::constraint("duplicate column"),
        };
        let msg = err.to_string();
        assert!(msg.contains("manual intervention is required"));
        assert!(msg.contains("duplicate column"));

        let err = MigrationError::Engine {
            migration: "0002_x".to_string(),
            action_index: 0,
            partial: false,
            source: EngineError::connectivity("refused"),
        };
        assert!(!err.to_string().contains("manual intervention"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(MigrationError::NoChanges.is_recoverable());
        assert!(MigrationError::LockFailed("held".to_string()).is_recoverable());
        assert!(!MigrationError::Other("boom".to_string()).is_recoverable());
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = vec![
            MigrationError::Cycle {
                engine: String::new(),
                path: vec![],
            },
            MigrationError::MissingDependency {
                engine: String::new(),
                migration: String::new(),
                dependency: String::new(),
            },
            MigrationError::MultipleHeads {
                engine: String::new(),
                heads: vec![],
            },
            MigrationError::LedgerMismatch {
                engine: String::new(),
                migration: String::new(),
            },
            MigrationError::ChecksumMismatch {
                id: String::new(),
                expected: String::new(),
                actual: String::new(),
            },
            MigrationError::Replay {
                migration: String::new(),
                index: 0,
                source: InconsistentState::new("x"),
            },
            MigrationError::DanglingForeignKey {
                model: String::new(),
                field: String::new(),
                target: String::new(),
            },
            MigrationError::invalid_model("x"),
            MigrationError::Engine {
                migration: String::new(),
                action_index: 0,
                partial: false,
                source: EngineError::constraint("x"),
            },
            MigrationError::lock_failed("x"),
            MigrationError::migration_file("x"),
            MigrationError::NotFound(String::new()),
            MigrationError::serialization("x"),
        ];

        let mut codes: Vec<i32> = errors.iter().map(MigrationError::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        let len = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), len);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            MigrationError::MultipleHeads {
                engine: "a".into(),
                heads: vec![]
            }
            .category(),
            ErrorCategory::History
        );
        assert_eq!(MigrationError::NoChanges.category(), ErrorCategory::Diff);
        assert_eq!(
            MigrationError::lock_failed("x").category(),
            ErrorCategory::Application
        );
    }
}
