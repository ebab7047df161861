//! CLI error types and result alias.

use miette::Diagnostic;
use stratum_migrate::MigrationError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Exit code of configuration errors.
pub const CONFIG_EXIT_CODE: i32 = 62;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(stratum::io))]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    #[diagnostic(code(stratum::config), help("check stratum.toml"))]
    Config(String),

    /// Model file error
    #[error("Model file error: {0}")]
    #[diagnostic(code(stratum::models))]
    Models(String),

    /// Migration engine error
    #[error("{0}")]
    #[diagnostic(code(stratum::migration))]
    Migration(#[from] MigrationError),

    /// Command error
    #[error("Command error: {0}")]
    #[diagnostic(code(stratum::command))]
    Command(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 60,
            Self::Config(_) => CONFIG_EXIT_CODE,
            Self::Models(_) => 31,
            Self::Migration(e) => e.exit_code(),
            Self::Command(_) => 1,
        }
    }

    /// Suggested next step, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Migration(MigrationError::MultipleHeads { .. }) => {
                Some("write a migration that depends on one head and re-parent the other")
            }
            Self::Migration(MigrationError::ChecksumMismatch { .. }) => {
                Some("applied migrations are immutable; restore the file or write a new migration")
            }
            Self::Migration(MigrationError::LockFailed(_)) => {
                Some("wait for the running migration to finish")
            }
            Self::Migration(MigrationError::Engine { partial: true, .. }) => {
                Some("repair the database by hand before running migrate again")
            }
            _ => None,
        }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Command(format!("Failed to serialize JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_migration_errors() {
        let err: CliError = MigrationError::Cycle {
            engine: "default".into(),
            path: vec!["a".into(), "b".into(), "a".into()],
        }
        .into();
        assert_eq!(err.exit_code(), 10);
        assert!(err.to_string().contains("a -> b -> a"));

        let err: CliError = MigrationError::NoChanges.into();
        assert_eq!(err.exit_code(), 0);

        assert_eq!(CliError::Config("bad".into()).exit_code(), CONFIG_EXIT_CODE);
    }

    #[test]
    fn test_hints() {
        let err: CliError = MigrationError::MultipleHeads {
            engine: "default".into(),
            heads: vec!["a".into(), "b".into()],
        }
        .into();
        assert!(err.hint().is_some());
        assert!(CliError::Command("x".into()).hint().is_none());
    }
}
