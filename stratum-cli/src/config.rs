//! CLI configuration handling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CliError, CliResult};

/// Default config file name (lives in project root)
pub const CONFIG_FILE_NAME: &str = "stratum.toml";

/// Default migrations directory (relative to project root)
pub const MIGRATIONS_DIR: &str = "migrations";

/// Default ledger directory (relative to project root)
pub const LEDGER_DIR: &str = ".stratum";

/// Engine used when none is configured
pub const DEFAULT_ENGINE: &str = "default";

/// Stratum CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Migration configuration
    pub migrations: MigrationsConfig,

    /// Per-engine configuration, keyed by engine name
    pub engines: BTreeMap<String, EngineConfig>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default(path: &Path) -> CliResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self {
                root: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                ..Self::default()
            })
        }
    }

    /// Resolve a configured path against the config file's directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Absolute migrations directory
    pub fn migrations_dir(&self) -> PathBuf {
        self.resolve(&self.migrations.directory)
    }

    /// Absolute ledger directory
    pub fn ledger_dir(&self) -> PathBuf {
        self.resolve(&self.migrations.ledger_dir)
    }

    /// Engines a command runs against.
    ///
    /// An explicit selection wins; otherwise every configured engine, or the
    /// default engine when none is configured.
    pub fn select_engines(&self, selected: Option<&str>) -> Vec<String> {
        match selected {
            Some(engine) => vec![engine.to_string()],
            None if self.engines.is_empty() => vec![self.migrations.default_engine.clone()],
            None => self.engines.keys().cloned().collect(),
        }
    }

    /// Model file of an engine
    pub fn models_path(&self, engine: &str) -> CliResult<PathBuf> {
        self.engines
            .get(engine)
            .and_then(|e| e.models.as_ref())
            .map(|path| self.resolve(path))
            .ok_or_else(|| {
                CliError::Config(format!(
                    "engine '{}' has no models file; add `[engines.{}] models = \"...\"` to {}",
                    engine, engine, CONFIG_FILE_NAME
                ))
            })
    }
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Directory for migration files
    pub directory: PathBuf,

    /// Directory for ledger and lock files
    pub ledger_dir: PathBuf,

    /// Engine used when a command names none
    pub default_engine: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(MIGRATIONS_DIR),
            ledger_dir: PathBuf::from(LEDGER_DIR),
            default_engine: DEFAULT_ENGINE.to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the engine's model file
    pub models: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.migrations.directory, PathBuf::from("migrations"));
        assert_eq!(config.migrations.ledger_dir, PathBuf::from(".stratum"));
        assert_eq!(config.select_engines(None), vec!["default".to_string()]);
    }

    #[test]
    fn test_engines_table() {
        let config: Config = toml::from_str(
            r#"
[migrations]
directory = "db/migrations"

[engines.default]
models = "models.toml"

[engines.analytics]
models = "analytics.toml"
"#,
        )
        .unwrap();

        assert_eq!(
            config.select_engines(None),
            vec!["analytics".to_string(), "default".to_string()]
        );
        assert_eq!(config.select_engines(Some("default")), vec!["default".to_string()]);
        assert_eq!(config.migrations_dir(), PathBuf::from("db/migrations"));
        assert_eq!(
            config.models_path("analytics").unwrap(),
            PathBuf::from("analytics.toml")
        );
    }

    #[test]
    fn test_missing_models_is_config_error() {
        let config = Config::default();
        let err = config.models_path("default").unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 62);
    }

    #[test]
    fn test_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[engines.default]\nmodels = \"models.toml\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.migrations_dir(), dir.path().join("migrations"));
        assert_eq!(config.models_path("default").unwrap(), dir.path().join("models.toml"));
    }
}
