//! Migration documents, naming and checksums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::action::Action;
use crate::error::{MigrateResult, MigrationError};

/// Label used for the first migration of an engine.
pub const INITIAL_LABEL: &str = "initial";

/// Label used when no better one can be derived.
pub const AUTO_LABEL: &str = "auto";

const MAX_LABEL_LEN: usize = 48;

/// An immutable, ordered list of actions for one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    /// Unique name within the engine.
    pub name: String,
    /// Engine the migration belongs to.
    pub database: String,
    /// Parent migration in the same engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// Actions, applied in order.
    #[serde(default)]
    pub operations: Vec<Action>,
}

impl Migration {
    /// Create an empty root migration.
    pub fn new(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
            depends_on: None,
            operations: Vec::new(),
        }
    }

    /// Set the parent migration.
    pub fn depends_on(mut self, parent: impl Into<String>) -> Self {
        self.depends_on = Some(parent.into());
        self
    }

    /// Set the parent migration, if any.
    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.depends_on = parent;
        self
    }

    /// Append an action.
    pub fn operation(mut self, action: Action) -> Self {
        self.operations.push(action);
        self
    }

    /// Replace the actions.
    pub fn with_operations(mut self, operations: Vec<Action>) -> Self {
        self.operations = operations;
        self
    }

    /// Sequence number parsed from the name, if it follows the generated format.
    pub fn sequence(&self) -> Option<u32> {
        MigrationName::parse(&self.name).ok().map(|n| n.sequence)
    }

    /// Check if any action drops stored data.
    pub fn is_destructive(&self) -> bool {
        self.operations.iter().any(Action::is_destructive)
    }

    /// Render the canonical TOML document.
    pub fn to_toml(&self) -> MigrateResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> MigrateResult<Self> {
        let migration: Self = toml::from_str(content)?;
        if migration.name.trim().is_empty() {
            return Err(MigrationError::migration_file("migration name is empty"));
        }
        if migration.database.trim().is_empty() {
            return Err(MigrationError::migration_file(format!(
                "migration '{}' does not name its database",
                migration.name
            )));
        }
        Ok(migration)
    }

    /// SHA-256 checksum of the canonical TOML rendering.
    pub fn checksum(&self) -> MigrateResult<String> {
        Ok(compute_checksum(&self.to_toml()?))
    }
}

/// Parsed `NNNN_YYYYMMDDHHMMSS_label` migration name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationName {
    /// Monotonic sequence number.
    pub sequence: u32,
    /// UTC timestamp, `YYYYMMDDHHMMSS`.
    pub timestamp: String,
    /// Human label.
    pub label: String,
}

impl MigrationName {
    /// Generate a name for the given sequence number, time and label.
    pub fn generate(sequence: u32, at: DateTime<Utc>, label: &str) -> String {
        let label = sanitize_label(label);
        let label = if label.is_empty() { AUTO_LABEL.to_string() } else { label };
        format!("{:04}_{}_{}", sequence, at.format("%Y%m%d%H%M%S"), label)
    }

    /// Parse a generated name.
    pub fn parse(name: &str) -> MigrateResult<Self> {
        let invalid = || {
            MigrationError::migration_file(format!(
                "invalid migration name format: {}. Expected: NNNN_YYYYMMDDHHMMSS_label",
                name
            ))
        };

        let mut parts = name.splitn(3, '_');
        let sequence = parts.next().ok_or_else(invalid)?;
        let timestamp = parts.next().ok_or_else(invalid)?;
        let label = parts.next().ok_or_else(invalid)?;

        if sequence.len() < 4 || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if timestamp.len() != 14 || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if label.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            sequence: sequence.parse().map_err(|_| invalid())?,
            timestamp: timestamp.to_string(),
            label: label.to_string(),
        })
    }
}

/// Derive a label for a new migration from its actions.
pub fn suggest_label(actions: &[Action], initial: bool) -> String {
    if initial {
        return INITIAL_LABEL.to_string();
    }

    let label = match actions {
        [action] => match action {
            Action::CreateModel { name, .. } => format!("create_{}", name),
            Action::DeleteModel { name } => format!("delete_{}", name),
            Action::AddField { model, field } => format!("{}_{}", model, field.name),
            Action::RemoveField { model, field } => format!("remove_{}_{}", model, field.name),
            Action::ChangeField { model, field, .. } => format!("alter_{}_{}", model, field),
            Action::RenameField { model, from, to } => {
                format!("rename_{}_{}_{}", model, from, to)
            }
            Action::AddIndex { model, index } => format!("{}_{}_idx", model, index.fields.join("_")),
            Action::RemoveIndex { model, index } => {
                format!("remove_{}_{}_idx", model, index.fields.join("_"))
            }
            Action::RunDataOperation { name, .. } => name.clone(),
        },
        _ => AUTO_LABEL.to_string(),
    };

    let label = sanitize_label(&label);
    if label.is_empty() { AUTO_LABEL.to_string() } else { label }
}

/// Lowercase, replace non-alphanumerics with `_`, collapse runs and truncate.
fn sanitize_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.truncate(MAX_LABEL_LEN);
    out.trim_end_matches('_').to_string()
}

/// Compute a SHA256 checksum of the content.
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
