//! Engine adapter seam.
//!
//! The migration engine never talks to a database itself. Each action of a
//! pending migration is handed to an [`EngineAdapter`], which executes it
//! against its own connection type.

use crate::action::Action;
use crate::error::EngineError;
use crate::model::FieldDescription;
use crate::state::SchemaState;

/// Executes actions against one kind of storage engine.
#[async_trait::async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Connection or session the adapter executes against.
    type Connection: Send;

    /// Execute one action.
    ///
    /// `schema` is the replayed state just before the action, so adapters
    /// can look up column names and referenced key types that the action
    /// itself does not carry.
    async fn apply_action(
        &self,
        action: &Action,
        schema: &SchemaState,
        conn: &mut Self::Connection,
    ) -> Result<(), EngineError>;

    /// Physical column type of a field.
    fn render_column_type(&self, field: &FieldDescription) -> String;

    /// Whether schema changes can be rolled back.
    ///
    /// When `true`, every migration is wrapped in [`begin`](Self::begin) and
    /// [`commit`](Self::commit), and a failing action triggers
    /// [`rollback`](Self::rollback).
    fn supports_transactional_ddl(&self) -> bool;

    /// Start a transaction.
    async fn begin(&self, _conn: &mut Self::Connection) -> Result<(), EngineError> {
        Ok(())
    }

    /// Commit the current transaction.
    async fn commit(&self, _conn: &mut Self::Connection) -> Result<(), EngineError> {
        Ok(())
    }

    /// Roll back the current transaction.
    async fn rollback(&self, _conn: &mut Self::Connection) -> Result<(), EngineError> {
        Ok(())
    }
}
