//! Schema state reconstruction by replaying migrations.

use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::migration::Migration;
use crate::state::SchemaState;

/// Replay every migration, in slice order, over the empty state.
///
/// Fails fast on the first action whose preconditions do not hold. The
/// error names the migration and the index of the failing action.
pub fn reconstruct(migrations: &[Migration]) -> MigrateResult<SchemaState> {
    let mut state = SchemaState::new();
    for migration in migrations {
        replay_into(&mut state, migration)?;
    }
    debug!(
        migrations = migrations.len(),
        models = state.len(),
        "Reconstructed schema state"
    );
    Ok(state)
}

/// Replay through the named migration, inclusive.
pub fn reconstruct_up_to(migrations: &[Migration], name: &str) -> MigrateResult<SchemaState> {
    let end = migrations
        .iter()
        .position(|m| m.name == name)
        .ok_or_else(|| MigrationError::NotFound(name.to_string()))?;
    reconstruct(&migrations[..=end])
}

/// Replay through `last`, or return the empty state when nothing is applied.
pub fn reconstruct_through(
    migrations: &[Migration],
    last: Option<&str>,
) -> MigrateResult<SchemaState> {
    match last {
        Some(name) => reconstruct_up_to(migrations, name),
        None => Ok(SchemaState::new()),
    }
}

/// Apply one migration's actions to `state`.
pub(crate) fn replay_into(state: &mut SchemaState, migration: &Migration) -> MigrateResult<()> {
    for (index, action) in migration.operations.iter().enumerate() {
        action
            .apply(state)
            .map_err(|source| MigrationError::Replay {
                migration: migration.name.clone(),
                index,
                source,
            })?;
    }
    Ok(())
}
