//! Atomic schema-changing actions.
//!
//! An [`Action`] is one step of a migration. Every action can be applied
//! forward against a [`SchemaState`] and serialized into a migration file.
//! Application is pure: the same action on the same state always yields the
//! same result, and a failed precondition leaves the state untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InconsistentState;
use crate::model::{FieldDescription, IndexDescription, ModelDescription};
use crate::state::SchemaState;

/// One atomic schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Create a model with its initial fields.
    CreateModel {
        /// Model name.
        name: String,
        /// Initial fields.
        fields: Vec<FieldDescription>,
    },
    /// Delete a model.
    DeleteModel {
        /// Model name.
        name: String,
    },
    /// Add a field to a model.
    AddField {
        /// Model name.
        model: String,
        /// The new field.
        field: FieldDescription,
    },
    /// Remove a field from a model.
    RemoveField {
        /// Model name.
        model: String,
        /// The removed field as it was last described.
        field: FieldDescription,
    },
    /// Change the description of a field.
    ChangeField {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// Expected current description.
        from: FieldDescription,
        /// New description.
        to: FieldDescription,
    },
    /// Rename a field, keeping every other attribute.
    RenameField {
        /// Model name.
        model: String,
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Add a declared index.
    AddIndex {
        /// Model name.
        model: String,
        /// The index.
        index: IndexDescription,
    },
    /// Remove a declared index.
    RemoveIndex {
        /// Model name.
        model: String,
        /// The index.
        index: IndexDescription,
    },
    /// Opaque data fix-up forwarded to the engine adapter.
    RunDataOperation {
        /// Operation name.
        name: String,
        /// Adapter-specific payload.
        payload: String,
    },
}

impl Action {
    /// Apply this action to `state`.
    pub fn apply(&self, state: &mut SchemaState) -> Result<(), InconsistentState> {
        match self {
            Self::CreateModel { name, fields } => {
                if state.contains(name) {
                    return Err(InconsistentState::new(format!(
                        "cannot create model '{name}': it already exists"
                    )));
                }
                let model = ModelDescription::new(name.clone(), fields.iter().cloned());
                if model.fields.len() != fields.len() {
                    return Err(InconsistentState::new(format!(
                        "cannot create model '{name}': duplicate field names"
                    )));
                }
                state.insert(model);
            }
            Self::DeleteModel { name } => {
                if state.remove(name).is_none() {
                    return Err(InconsistentState::new(format!(
                        "cannot delete model '{name}': it does not exist"
                    )));
                }
            }
            Self::AddField { model, field } => {
                let target = existing_model(state, model)?;
                if target.fields.contains_key(&field.name) {
                    return Err(InconsistentState::new(format!(
                        "cannot add field '{model}.{}': it already exists",
                        field.name
                    )));
                }
                target.fields.insert(field.name.clone(), field.clone());
            }
            Self::RemoveField { model, field } => {
                let target = existing_model(state, model)?;
                if !target.fields.contains_key(&field.name) {
                    return Err(InconsistentState::new(format!(
                        "cannot remove field '{model}.{}': it does not exist",
                        field.name
                    )));
                }
                if let Some(index) = target.indexes.iter().find(|i| i.references(&field.name)) {
                    return Err(InconsistentState::new(format!(
                        "cannot remove field '{model}.{}': index ({}) still references it",
                        field.name,
                        index.fields.join(", ")
                    )));
                }
                target.fields.shift_remove(&field.name);
            }
            Self::ChangeField {
                model,
                field,
                from,
                to,
            } => {
                if to.name != *field {
                    return Err(InconsistentState::new(format!(
                        "cannot change field '{model}.{field}': new description is named '{}'",
                        to.name
                    )));
                }
                let target = existing_model(state, model)?;
                let current = target.fields.get_mut(field).ok_or_else(|| {
                    InconsistentState::new(format!(
                        "cannot change field '{model}.{field}': it does not exist"
                    ))
                })?;
                if current != from {
                    return Err(InconsistentState::new(format!(
                        "cannot change field '{model}.{field}': current description does not match \
                         the expected one (the migration was built against a different baseline)"
                    )));
                }
                *current = to.clone();
            }
            Self::RenameField { model, from, to } => {
                let target = existing_model(state, model)?;
                if target.fields.contains_key(to) {
                    return Err(InconsistentState::new(format!(
                        "cannot rename '{model}.{from}' to '{to}': target name already exists"
                    )));
                }
                let index = target.fields.get_index_of(from).ok_or_else(|| {
                    InconsistentState::new(format!(
                        "cannot rename '{model}.{from}': it does not exist"
                    ))
                })?;
                let (_, field) = target.fields.shift_remove_index(index).ok_or_else(|| {
                    InconsistentState::new(format!("cannot rename '{model}.{from}'"))
                })?;
                let (new_index, _) = target.fields.insert_full(to.clone(), field.renamed(to.clone()));
                target.fields.move_index(new_index, index);

                target.indexes = std::mem::take(&mut target.indexes)
                    .into_iter()
                    .map(|mut idx| {
                        for name in idx.fields.iter_mut() {
                            if name == from {
                                *name = to.clone();
                            }
                        }
                        idx
                    })
                    .collect();
            }
            Self::AddIndex { model, index } => {
                let target = existing_model(state, model)?;
                if let Some(missing) = index.fields.iter().find(|f| !target.fields.contains_key(*f)) {
                    return Err(InconsistentState::new(format!(
                        "cannot add index on '{model}': unknown field '{missing}'"
                    )));
                }
                if !target.indexes.insert(index.clone()) {
                    return Err(InconsistentState::new(format!(
                        "cannot add index ({}) on '{model}': it already exists",
                        index.fields.join(", ")
                    )));
                }
            }
            Self::RemoveIndex { model, index } => {
                let target = existing_model(state, model)?;
                if !target.indexes.remove(index) {
                    return Err(InconsistentState::new(format!(
                        "cannot remove index ({}) on '{model}': it does not exist",
                        index.fields.join(", ")
                    )));
                }
            }
            Self::RunDataOperation { .. } => {}
        }

        Ok(())
    }

    /// The model this action targets, if any.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::CreateModel { name, .. } | Self::DeleteModel { name } => Some(name),
            Self::AddField { model, .. }
            | Self::RemoveField { model, .. }
            | Self::ChangeField { model, .. }
            | Self::RenameField { model, .. }
            | Self::AddIndex { model, .. }
            | Self::RemoveIndex { model, .. } => Some(model),
            Self::RunDataOperation { .. } => None,
        }
    }

    /// Whether applying this action drops stored data.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::DeleteModel { .. } | Self::RemoveField { .. })
    }

    /// Short snake_case name of the action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateModel { .. } => "create_model",
            Self::DeleteModel { .. } => "delete_model",
            Self::AddField { .. } => "add_field",
            Self::RemoveField { .. } => "remove_field",
            Self::ChangeField { .. } => "change_field",
            Self::RenameField { .. } => "rename_field",
            Self::AddIndex { .. } => "add_index",
            Self::RemoveIndex { .. } => "remove_index",
            Self::RunDataOperation { .. } => "run_data_operation",
        }
    }

    /// A one-line human readable description.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateModel { name, fields } => {
                write!(f, "Create model {} ({} fields)", name, fields.len())
            }
            Self::DeleteModel { name } => write!(f, "Delete model {}", name),
            Self::AddField { model, field } => write!(f, "Add field {} to {}", field.name, model),
            Self::RemoveField { model, field } => {
                write!(f, "Remove field {} from {}", field.name, model)
            }
            Self::ChangeField { model, field, .. } => {
                write!(f, "Change field {} on {}", field, model)
            }
            Self::RenameField { model, from, to } => {
                write!(f, "Rename field {} on {} to {}", from, model, to)
            }
            Self::AddIndex { model, index } => write!(
                f,
                "Add {}index on {} ({})",
                if index.unique { "unique " } else { "" },
                model,
                index.fields.join(", ")
            ),
            Self::RemoveIndex { model, index } => write!(
                f,
                "Remove {}index on {} ({})",
                if index.unique { "unique " } else { "" },
                model,
                index.fields.join(", ")
            ),
            Self::RunDataOperation { name, .. } => write!(f, "Run data operation {}", name),
        }
    }
}

fn existing_model<'a>(
    state: &'a mut SchemaState,
    name: &str,
) -> Result<&'a mut ModelDescription, InconsistentState> {
    state
        .model_mut(name)
        .ok_or_else(|| InconsistentState::new(format!("model '{name}' does not exist")))
}
