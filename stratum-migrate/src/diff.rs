//! Schema diffing for generating migrations.
//!
//! The differ compares a reconstructed baseline [`SchemaState`] with the live
//! model descriptions and produces the ordered actions that turn one into the
//! other. Actions are collected into buckets and emitted bucket by bucket:
//!
//! ```text
//! CreateModel -> RemoveIndex -> RenameField -> ChangeField
//!             -> AddField -> AddIndex -> RemoveField -> DeleteModel
//! ```

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::action::Action;
use crate::error::{MigrateResult, MigrationError};
use crate::model::{FieldDescription, IndexDescription, ModelDescription};
use crate::state::SchemaState;

/// Ordered actions produced by [`SchemaDiffer::diff`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Models to create, referenced models first.
    pub create_models: Vec<Action>,
    /// Indexes to drop.
    pub remove_indexes: Vec<Action>,
    /// Fields to rename.
    pub rename_fields: Vec<Action>,
    /// Fields to alter.
    pub change_fields: Vec<Action>,
    /// Fields to add.
    pub add_fields: Vec<Action>,
    /// Indexes to create, including those of new models.
    pub add_indexes: Vec<Action>,
    /// Fields to drop.
    pub remove_fields: Vec<Action>,
    /// Models to delete, referencing models first.
    pub delete_models: Vec<Action>,
}

impl SchemaDiff {
    /// Check if there are any differences.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of actions.
    pub fn len(&self) -> usize {
        self.buckets().map(|b| b.len()).sum()
    }

    fn buckets(&self) -> impl Iterator<Item = &Vec<Action>> {
        [
            &self.create_models,
            &self.remove_indexes,
            &self.rename_fields,
            &self.change_fields,
            &self.add_fields,
            &self.add_indexes,
            &self.remove_fields,
            &self.delete_models,
        ]
        .into_iter()
    }

    /// Iterate over the actions in application order.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.buckets().flatten()
    }

    /// The actions in application order.
    pub fn actions(&self) -> Vec<Action> {
        self.iter().cloned().collect()
    }

    /// Consume the diff into its actions, in application order.
    pub fn into_actions(self) -> Vec<Action> {
        let mut actions = Vec::with_capacity(self.len());
        actions.extend(self.create_models);
        actions.extend(self.remove_indexes);
        actions.extend(self.rename_fields);
        actions.extend(self.change_fields);
        actions.extend(self.add_fields);
        actions.extend(self.add_indexes);
        actions.extend(self.remove_fields);
        actions.extend(self.delete_models);
        actions
    }

    /// Check if any action drops stored data.
    pub fn is_destructive(&self) -> bool {
        self.iter().any(Action::is_destructive)
    }

    /// Get a human-readable summary of the diff.
    pub fn summary(&self) -> String {
        let counts = [
            ("Create", self.create_models.len(), "models"),
            ("Remove", self.remove_indexes.len(), "indexes"),
            ("Rename", self.rename_fields.len(), "fields"),
            ("Change", self.change_fields.len(), "fields"),
            ("Add", self.add_fields.len(), "fields"),
            ("Add", self.add_indexes.len(), "indexes"),
            ("Remove", self.remove_fields.len(), "fields"),
            ("Delete", self.delete_models.len(), "models"),
        ];

        let parts: Vec<String> = counts
            .iter()
            .filter(|(_, count, _)| *count > 0)
            .map(|(verb, count, noun)| format!("{} {} {}", verb, count, noun))
            .collect();

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Schema differ comparing a baseline state with live models.
pub struct SchemaDiffer<'a> {
    baseline: &'a SchemaState,
}

impl<'a> SchemaDiffer<'a> {
    /// Create a new differ against a reconstructed baseline.
    pub fn new(baseline: &'a SchemaState) -> Self {
        Self { baseline }
    }

    /// Compute the actions that turn the baseline into `live`.
    pub fn diff(&self, live: &[ModelDescription]) -> MigrateResult<SchemaDiff> {
        let live = index_live(live)?;
        check_relations(&live)?;

        let mut result = SchemaDiff::default();

        let created: Vec<&str> = live
            .keys()
            .copied()
            .filter(|name| !self.baseline.contains(name))
            .collect();
        for (name, deferred) in creation_order(&created, &live) {
            let model = live[name];
            let (fields, later): (Vec<FieldDescription>, Vec<FieldDescription>) = model
                .fields
                .values()
                .cloned()
                .partition(|f| !deferred.contains(&f.name));
            result.create_models.push(Action::CreateModel {
                name: model.name.clone(),
                fields,
            });
            for field in later {
                result.add_fields.push(Action::AddField {
                    model: model.name.clone(),
                    field,
                });
            }
            for index in &model.indexes {
                result.add_indexes.push(Action::AddIndex {
                    model: model.name.clone(),
                    index: index.clone(),
                });
            }
        }

        for (name, model) in &live {
            if let Some(existing) = self.baseline.model(name) {
                diff_model(existing, model, &mut result);
            }
        }

        let deleted: Vec<&ModelDescription> = self
            .baseline
            .models()
            .filter(|m| !live.contains_key(m.name.as_str()))
            .collect();
        delete_models(&deleted, &mut result);

        debug!(
            baseline = self.baseline.len(),
            live = live.len(),
            actions = result.len(),
            "Computed schema diff: {}",
            result.summary()
        );

        Ok(result)
    }
}

fn index_live(live: &[ModelDescription]) -> MigrateResult<BTreeMap<&str, &ModelDescription>> {
    let mut models = BTreeMap::new();
    for model in live {
        model.validate()?;
        if models.insert(model.name.as_str(), model).is_some() {
            return Err(MigrationError::invalid_model(format!(
                "model '{}' is declared more than once",
                model.name
            )));
        }
    }
    Ok(models)
}

/// Every live foreign key must point at a live model and an existing field.
fn check_relations(live: &BTreeMap<&str, &ModelDescription>) -> MigrateResult<()> {
    for model in live.values() {
        for (field, relation) in model.relations() {
            let target = live.get(relation.model.as_str()).ok_or_else(|| {
                MigrationError::DanglingForeignKey {
                    model: model.name.clone(),
                    field: field.name.clone(),
                    target: relation.model.clone(),
                }
            })?;
            if target.field(&relation.field).is_none() {
                return Err(MigrationError::invalid_model(format!(
                    "foreign key '{}.{}' references unknown field '{}.{}'",
                    model.name, field.name, relation.model, relation.field
                )));
            }
        }
    }
    Ok(())
}

/// Order new models so referenced models come first.
///
/// When the remaining models only reference each other, the first by name is
/// created without its foreign keys into that group. The names of those
/// fields are returned with it and added once every model exists.
fn creation_order<'m>(
    created: &[&'m str],
    live: &BTreeMap<&str, &ModelDescription>,
) -> Vec<(&'m str, BTreeSet<String>)> {
    let mut remaining: BTreeSet<&str> = created.iter().copied().collect();
    let mut order = Vec::with_capacity(created.len());

    while !remaining.is_empty() {
        let ready = remaining.iter().copied().find(|name| {
            live[name]
                .referenced_models()
                .iter()
                .all(|target| !remaining.contains(target))
        });
        let (next, deferred) = match ready {
            Some(name) => (name, BTreeSet::new()),
            None => {
                let Some(name) = remaining.first().copied() else {
                    break;
                };
                let deferred = live[name]
                    .relations()
                    .filter(|(_, r)| r.model != name && remaining.contains(r.model.as_str()))
                    .map(|(f, _)| f.name.clone())
                    .collect();
                (name, deferred)
            }
        };
        remaining.remove(next);
        order.push((next, deferred));
    }

    order
}

/// Diff a model present on both sides.
fn diff_model(old: &ModelDescription, new: &ModelDescription, result: &mut SchemaDiff) {
    let model = new.name.clone();

    let removed: Vec<&FieldDescription> = old
        .fields
        .values()
        .filter(|f| !new.fields.contains_key(&f.name))
        .collect();
    let added: Vec<&FieldDescription> = new
        .fields
        .values()
        .filter(|f| !old.fields.contains_key(&f.name))
        .collect();

    let rename = match (removed.as_slice(), added.as_slice()) {
        ([from], [to]) if from.same_shape(to) => Some((from.name.clone(), to.name.clone())),
        _ => None,
    };

    // Baseline indexes as they will look once the rename has been applied.
    let renamed_index = |index: &IndexDescription| -> IndexDescription {
        match &rename {
            Some((from, to)) => IndexDescription {
                fields: index
                    .fields
                    .iter()
                    .map(|f| if f == from { to.clone() } else { f.clone() })
                    .collect(),
                unique: index.unique,
            },
            None => index.clone(),
        }
    };
    let carried: BTreeSet<IndexDescription> = old.indexes.iter().map(renamed_index).collect();

    for index in &old.indexes {
        if !new.indexes.contains(&renamed_index(index)) {
            result.remove_indexes.push(Action::RemoveIndex {
                model: model.clone(),
                index: index.clone(),
            });
        }
    }

    if let Some((from, to)) = &rename {
        result.rename_fields.push(Action::RenameField {
            model: model.clone(),
            from: from.clone(),
            to: to.clone(),
        });
    }

    for (name, before) in &old.fields {
        let Some(after) = new.fields.get(name) else {
            continue;
        };
        if before != after {
            result.change_fields.push(Action::ChangeField {
                model: model.clone(),
                field: name.clone(),
                from: before.clone(),
                to: after.clone(),
            });
        }
    }

    if rename.is_none() {
        for field in &added {
            result.add_fields.push(Action::AddField {
                model: model.clone(),
                field: (*field).clone(),
            });
        }
    }

    for index in new.indexes.difference(&carried) {
        result.add_indexes.push(Action::AddIndex {
            model: model.clone(),
            index: index.clone(),
        });
    }

    if rename.is_none() {
        for field in &removed {
            result.remove_fields.push(Action::RemoveField {
                model: model.clone(),
                field: (*field).clone(),
            });
        }
    }
}

/// Delete models referencing-first, breaking foreign key cycles among them.
fn delete_models(deleted: &[&ModelDescription], result: &mut SchemaDiff) {
    let mut remaining: BTreeMap<&str, &ModelDescription> =
        deleted.iter().map(|m| (m.name.as_str(), *m)).collect();
    // Foreign key fields already dropped to break a cycle.
    let mut dropped: BTreeSet<(String, String)> = BTreeSet::new();

    let referenced_by_others = |name: &str,
                                remaining: &BTreeMap<&str, &ModelDescription>,
                                dropped: &BTreeSet<(String, String)>|
     -> bool {
        remaining.values().any(|other| {
            other.name != name
                && other.relations().any(|(field, relation)| {
                    relation.model == name
                        && !dropped.contains(&(other.name.clone(), field.name.clone()))
                })
        })
    };

    while !remaining.is_empty() {
        let ready = remaining
            .keys()
            .copied()
            .find(|name| !referenced_by_others(name, &remaining, &dropped));

        let next = match ready {
            Some(name) => name,
            None => {
                let Some(victim) = remaining.keys().next().copied() else {
                    break;
                };
                for other in remaining.values().filter(|m| m.name != victim) {
                    for (field, relation) in other.relations() {
                        let key = (other.name.clone(), field.name.clone());
                        if relation.model != victim || dropped.contains(&key) {
                            continue;
                        }
                        for index in other.indexes.iter().filter(|i| i.references(&field.name)) {
                            let action = Action::RemoveIndex {
                                model: other.name.clone(),
                                index: index.clone(),
                            };
                            if !result.remove_indexes.contains(&action) {
                                result.remove_indexes.push(action);
                            }
                        }
                        result.remove_fields.push(Action::RemoveField {
                            model: other.name.clone(),
                            field: field.clone(),
                        });
                        dropped.insert(key);
                    }
                }
                victim
            }
        };

        remaining.remove(next);
        result.delete_models.push(Action::DeleteModel {
            name: next.to_string(),
        });
    }
}
