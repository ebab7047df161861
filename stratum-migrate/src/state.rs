//! Reconstructed schema state.

use std::collections::BTreeMap;

use crate::model::ModelDescription;

/// The schema of one engine at a point in its migration chain.
///
/// Only ever produced by replaying actions (or, for comparisons, from a live
/// model set). It is never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaState {
    models: BTreeMap<String, ModelDescription>,
}

impl SchemaState {
    /// The empty state every replay starts from.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state implied by a set of model descriptions.
    pub fn from_models(models: impl IntoIterator<Item = ModelDescription>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.name.clone(), m)).collect(),
        }
    }

    /// Get a model by name.
    pub fn model(&self, name: &str) -> Option<&ModelDescription> {
        self.models.get(name)
    }

    /// Get a mutable model by name.
    pub(crate) fn model_mut(&mut self, name: &str) -> Option<&mut ModelDescription> {
        self.models.get_mut(name)
    }

    /// Check if a model exists.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub(crate) fn insert(&mut self, model: ModelDescription) {
        self.models.insert(model.name.clone(), model);
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<ModelDescription> {
        self.models.remove(name)
    }

    /// Iterate over models in name order.
    pub fn models(&self) -> impl Iterator<Item = &ModelDescription> {
        self.models.values()
    }

    /// Model names in name order.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// Clone the models out, e.g. to diff a state against itself.
    pub fn to_models(&self) -> Vec<ModelDescription> {
        self.models.values().cloned().collect()
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if the state has no models.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDescription;

    #[test]
    fn test_from_models() {
        let state = SchemaState::from_models([
            ModelDescription::new("User", [FieldDescription::text("name")]),
            ModelDescription::new("Post", [FieldDescription::text("title")]),
        ]);

        assert_eq!(state.len(), 2);
        assert!(state.contains("User"));
        assert_eq!(state.model_names().collect::<Vec<_>>(), vec!["Post", "User"]);
        assert_eq!(SchemaState::from_models(state.to_models()), state);
    }

    #[test]
    fn test_empty() {
        assert!(SchemaState::new().is_empty());
    }
}
