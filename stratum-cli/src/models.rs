//! Model file loading.
//!
//! A model file lists the live models of one engine:
//!
//! ```toml
//! [[models]]
//! name = "User"
//!
//! [[models.fields]]
//! name = "email"
//! type = { varchar = { max_length = 255 } }
//! unique = true
//!
//! [[models]]
//! name = "Post"
//!
//! [[models.fields]]
//! name = "author"
//! type = { foreign_key = { model = "User", on_delete = "cascade" } }
//! ```
//!
//! Every model is normalized the same way as [`ModelBuilder`] output, so a
//! missing primary key gets the default `id`.
//!
//! [`ModelBuilder`]: stratum_migrate::ModelBuilder

use std::path::Path;

use serde::Deserialize;
use stratum_migrate::ModelDescription;
use tracing::debug;

use crate::error::{CliError, CliResult};

#[derive(Debug, Default, Deserialize)]
struct ModelFile {
    #[serde(default)]
    models: Vec<ModelDescription>,
}

/// Parse model descriptions from TOML.
pub fn parse_models(content: &str) -> CliResult<Vec<ModelDescription>> {
    let file: ModelFile =
        toml::from_str(content).map_err(|e| CliError::Models(e.to_string()))?;
    file.models
        .into_iter()
        .map(|model| model.finalize().map_err(CliError::from))
        .collect()
}

/// Load the model file at `path`.
pub fn load_models(path: &Path) -> CliResult<Vec<ModelDescription>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::Models(format!("cannot read {}: {}", path.display(), e))
    })?;
    let models = parse_models(&content)
        .map_err(|e| match e {
            CliError::Models(msg) => CliError::Models(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
    debug!(path = %path.display(), count = models.len(), "Loaded models");
    Ok(models)
}
