//! The model registry: where the target schema's model declarations come
//! from.
//!
//! The engine itself is ORM-agnostic; anything that can enumerate apps,
//! models and field descriptors can implement [`ModelRegistry`]. Two
//! implementations ship: a declarative TOML schema-file registry (used by
//! the CLI) and a literal in-memory one (used in tests and by embedders).

use crate::error::{CoreError, CoreResult};
use indexmap::IndexMap;
use serde::Deserialize;
use sql_migration_connector::{Field, IndexDecl, ModelDecl};
use std::path::{Path, PathBuf};

pub trait ModelRegistry {
    /// The declared model universe: app → model name → declaration.
    fn declared_models(&self) -> CoreResult<IndexMap<String, IndexMap<String, ModelDecl>>>;
}

/// A registry over literal declarations.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    pub decls: IndexMap<String, IndexMap<String, ModelDecl>>,
}

impl StaticRegistry {
    pub fn new(decls: IndexMap<String, IndexMap<String, ModelDecl>>) -> Self {
        StaticRegistry { decls }
    }
}

impl ModelRegistry for StaticRegistry {
    fn declared_models(&self) -> CoreResult<IndexMap<String, IndexMap<String, ModelDecl>>> {
        Ok(self.decls.clone())
    }
}

/// A registry reading one declarative TOML schema file per app:
///
/// ```toml
/// [models.User]
/// table = "users"
/// unique_together = [["first_name", "last_name"]]
///
/// [models.User.fields.id]
/// kind = "int"
/// primary_key = true
///
/// [[models.User.indexes]]
/// fields = ["email"]
/// ```
#[derive(Debug, Default)]
pub struct SchemaFileRegistry {
    apps: IndexMap<String, PathBuf>,
}

impl SchemaFileRegistry {
    pub fn new() -> Self {
        SchemaFileRegistry::default()
    }

    pub fn with_app(mut self, app: impl Into<String>, schema_file: impl Into<PathBuf>) -> Self {
        self.apps.insert(app.into(), schema_file.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

impl ModelRegistry for SchemaFileRegistry {
    fn declared_models(&self) -> CoreResult<IndexMap<String, IndexMap<String, ModelDecl>>> {
        let mut decls = IndexMap::new();

        for (app, path) in &self.apps {
            decls.insert(app.clone(), load_schema_file(path)?);
        }

        Ok(decls)
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFileDoc {
    #[serde(default)]
    models: IndexMap<String, ModelDoc>,
}

#[derive(Debug, Deserialize)]
struct ModelDoc {
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    fields: IndexMap<String, Field>,
    #[serde(default)]
    indexes: Vec<IndexDoc>,
    #[serde(default)]
    unique_together: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct IndexDoc {
    fields: Vec<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    unique: bool,
}

fn load_schema_file(path: &Path) -> CoreResult<IndexMap<String, ModelDecl>> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| CoreError::io(format!("failed to read schema file {}", path.display()), err))?;

    let doc: SchemaFileDoc = toml::from_str(&content).map_err(|err| {
        CoreError::config(format!("malformed schema file {}: {}", path.display(), err))
    })?;

    let models = doc
        .models
        .into_iter()
        .map(|(model_name, model)| {
            let decl = ModelDecl {
                table: model.table,
                fields: model.fields,
                indexes: model
                    .indexes
                    .into_iter()
                    .map(|index| IndexDecl {
                        fields: index.fields,
                        name: index.name,
                        unique: index.unique,
                    })
                    .collect(),
                unique_together: model.unique_together,
            };
            (model_name, decl)
        })
        .collect();

    Ok(models)
}
