//! Migration artifacts: named, serializable units of ordered operations
//! with declared dependencies.
//!
//! Artifacts are persisted as TOML documents, one file per artifact under
//! `migrations/<app>/<YYYYMMDDhhmmss>_<slug>.toml`. The document is
//! self-contained: parsing it back reconstructs the operation list.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sql_migration_connector::Operation;
use std::fmt::Display;

/// The identity of an artifact: its app and its file-stem name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MigrationId {
    pub app: String,
    pub name: String,
}

impl MigrationId {
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        MigrationId {
            app: app.into(),
            name: name.into(),
        }
    }
}

impl Display for MigrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.app, self.name)
    }
}

/// One migration artifact. The `name` is the file stem and is not part of
/// the serialized document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub class: String,
    pub app: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<(String, String)>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(skip)]
    pub name: String,
}

impl Migration {
    pub fn id(&self) -> MigrationId {
        MigrationId::new(self.app.clone(), self.name.clone())
    }

    pub fn dependency_ids(&self) -> impl Iterator<Item = MigrationId> + '_ {
        self.dependencies
            .iter()
            .map(|(app, name)| MigrationId::new(app.clone(), name.clone()))
    }

    /// Parses a serialized artifact. `name` is the file stem.
    pub fn from_toml_str(name: &str, content: &str) -> CoreResult<Migration> {
        let mut migration: Migration = toml::from_str(content).map_err(|err| {
            CoreError::discovery(format!("malformed migration `{}`: {}", name, err))
        })?;

        if migration.class.is_empty() {
            return Err(CoreError::discovery(format!(
                "migration `{}` declares no class",
                name
            )));
        }

        migration.name = name.to_owned();
        Ok(migration)
    }
}
