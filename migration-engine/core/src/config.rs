//! Configuration loading.
//!
//! `--config` accepts `<path>` or `<path>#<dotted.key>`, where the dotted
//! key selects a nested table inside the TOML document:
//!
//! ```toml
//! [connections]
//! default = "sqlite://./db.sqlite3"
//!
//! [apps.blog]
//! models = "blog_models.toml"
//! ```

use crate::error::{CoreError, CoreResult};
use crate::registry::SchemaFileRegistry;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path to the app's declarative model schema file, relative to the
    /// configuration file.
    #[serde(default)]
    pub models: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Config {
    pub fn load(reference: &str) -> CoreResult<Config> {
        let (path, key) = match reference.split_once('#') {
            Some((path, key)) => (path, Some(key)),
            None => (reference, None),
        };

        let content = std::fs::read_to_string(path)
            .map_err(|err| CoreError::io(format!("failed to read configuration {}", path), err))?;

        let mut value: toml::Value = toml::from_str(&content)
            .map_err(|err| CoreError::config(format!("malformed configuration {}: {}", path, err)))?;

        if let Some(key) = key {
            for part in key.split('.') {
                value = value
                    .get(part)
                    .cloned()
                    .ok_or_else(|| {
                        CoreError::config(format!(
                            "configuration value `{}` not found in {}",
                            key, path
                        ))
                    })?;
            }
        }

        let mut config: Config = value
            .try_into()
            .map_err(|err| CoreError::config(format!("invalid configuration {}: {}", path, err)))?;

        config.base_dir = Path::new(path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(config)
    }

    /// The selected app: the explicit one if given and known, otherwise
    /// the only configured app. Anything else is an error.
    pub fn select_app(&self, requested: Option<&str>) -> CoreResult<String> {
        if let Some(app) = requested {
            if !self.apps.contains_key(app) {
                return Err(CoreError::config(format!(
                    "app `{}` not found in the configuration; known apps: {}",
                    app,
                    self.app_names().join(", ")
                )));
            }
            return Ok(app.to_owned());
        }

        match self.apps.len() {
            1 => Ok(self
                .apps
                .keys()
                .next()
                .map(String::clone)
                .unwrap_or_default()),
            0 => Err(CoreError::config("no apps configured")),
            _ => Err(CoreError::config(format!(
                "an app must be selected with --app when several are configured; known apps: {}",
                self.app_names().join(", ")
            ))),
        }
    }

    pub fn connection_url(&self, name: &str) -> CoreResult<&str> {
        self.connections
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| CoreError::config(format!("no connection named `{}` configured", name)))
    }

    /// A schema-file registry over every app that declares a models file.
    pub fn registry(&self) -> SchemaFileRegistry {
        let mut registry = SchemaFileRegistry::new();

        for (app, app_config) in &self.apps {
            if let Some(models) = &app_config.models {
                registry = registry.with_app(app.clone(), self.base_dir.join(models));
            }
        }

        registry
    }

    fn app_names(&self) -> Vec<&str> {
        self.apps.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn a_single_app_is_selected_implicitly() {
        let file = write_config(
            r#"
[connections]
default = "sqlite://./db.sqlite3"

[apps.blog]
models = "blog_models.toml"
"#,
        );

        let config = Config::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.select_app(None).unwrap(), "blog");
        assert_eq!(
            config.connection_url("default").unwrap(),
            "sqlite://./db.sqlite3"
        );
    }

    #[test]
    fn several_apps_require_an_explicit_selection() {
        let file = write_config(
            r#"
[apps.blog]
[apps.auth]
"#,
        );

        let config = Config::load(file.path().to_str().unwrap()).unwrap();

        assert!(config.select_app(None).is_err());
        assert_eq!(config.select_app(Some("auth")).unwrap(), "auth");
        assert!(config.select_app(Some("shop")).is_err());
    }

    #[test]
    fn dotted_keys_select_nested_configuration() {
        let file = write_config(
            r#"
[tools.migrations.connections]
default = "sqlite://./db.sqlite3"

[tools.migrations.apps.blog]
"#,
        );

        let reference = format!("{}#tools.migrations", file.path().display());
        let config = Config::load(&reference).unwrap();

        assert_eq!(config.select_app(None).unwrap(), "blog");
    }
}
