//! The migration manager: discovery, ordering, the applied-set ledger, and
//! apply/revert/create orchestration.

use crate::error::{CoreError, CoreResult};
use crate::generator;
use crate::graph::sort_migrations;
use crate::migration::{Migration, MigrationId};
use crate::registry::ModelRegistry;
use serde_json::json;
use sql_migration_connector::{
    calculate_target_schema, Connection, Dialect, ModelRef, Operation, SchemaDiffer, State,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub struct MigrationManager {
    migrations_dir: PathBuf,
    migrations: BTreeMap<MigrationId, Migration>,
    sorted: Vec<MigrationId>,
    applied: BTreeSet<MigrationId>,
    state: State,
}

/// A migration artifact created on disk by `create_migrations`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedMigration {
    pub id: MigrationId,
    pub path: PathBuf,
}

impl MigrationManager {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        MigrationManager {
            migrations_dir: migrations_dir.into(),
            migrations: BTreeMap::new(),
            sorted: Vec::new(),
            applied: BTreeSet::new(),
            state: State::new(),
        }
    }

    /// Bootstraps the ledger table, loads the applied set, discovers the
    /// artifacts on disk, orders them, and replays the applied ones into
    /// the schema state.
    #[tracing::instrument(skip(self, connection))]
    pub async fn initialize(&mut self, connection: &dyn Connection) -> CoreResult<()> {
        let flavour = connection.dialect().flavour();

        connection
            .execute_script(flavour.ledger_create_table())
            .await?;

        let applied_rows = connection
            .execute_query(flavour.ledger_select_applied(), &[])
            .await
            .map_err(|err| CoreError::ledger(format!("failed to read the ledger: {}", err)))?;

        self.applied = applied_rows
            .rows
            .iter()
            .map(|row| {
                MigrationId::new(
                    row.get("app").and_then(|v| v.as_str()).unwrap_or_default(),
                    row.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
                )
            })
            .collect();

        self.migrations = discover_migrations(&self.migrations_dir)?;
        self.sorted = sort_migrations(&self.migrations)?;

        for id in &self.applied {
            if !self.migrations.contains_key(id) {
                return Err(CoreError::discovery(format!(
                    "applied migration {} is not present on disk",
                    id
                )));
            }
        }

        self.state = self.replay(|id| self.applied.contains(id))?;

        Ok(())
    }

    pub fn migrations(&self) -> &BTreeMap<MigrationId, Migration> {
        &self.migrations
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Applied artifacts, in apply order.
    pub fn applied_migrations(&self) -> Vec<&MigrationId> {
        self.sorted
            .iter()
            .filter(|id| self.applied.contains(*id))
            .collect()
    }

    /// Discovered but unapplied artifacts, in apply order.
    pub fn pending_migrations(&self) -> Vec<&MigrationId> {
        self.sorted
            .iter()
            .filter(|id| !self.applied.contains(*id))
            .collect()
    }

    /// Applies every pending artifact in order. The ledger row for an
    /// artifact is inserted only once all of its operations succeeded; on
    /// any error the run stops and the failing artifact stays unapplied.
    /// The cancellation token is honored between operations.
    #[tracing::instrument(skip(self, connection, cancellation))]
    pub async fn apply_migrations(
        &mut self,
        connection: &dyn Connection,
        cancellation: Option<&CancellationToken>,
    ) -> CoreResult<Vec<MigrationId>> {
        let dialect = connection.dialect();
        let flavour = dialect.flavour();
        let renderer = dialect.renderer();

        let pending: Vec<MigrationId> = self
            .pending_migrations()
            .into_iter()
            .cloned()
            .collect();
        let mut newly_applied = Vec::new();

        for id in pending {
            let migration = self
                .migrations
                .get(&id)
                .cloned()
                .unwrap_or_else(|| unreachable!("pending migration is discovered"));

            tracing::info!(migration = %id, "applying migration");

            for (index, operation) in migration.operations.iter().enumerate() {
                if cancellation.map(|token| token.is_cancelled()).unwrap_or(false) {
                    return Err(CoreError::Cancelled);
                }

                let sql = operation.forward_sql(&self.state, renderer)?;
                tracing::debug!(operation = %operation.describe(), %sql);

                if !sql.is_empty() {
                    connection.execute_script(&sql).await?;
                }

                self.state.apply(operation)?;
                self.state.snapshot(format!("{}:{}", id, index));
            }

            connection
                .execute_query(
                    flavour.ledger_insert(),
                    &[json!(id.app), json!(id.name), json!(ledger_timestamp())],
                )
                .await?;

            self.applied.insert(id.clone());
            newly_applied.push(id);
        }

        Ok(newly_applied)
    }

    /// Reverts one applied artifact: the named one, or the latest applied
    /// artifact of `app`. Operations run in reverse order with backward
    /// SQL; the ledger row is deleted afterwards.
    #[tracing::instrument(skip(self, connection))]
    pub async fn revert_migration(
        &mut self,
        connection: &dyn Connection,
        app: &str,
        migration_name: Option<&str>,
    ) -> CoreResult<Option<MigrationId>> {
        let dialect = connection.dialect();
        let flavour = dialect.flavour();
        let renderer = dialect.renderer();

        let name = match migration_name {
            Some(name) => name.to_owned(),
            None => {
                let latest = connection
                    .execute_query(flavour.ledger_select_latest_for_app(), &[json!(app)])
                    .await?;

                match latest
                    .rows
                    .first()
                    .and_then(|row| row.get("name"))
                    .and_then(|value| value.as_str())
                {
                    Some(name) => name.to_owned(),
                    None => return Ok(None),
                }
            }
        };

        let id = MigrationId::new(app, name);

        let migration = self
            .migrations
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::discovery(format!("migration {} not found", id)))?;

        if !self.applied.contains(&id) {
            return Err(CoreError::ledger(format!("migration {} is not applied", id)));
        }

        self.ensure_no_applied_dependents(&id)?;

        // Rebuild the state with the reverted artifact last, so that the
        // snapshot stack unwinds through exactly its operations.
        let mut replay_order: Vec<&MigrationId> = self
            .sorted
            .iter()
            .filter(|other| self.applied.contains(*other) && **other != id)
            .collect();
        replay_order.push(&id);

        let mut state = State::build_from_migrations(replay_order.iter().map(|id| {
            let migration = &self.migrations[*id];
            (migration.name.as_str(), migration.operations.as_slice())
        }))?;

        tracing::info!(migration = %id, "reverting migration");

        for operation in migration.operations.iter().rev() {
            let sql = operation.backward_sql(&state, renderer)?;
            tracing::debug!(operation = %operation.describe(), %sql);

            if !sql.is_empty() {
                connection.execute_script(&sql).await?;
            }

            state.pop_snapshot();
        }

        connection
            .execute_query(flavour.ledger_delete(), &[json!(id.app), json!(id.name)])
            .await?;

        self.applied.remove(&id);
        self.state = self.replay(|other| self.applied.contains(other))?;

        Ok(Some(id))
    }

    /// Runs the differ against the registry's declared universe and writes
    /// one artifact per app with changes. Returns the created artifacts;
    /// an empty list means the schemas were already in sync.
    #[tracing::instrument(skip(self, registry))]
    pub fn create_migrations(
        &mut self,
        registry: &dyn ModelRegistry,
        name: Option<&str>,
    ) -> CoreResult<Vec<CreatedMigration>> {
        let target = calculate_target_schema(&registry.declared_models()?)?;
        let diff = SchemaDiffer::new(self.state.schemas(), &target).diff()?;

        if diff.is_empty() {
            return Ok(Vec::new());
        }

        let mut operations_by_app: BTreeMap<String, Vec<Operation>> = BTreeMap::new();
        for operation in diff.operations {
            let app = operation
                .model()
                .map(ModelRef::app)
                .unwrap_or_default()
                .to_owned();
            operations_by_app.entry(app).or_default().push(operation);
        }

        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();

        // Artifact names are fixed up front so cross-app dependency edges
        // can point at artifacts created in the same run.
        let new_names: BTreeMap<&String, String> = operations_by_app
            .iter()
            .map(|(app, operations)| {
                let slug = name
                    .map(str::to_owned)
                    .unwrap_or_else(|| generated_name(operations));
                (app, format!("{}_{}", timestamp, slug))
            })
            .collect();

        let mut created = Vec::new();

        for (app, operations) in &operations_by_app {
            let full_name = &new_names[app];
            let mut dependencies: Vec<(String, String)> = Vec::new();

            if let Some(latest) = self.latest_migration(app) {
                dependencies.push((latest.app.clone(), latest.name.clone()));
            }

            for dependency_app in diff.app_dependencies.get(app).into_iter().flatten() {
                if let Some(new_name) = new_names.get(dependency_app) {
                    dependencies.push((dependency_app.clone(), new_name.clone()));
                } else if let Some(latest) = self.latest_migration(dependency_app) {
                    dependencies.push((latest.app.clone(), latest.name.clone()));
                }
            }

            let migration = Migration {
                class: generator::class_name(full_name),
                app: app.clone(),
                uses: generator::collect_uses(operations),
                dependencies,
                operations: operations.clone(),
                name: full_name.clone(),
            };

            let path = self.write_artifact(&migration)?;
            created.push(CreatedMigration {
                id: migration.id(),
                path,
            });
            self.migrations.insert(migration.id(), migration);
        }

        self.sorted = sort_migrations(&self.migrations)?;

        Ok(created)
    }

    /// Writes an artifact with no operations, as a template for
    /// hand-written migrations.
    pub fn create_empty_migration(
        &mut self,
        app: &str,
        name: Option<&str>,
    ) -> CoreResult<CreatedMigration> {
        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
        let full_name = format!("{}_{}", timestamp, name.unwrap_or("auto"));

        let mut migration = generator::empty_migration(app, &full_name);
        if let Some(latest) = self.latest_migration(app) {
            migration
                .dependencies
                .push((latest.app.clone(), latest.name.clone()));
        }

        let path = self.write_artifact(&migration)?;
        let created = CreatedMigration {
            id: migration.id(),
            path,
        };

        self.migrations.insert(migration.id(), migration);
        self.sorted = sort_migrations(&self.migrations)?;

        Ok(created)
    }

    /// The dry-run SQL dump for every pending artifact, without touching
    /// the database.
    pub fn pending_migrations_sql(&self, dialect: Dialect) -> CoreResult<String> {
        let renderer = dialect.renderer();
        let mut state = self.state.clone();
        let mut out = String::new();

        for id in self.pending_migrations() {
            let migration = &self.migrations[id];

            out.push_str(&format!("-- Migration: {} -> {}\n", id.app, id.name));

            for operation in &migration.operations {
                let sql = operation.forward_sql(&state, renderer)?;
                if !sql.is_empty() {
                    out.push_str(&sql);
                    out.push('\n');
                }
                state.apply(operation)?;
            }
        }

        Ok(out)
    }

    fn replay(&self, filter: impl Fn(&MigrationId) -> bool) -> CoreResult<State> {
        let state = State::build_from_migrations(
            self.sorted
                .iter()
                .filter(|id| filter(id))
                .map(|id| {
                    let migration = &self.migrations[id];
                    (migration.name.as_str(), migration.operations.as_slice())
                }),
        )?;

        Ok(state)
    }

    /// Fails when another applied artifact depends, directly or
    /// transitively, on the given one.
    fn ensure_no_applied_dependents(&self, id: &MigrationId) -> CoreResult<()> {
        for other in &self.applied {
            if other == id {
                continue;
            }

            let mut queue = vec![other.clone()];
            let mut seen = HashSet::new();

            while let Some(current) = queue.pop() {
                if !seen.insert(current.clone()) {
                    continue;
                }

                if let Some(migration) = self.migrations.get(&current) {
                    for dependency in migration.dependency_ids() {
                        if dependency == *id {
                            return Err(CoreError::dependency(format!(
                                "cannot revert {}: applied migration {} depends on it",
                                id, other
                            )));
                        }
                        queue.push(dependency);
                    }
                }
            }
        }

        Ok(())
    }

    fn latest_migration(&self, app: &str) -> Option<&MigrationId> {
        self.sorted.iter().rev().find(|id| id.app == app)
    }

    fn write_artifact(&self, migration: &Migration) -> CoreResult<PathBuf> {
        let app_dir = self.migrations_dir.join(&migration.app);
        std::fs::create_dir_all(&app_dir).map_err(|err| {
            CoreError::io(
                format!("failed to create migrations directory {}", app_dir.display()),
                err,
            )
        })?;

        let marker = app_dir.join("_app.toml");
        if !marker.exists() {
            std::fs::write(&marker, format!("app = \"{}\"\n", migration.app))
                .map_err(|err| CoreError::io(format!("failed to write {}", marker.display()), err))?;
        }

        let path = app_dir.join(format!("{}.toml", migration.name));
        let rendered = generator::render_migration(migration)?;
        std::fs::write(&path, rendered)
            .map_err(|err| CoreError::io(format!("failed to write {}", path.display()), err))?;

        tracing::info!(path = %path.display(), "created migration artifact");

        Ok(path)
    }
}

/// The artifact slug derived from an operation list: the snake-cased model
/// name when every operation targets one model, suffixed with the field
/// name when the whole artifact is a single field-level change, `auto`
/// otherwise.
fn generated_name(operations: &[Operation]) -> String {
    let mut models = BTreeSet::new();

    for operation in operations {
        match operation.model() {
            Some(model) => {
                models.insert(model.clone());
            }
            None => return "auto".to_owned(),
        }
    }

    let mut models = models.into_iter();
    let (Some(model), None) = (models.next(), models.next()) else {
        return "auto".to_owned();
    };

    let base = sql_migration_connector::state::default_table_name(model.model_name());

    if let [operation] = operations {
        if let Some(field_name) = operation.field_name() {
            return format!("{}_{}", base, field_name);
        }
    }

    base
}

/// Scans `migrations/<app>/*.toml`. Hidden and underscore-prefixed names
/// are ignored at both levels. Artifact identity is the file stem.
pub fn discover_migrations(migrations_dir: &Path) -> CoreResult<BTreeMap<MigrationId, Migration>> {
    let mut migrations = BTreeMap::new();

    if !migrations_dir.exists() {
        return Ok(migrations);
    }

    let apps = std::fs::read_dir(migrations_dir).map_err(|err| {
        CoreError::io(
            format!("failed to read migrations directory {}", migrations_dir.display()),
            err,
        )
    })?;

    for app_entry in apps {
        let app_entry = app_entry.map_err(|err| {
            CoreError::io(
                format!("failed to read migrations directory {}", migrations_dir.display()),
                err,
            )
        })?;

        let app_path = app_entry.path();
        let Some(app) = app_path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        if !app_path.is_dir() || app.starts_with('_') || app.starts_with('.') {
            continue;
        }

        let entries = std::fs::read_dir(&app_path).map_err(|err| {
            CoreError::io(format!("failed to read {}", app_path.display()), err)
        })?;

        for entry in entries {
            let entry = entry
                .map_err(|err| CoreError::io(format!("failed to read {}", app_path.display()), err))?;
            let path = entry.path();

            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            if stem.starts_with('_') || stem.starts_with('.') {
                continue;
            }

            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }

            let content = std::fs::read_to_string(&path)
                .map_err(|err| CoreError::io(format!("failed to read {}", path.display()), err))?;

            let migration = Migration::from_toml_str(stem, &content)?;

            if migration.app != app {
                return Err(CoreError::discovery(format!(
                    "migration {} declares app `{}` but lives in `{}/`",
                    stem, migration.app, app
                )));
            }

            migrations.insert(migration.id(), migration);
        }
    }

    Ok(migrations)
}

fn ledger_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
