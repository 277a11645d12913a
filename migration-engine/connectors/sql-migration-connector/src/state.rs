//! The schema state model: the in-memory representation of the model
//! universe as of the latest applied operation, with snapshots for
//! time-travel during backward-SQL generation.

use crate::error::{ConnectorError, ConnectorResult};
use crate::fields::Field;
use crate::model_ref::ModelRef;
use crate::operations::Operation;
use heck::ToSnakeCase;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An index on a model, identified by name. `fields` are field names, not
/// column names; columns are resolved against the model at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, fields: Vec<String>, unique: bool) -> Self {
        IndexDef {
            name: name.into(),
            fields,
            unique,
        }
    }
}

/// The deterministic name for an implicit index:
/// `idx_<table>_<first_field>_<6-hex-hash-of-field-list>`.
pub fn default_index_name(table: &str, fields: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fields.join(",").as_bytes());
    let digest = hasher.finalize();

    format!(
        "idx_{}_{}_{:02x}{:02x}{:02x}",
        table,
        fields.first().map(String::as_str).unwrap_or(""),
        digest[0],
        digest[1],
        digest[2],
    )
}

/// The default table name for a model: the snake-cased model name.
pub fn default_table_name(model_name: &str) -> String {
    model_name.to_snake_case()
}

/// One model in the state: its table, its fields in declaration order, and
/// its indexes. Reverse relations are never stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelEntry {
    pub table: String,
    pub fields: IndexMap<String, Field>,
    pub indexes: Vec<IndexDef>,
}

impl ModelEntry {
    pub fn new(table: impl Into<String>) -> Self {
        ModelEntry {
            table: table.into(),
            fields: IndexMap::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column_name(&self, field_name: &str) -> Option<String> {
        self.fields
            .get(field_name)
            .map(|field| field.column_name(field_name).into_owned())
    }

    /// The inverse mapping, computed on demand.
    pub fn field_by_column(&self, column: &str) -> Option<(&str, &Field)> {
        self.fields
            .iter()
            .find(|(name, field)| field.column_name(name) == column)
            .map(|(name, field)| (name.as_str(), field))
    }
}

/// The model universe: app → model name → entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schemas {
    apps: IndexMap<String, IndexMap<String, ModelEntry>>,
}

static EMPTY_SCHEMAS: Lazy<Schemas> = Lazy::new(Schemas::default);

impl Schemas {
    pub fn is_empty(&self) -> bool {
        self.apps.values().all(|models| models.is_empty())
    }

    pub fn get_models(&self, app: &str) -> Option<&IndexMap<String, ModelEntry>> {
        self.apps.get(app)
    }

    pub fn get_model(&self, model: &ModelRef) -> Option<&ModelEntry> {
        self.apps.get(model.app())?.get(model.model_name())
    }

    pub fn get_model_mut(&mut self, model: &ModelRef) -> Option<&mut ModelEntry> {
        self.apps.get_mut(model.app())?.get_mut(model.model_name())
    }

    pub fn get_table_name(&self, model: &ModelRef) -> Option<&str> {
        self.get_model(model).map(|entry| entry.table.as_str())
    }

    pub fn get_field(&self, model: &ModelRef, field_name: &str) -> Option<&Field> {
        self.get_model(model)?.fields.get(field_name)
    }

    pub fn get_column_name(&self, model: &ModelRef, field_name: &str) -> Option<String> {
        self.get_model(model)?.column_name(field_name)
    }

    pub fn insert_model(&mut self, model: &ModelRef, entry: ModelEntry) {
        self.apps
            .entry(model.app().to_owned())
            .or_default()
            .insert(model.model_name().to_owned(), entry);
    }

    pub fn remove_model(&mut self, model: &ModelRef) -> Option<ModelEntry> {
        self.apps.get_mut(model.app())?.shift_remove(model.model_name())
    }

    /// All model references in the universe, sorted.
    pub fn model_refs(&self) -> Vec<ModelRef> {
        let mut refs: Vec<ModelRef> = self
            .apps
            .iter()
            .flat_map(|(app, models)| {
                models.keys().map(move |name| ModelRef::new(app, name))
            })
            .collect();
        refs.sort();
        refs
    }

    /// The through-table of a many-to-many field, deriving the default name
    /// from the two end tables when the descriptor does not set one.
    pub fn through_table(&self, model: &ModelRef, field: &Field) -> ConnectorResult<String> {
        if let Some(through) = &field.through {
            return Ok(through.clone());
        }

        let source_table = self
            .get_table_name(model)
            .map(str::to_owned)
            .unwrap_or_else(|| default_table_name(model.model_name()));
        let target = field
            .target
            .as_ref()
            .ok_or_else(|| ConnectorError::operation("many-to-many field without a target model"))?;
        let target_table = self
            .get_table_name(target)
            .map(str::to_owned)
            .unwrap_or_else(|| default_table_name(target.model_name()));

        Ok(format!("{}_{}", source_table, target_table))
    }
}

/// The evolving schema state. Every applied operation mutates `current`;
/// `snapshot()` freezes a copy so `prev()` can recover the shape the
/// universe had before the latest operation.
#[derive(Debug, Clone, Default)]
pub struct State {
    current: Schemas,
    snapshots: Vec<(String, Schemas)>,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    pub fn schemas(&self) -> &Schemas {
        &self.current
    }

    /// The snapshot immediately before the latest one. With fewer than two
    /// snapshots this is the empty universe.
    pub fn prev(&self) -> &Schemas {
        if self.snapshots.len() >= 2 {
            &self.snapshots[self.snapshots.len() - 2].1
        } else {
            &EMPTY_SCHEMAS
        }
    }

    pub fn snapshot(&mut self, label: impl Into<String>) {
        self.snapshots.push((label.into(), self.current.clone()));
    }

    /// Drops the latest snapshot and rewinds `current` to the one before
    /// it. Used when reverting operations in reverse order.
    pub fn pop_snapshot(&mut self) {
        self.snapshots.pop();
        self.current = self
            .snapshots
            .last()
            .map(|(_, schemas)| schemas.clone())
            .unwrap_or_default();
    }

    /// Replays the operations of already-applied migrations, snapshotting
    /// after each operation.
    pub fn build_from_migrations<'a>(
        migrations: impl IntoIterator<Item = (&'a str, &'a [Operation])>,
    ) -> ConnectorResult<State> {
        let mut state = State::new();

        for (name, operations) in migrations {
            for (index, operation) in operations.iter().enumerate() {
                state.apply(operation)?;
                state.snapshot(format!("{}:{}", name, index));
            }
        }

        Ok(state)
    }

    /// Applies one operation's state-side effect.
    pub fn apply(&mut self, operation: &Operation) -> ConnectorResult<()> {
        match operation {
            Operation::CreateModel {
                model,
                table,
                fields,
            } => {
                let table = table
                    .clone()
                    .unwrap_or_else(|| default_table_name(model.model_name()));
                let mut entry = ModelEntry::new(table);
                entry.fields = fields.clone();
                check_column_uniqueness(model, &entry)?;
                self.current.insert_model(model, entry);
            }
            Operation::DropModel { model } => {
                self.current
                    .remove_model(model)
                    .ok_or_else(|| unknown_model(model))?;
            }
            Operation::RenameModel {
                model,
                new_table,
                new_model_name,
            } => {
                if new_table.is_none() && new_model_name.is_none() {
                    return Err(ConnectorError::operation(
                        "RenameModel requires a new table name or a new model name",
                    ));
                }

                let mut entry = self
                    .current
                    .remove_model(model)
                    .ok_or_else(|| unknown_model(model))?;

                if let Some(new_table) = new_table {
                    entry.table = new_table.clone();
                }

                let new_ref = match new_model_name {
                    Some(new_name) => ModelRef::new(model.app(), new_name),
                    None => model.clone(),
                };
                self.current.insert_model(&new_ref, entry);
            }
            Operation::AddField {
                model,
                field_name,
                field,
            } => {
                let entry = self
                    .current
                    .get_model_mut(model)
                    .ok_or_else(|| unknown_model(model))?;
                entry.fields.insert(field_name.clone(), field.clone());
                check_column_uniqueness(model, entry)?;
            }
            Operation::DropField { model, field_name } => {
                let entry = self
                    .current
                    .get_model_mut(model)
                    .ok_or_else(|| unknown_model(model))?;
                entry
                    .fields
                    .shift_remove(field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;
            }
            Operation::AlterField {
                model,
                field_name,
                field,
            } => {
                let entry = self
                    .current
                    .get_model_mut(model)
                    .ok_or_else(|| unknown_model(model))?;
                let stored = entry
                    .fields
                    .get_mut(field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;
                *stored = field.clone();
            }
            Operation::RenameField {
                model,
                field_name,
                new_field_name,
                new_column_name,
            } => {
                if new_field_name.is_none() && new_column_name.is_none() {
                    return Err(ConnectorError::operation(
                        "RenameField requires a new field name or a new column name",
                    ));
                }

                let entry = self
                    .current
                    .get_model_mut(model)
                    .ok_or_else(|| unknown_model(model))?;
                let mut field = entry
                    .fields
                    .shift_remove(field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;

                // Renaming the field alone must not move the column: pin the
                // column that was derived from the old field name.
                let old_column = field.column_name(field_name).into_owned();
                match new_column_name {
                    Some(new_column) => field.source_column = Some(new_column.clone()),
                    None => field.source_column = Some(old_column),
                }

                let stored_name = new_field_name.clone().unwrap_or_else(|| field_name.clone());
                entry.fields.insert(stored_name, field);
            }
            Operation::AddIndex { model, index } => {
                let entry = self
                    .current
                    .get_model_mut(model)
                    .ok_or_else(|| unknown_model(model))?;

                for field_name in &index.fields {
                    if !entry.fields.contains_key(field_name) {
                        return Err(ConnectorError::operation(format!(
                            "index `{}` references unknown field `{}` on `{}`",
                            index.name, field_name, model
                        )));
                    }
                }

                entry.indexes.push(index.clone());
            }
            Operation::DropIndex { model, index_name } => {
                let entry = self
                    .current
                    .get_model_mut(model)
                    .ok_or_else(|| unknown_model(model))?;
                let position = entry
                    .indexes
                    .iter()
                    .position(|index| index.name == *index_name)
                    .ok_or_else(|| {
                        ConnectorError::operation(format!(
                            "no index named `{}` on `{}`",
                            index_name, model
                        ))
                    })?;
                entry.indexes.remove(position);
            }
            Operation::RunSql { .. } => (),
        }

        Ok(())
    }
}

fn check_column_uniqueness(model: &ModelRef, entry: &ModelEntry) -> ConnectorResult<()> {
    let mut seen = std::collections::HashSet::new();

    for (name, field) in &entry.fields {
        if field.is_many_to_many() {
            continue;
        }

        let column = field.column_name(name);
        if !seen.insert(column.into_owned()) {
            return Err(ConnectorError::operation(format!(
                "duplicate column for field `{}` on `{}`",
                name, model
            )));
        }
    }

    Ok(())
}

fn unknown_model(model: &ModelRef) -> ConnectorError {
    ConnectorError::operation(format!("model `{}` does not exist in the current state", model))
}

fn unknown_field(model: &ModelRef, field_name: &str) -> ConnectorError {
    ConnectorError::operation(format!("field `{}` does not exist on `{}`", field_name, model))
}
