//! The closed set of schema-change operations.
//!
//! Every operation implements five contracts: a state projection
//! (`State::apply`), forward SQL, backward SQL (recovering the pre-change
//! shape through `State::prev`), a serialized artifact form (serde), and
//! the set of symbols its artifact form refers to.

use crate::error::{ConnectorError, ConnectorResult};
use crate::fields::Field;
use crate::model_ref::ModelRef;
use crate::sql_renderer::{ColumnDef, ForeignKeyRef, SqlRenderer};
use crate::state::{default_table_name, IndexDef, ModelEntry, Schemas, State};
use heck::ToSnakeCase;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a new model with its full field set. The table name defaults
    /// to the snake-cased model name.
    CreateModel {
        model: ModelRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
        fields: IndexMap<String, Field>,
    },
    DropModel {
        model: ModelRef,
    },
    /// Requires at least one of the two targets.
    RenameModel {
        model: ModelRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_table: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_model_name: Option<String>,
    },
    AddField {
        model: ModelRef,
        field_name: String,
        field: Field,
    },
    DropField {
        model: ModelRef,
        field_name: String,
    },
    AlterField {
        model: ModelRef,
        field_name: String,
        field: Field,
    },
    /// Requires at least one of the two targets. Renaming only the field
    /// name is a no-op at the database layer.
    RenameField {
        model: ModelRef,
        field_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_field_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_column_name: Option<String>,
    },
    AddIndex {
        model: ModelRef,
        index: IndexDef,
    },
    DropIndex {
        model: ModelRef,
        index_name: String,
    },
    RunSql {
        forward: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backward: Option<String>,
    },
}

impl Operation {
    /// The model this operation addresses. `RunSql` addresses none.
    pub fn model(&self) -> Option<&ModelRef> {
        match self {
            Operation::CreateModel { model, .. }
            | Operation::DropModel { model }
            | Operation::RenameModel { model, .. }
            | Operation::AddField { model, .. }
            | Operation::DropField { model, .. }
            | Operation::AlterField { model, .. }
            | Operation::RenameField { model, .. }
            | Operation::AddIndex { model, .. }
            | Operation::DropIndex { model, .. } => Some(model),
            Operation::RunSql { .. } => None,
        }
    }

    /// The field this operation touches, for single-field operations.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Operation::AddField { field_name, .. }
            | Operation::DropField { field_name, .. }
            | Operation::AlterField { field_name, .. }
            | Operation::RenameField { field_name, .. } => Some(field_name),
            _ => None,
        }
    }

    /// A one-line human-readable summary.
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateModel { model, .. } => format!("Create model {}", model),
            Operation::DropModel { model } => format!("Drop model {}", model),
            Operation::RenameModel {
                model,
                new_model_name: Some(new_name),
                ..
            } => format!("Rename model {} to {}", model, new_name),
            Operation::RenameModel {
                model, new_table, ..
            } => format!(
                "Rename table of {} to {}",
                model,
                new_table.as_deref().unwrap_or("")
            ),
            Operation::AddField {
                model, field_name, ..
            } => format!("Add field {} to {}", field_name, model),
            Operation::DropField { model, field_name } => {
                format!("Drop field {} from {}", field_name, model)
            }
            Operation::AlterField {
                model, field_name, ..
            } => format!("Alter field {} on {}", field_name, model),
            Operation::RenameField {
                model, field_name, ..
            } => format!("Rename field {} on {}", field_name, model),
            Operation::AddIndex { model, index } => {
                format!("Add index {} on {}", index.name, model)
            }
            Operation::DropIndex { model, index_name } => {
                format!("Drop index {} from {}", index_name, model)
            }
            Operation::RunSql { .. } => "Run raw SQL".to_owned(),
        }
    }

    /// The field-kind and operation-type symbols the serialized form refers
    /// to.
    pub fn required_imports(&self) -> Vec<&'static str> {
        let mut imports = vec![self.import_name()];

        match self {
            Operation::CreateModel { fields, .. } => {
                imports.extend(fields.values().map(|field| field.kind.import_name()));
            }
            Operation::AddField { field, .. } | Operation::AlterField { field, .. } => {
                imports.push(field.kind.import_name());
            }
            _ => (),
        }

        imports.sort_unstable();
        imports.dedup();
        imports
    }

    fn import_name(&self) -> &'static str {
        match self {
            Operation::CreateModel { .. } => "CreateModel",
            Operation::DropModel { .. } => "DropModel",
            Operation::RenameModel { .. } => "RenameModel",
            Operation::AddField { .. } => "AddField",
            Operation::DropField { .. } => "DropField",
            Operation::AlterField { .. } => "AlterField",
            Operation::RenameField { .. } => "RenameField",
            Operation::AddIndex { .. } => "AddIndex",
            Operation::DropIndex { .. } => "DropIndex",
            Operation::RunSql { .. } => "RunSql",
        }
    }

    /// The SQL script applying this operation, given the state as it is
    /// right before the operation.
    pub fn forward_sql(&self, state: &State, renderer: &dyn SqlRenderer) -> ConnectorResult<String> {
        if let Operation::RunSql { forward, .. } = self {
            return Ok(forward.clone());
        }

        Ok(script(self.forward_statements(state, renderer)?))
    }

    /// The SQL script reverting this operation, given the state as it is
    /// right after the operation was applied. The pre-operation shape is
    /// recovered through `state.prev()`.
    pub fn backward_sql(&self, state: &State, renderer: &dyn SqlRenderer) -> ConnectorResult<String> {
        if let Operation::RunSql { backward, .. } = self {
            return Ok(backward.clone().unwrap_or_default());
        }

        Ok(script(self.backward_statements(state, renderer)?))
    }

    fn forward_statements(
        &self,
        state: &State,
        renderer: &dyn SqlRenderer,
    ) -> ConnectorResult<Vec<String>> {
        let schemas = state.schemas();

        match self {
            Operation::CreateModel {
                model,
                table,
                fields,
            } => {
                let table_name = table
                    .clone()
                    .unwrap_or_else(|| default_table_name(model.model_name()));

                let columns = column_defs(schemas, model, &table_name, fields.iter())?;
                let mut statements = vec![renderer.render_create_table(&table_name, &columns)?];

                for field in fields.values().filter(|field| field.is_many_to_many()) {
                    statements.push(render_through_table(
                        renderer, schemas, model, &table_name, field,
                    )?);
                }

                Ok(statements)
            }
            Operation::DropModel { model } => {
                let entry = model_entry(schemas, model)?;
                let mut statements = Vec::new();

                for field in entry.fields.values().filter(|field| field.is_many_to_many()) {
                    let through = through_table_name(schemas, model, &entry.table, field)?;
                    statements.push(renderer.render_drop_table(&through));
                }

                statements.push(renderer.render_drop_table(&entry.table));
                Ok(statements)
            }
            Operation::RenameModel {
                model, new_table, ..
            } => {
                let Some(new_table) = new_table else {
                    return Ok(Vec::new());
                };

                let entry = model_entry(schemas, model)?;
                if entry.table == *new_table {
                    return Ok(Vec::new());
                }

                Ok(vec![renderer.render_rename_table(&entry.table, new_table)])
            }
            Operation::AddField {
                model,
                field_name,
                field,
            } => {
                let entry = model_entry(schemas, model)?;

                if field.is_many_to_many() {
                    return Ok(vec![render_through_table(
                        renderer,
                        schemas,
                        model,
                        &entry.table,
                        field,
                    )?]);
                }

                let column = ColumnDef {
                    name: field.column_name(field_name).into_owned(),
                    field,
                    references: resolve_references(schemas, model, &entry.table, field)?,
                };

                renderer.render_add_column(&entry.table, &column)
            }
            Operation::DropField { model, field_name } => {
                let entry = model_entry(schemas, model)?;
                let field = entry
                    .fields
                    .get(field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;

                if field.is_many_to_many() {
                    let through = through_table_name(schemas, model, &entry.table, field)?;
                    return Ok(vec![renderer.render_drop_table(&through)]);
                }

                let column = field.column_name(field_name).into_owned();
                let remaining = column_defs(
                    schemas,
                    model,
                    &entry.table,
                    entry.fields.iter().filter(|(name, _)| *name != field_name),
                )?;

                renderer.render_drop_column(&entry.table, &column, &remaining)
            }
            Operation::AlterField {
                model,
                field_name,
                field: next,
            } => {
                let entry = model_entry(schemas, model)?;
                let prev = entry
                    .fields
                    .get(field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;

                let column = prev.column_name(field_name).into_owned();
                let table_columns = column_defs(
                    schemas,
                    model,
                    &entry.table,
                    entry
                        .fields
                        .iter()
                        .map(|(name, field)| (name, if name == field_name { next } else { field })),
                )?;

                renderer.render_alter_column(&entry.table, &column, prev, next, &table_columns)
            }
            Operation::RenameField {
                model,
                field_name,
                new_column_name,
                ..
            } => {
                let Some(new_column) = new_column_name else {
                    return Ok(Vec::new());
                };

                let entry = model_entry(schemas, model)?;
                let field = entry
                    .fields
                    .get(field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;
                let old_column = field.column_name(field_name);

                if old_column == *new_column {
                    return Ok(Vec::new());
                }

                Ok(vec![renderer.render_rename_column(
                    &entry.table,
                    &old_column,
                    new_column,
                )])
            }
            Operation::AddIndex { model, index } => {
                let entry = model_entry(schemas, model)?;
                let columns = index_columns(model, entry, index)?;

                Ok(vec![renderer.render_create_index(
                    &entry.table,
                    &index.name,
                    &columns,
                    index.unique,
                )])
            }
            Operation::DropIndex { index_name, .. } => {
                Ok(vec![renderer.render_drop_index(index_name)])
            }
            Operation::RunSql { .. } => unreachable!("RunSql is handled in forward_sql"),
        }
    }

    fn backward_statements(
        &self,
        state: &State,
        renderer: &dyn SqlRenderer,
    ) -> ConnectorResult<Vec<String>> {
        match self {
            Operation::CreateModel { model, .. } => {
                let entry = model_entry(state.schemas(), model)?;
                let mut statements = Vec::new();

                for field in entry.fields.values().filter(|field| field.is_many_to_many()) {
                    let through = through_table_name(state.schemas(), model, &entry.table, field)?;
                    statements.push(renderer.render_drop_table(&through));
                }

                statements.push(renderer.render_drop_table(&entry.table));
                Ok(statements)
            }
            Operation::DropModel { model } => {
                let prev = state.prev();
                let entry = prev.get_model(model).ok_or_else(|| {
                    ConnectorError::operation(format!(
                        "cannot recreate `{}`: no previous state snapshot holds it",
                        model
                    ))
                })?;

                render_model_creation(renderer, prev, model, entry)
            }
            Operation::RenameModel {
                model, new_table, ..
            } => {
                let Some(new_table) = new_table else {
                    return Ok(Vec::new());
                };

                let old_table = state
                    .prev()
                    .get_table_name(model)
                    .ok_or_else(|| unknown_model(model))?
                    .to_owned();

                if old_table == *new_table {
                    return Ok(Vec::new());
                }

                Ok(vec![renderer.render_rename_table(new_table, &old_table)])
            }
            Operation::AddField {
                model,
                field_name,
                field,
            } => {
                let entry = model_entry(state.schemas(), model)?;

                if field.is_many_to_many() {
                    let through = through_table_name(state.schemas(), model, &entry.table, field)?;
                    return Ok(vec![renderer.render_drop_table(&through)]);
                }

                let column = field.column_name(field_name).into_owned();
                let remaining = column_defs(
                    state.schemas(),
                    model,
                    &entry.table,
                    entry.fields.iter().filter(|(name, _)| *name != field_name),
                )?;

                renderer.render_drop_column(&entry.table, &column, &remaining)
            }
            Operation::DropField { model, field_name } => {
                let prev = state.prev();
                let prev_field = prev
                    .get_field(model, field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;
                let table = state
                    .schemas()
                    .get_table_name(model)
                    .ok_or_else(|| unknown_model(model))?
                    .to_owned();

                if prev_field.is_many_to_many() {
                    return Ok(vec![render_through_table(
                        renderer, prev, model, &table, prev_field,
                    )?]);
                }

                let column = ColumnDef {
                    name: prev_field.column_name(field_name).into_owned(),
                    field: prev_field,
                    references: resolve_references(prev, model, &table, prev_field)?,
                };

                renderer.render_add_column(&table, &column)
            }
            Operation::AlterField {
                model,
                field_name,
                field: next,
            } => {
                let prev = state.prev();
                let prev_field = prev
                    .get_field(model, field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;
                let prev_entry = prev.get_model(model).ok_or_else(|| unknown_model(model))?;

                let column = prev_field.column_name(field_name).into_owned();
                let table_columns =
                    column_defs(prev, model, &prev_entry.table, prev_entry.fields.iter())?;

                renderer.render_alter_column(
                    &prev_entry.table,
                    &column,
                    next,
                    prev_field,
                    &table_columns,
                )
            }
            Operation::RenameField {
                model,
                field_name,
                new_column_name,
                ..
            } => {
                let Some(new_column) = new_column_name else {
                    return Ok(Vec::new());
                };

                let old_column = state
                    .prev()
                    .get_column_name(model, field_name)
                    .ok_or_else(|| unknown_field(model, field_name))?;

                if old_column == *new_column {
                    return Ok(Vec::new());
                }

                let table = state
                    .prev()
                    .get_table_name(model)
                    .ok_or_else(|| unknown_model(model))?;

                Ok(vec![renderer.render_rename_column(
                    table,
                    new_column,
                    &old_column,
                )])
            }
            Operation::AddIndex { index, .. } => Ok(vec![renderer.render_drop_index(&index.name)]),
            Operation::DropIndex { model, index_name } => {
                let prev = state.prev();
                let entry = prev.get_model(model).ok_or_else(|| unknown_model(model))?;
                let index = entry
                    .indexes
                    .iter()
                    .find(|index| index.name == *index_name)
                    .ok_or_else(|| {
                        ConnectorError::operation(format!(
                            "no index named `{}` on `{}` in the previous state",
                            index_name, model
                        ))
                    })?;
                let columns = index_columns(model, entry, index)?;

                Ok(vec![renderer.render_create_index(
                    &entry.table,
                    &index.name,
                    &columns,
                    index.unique,
                )])
            }
            Operation::RunSql { .. } => unreachable!("RunSql is handled in backward_sql"),
        }
    }
}

/// Statements joined into an executable script, each terminated with a
/// semicolon.
fn script(statements: Vec<String>) -> String {
    let mut script = String::with_capacity(statements.iter().map(|s| s.len() + 2).sum());

    for (i, statement) in statements.iter().enumerate() {
        if i > 0 {
            script.push('\n');
        }
        script.push_str(statement);
        script.push(';');
    }

    script
}

fn model_entry<'a>(schemas: &'a Schemas, model: &ModelRef) -> ConnectorResult<&'a ModelEntry> {
    schemas.get_model(model).ok_or_else(|| unknown_model(model))
}

fn unknown_model(model: &ModelRef) -> ConnectorError {
    ConnectorError::operation(format!("model `{}` does not exist in the current state", model))
}

fn unknown_field(model: &ModelRef, field_name: &str) -> ConnectorError {
    ConnectorError::operation(format!("field `{}` does not exist on `{}`", field_name, model))
}

/// Resolves the foreign key of a column, if any. Self-references resolve to
/// the model's own table, which may not be in the state yet when the model
/// is being created.
fn resolve_references(
    schemas: &Schemas,
    model: &ModelRef,
    own_table: &str,
    field: &Field,
) -> ConnectorResult<Option<ForeignKeyRef>> {
    if !field.is_foreign_key() {
        return Ok(None);
    }

    let target = field
        .target
        .as_ref()
        .ok_or_else(|| ConnectorError::operation("foreign key without a target model"))?;

    let table = if target == model {
        own_table.to_owned()
    } else {
        schemas
            .get_table_name(target)
            .map(str::to_owned)
            .ok_or_else(|| {
                ConnectorError::operation(format!(
                    "foreign key target `{}` does not exist in the current state",
                    target
                ))
            })?
    };

    Ok(Some(ForeignKeyRef {
        table,
        column: field.referenced_column().to_owned(),
        on_delete: field.on_delete,
    }))
}

fn column_defs<'a>(
    schemas: &Schemas,
    model: &ModelRef,
    own_table: &str,
    fields: impl Iterator<Item = (&'a String, &'a Field)>,
) -> ConnectorResult<Vec<ColumnDef<'a>>> {
    fields
        .filter(|(_, field)| !field.is_many_to_many())
        .map(|(name, field)| {
            Ok(ColumnDef {
                name: field.column_name(name).into_owned(),
                field,
                references: resolve_references(schemas, model, own_table, field)?,
            })
        })
        .collect()
}

fn index_columns(
    model: &ModelRef,
    entry: &ModelEntry,
    index: &IndexDef,
) -> ConnectorResult<Vec<String>> {
    index
        .fields
        .iter()
        .map(|field_name| {
            entry.column_name(field_name).ok_or_else(|| {
                ConnectorError::operation(format!(
                    "index `{}` references unknown field `{}` on `{}`",
                    index.name, field_name, model
                ))
            })
        })
        .collect()
}

/// The target end of a relational field, resolved to a table name. Targets
/// of a model being dropped may already be gone from the state, in which
/// case the conventional table name is used.
fn target_table(schemas: &Schemas, model: &ModelRef, own_table: &str, target: &ModelRef) -> String {
    if target == model {
        own_table.to_owned()
    } else {
        schemas
            .get_table_name(target)
            .map(str::to_owned)
            .unwrap_or_else(|| default_table_name(target.model_name()))
    }
}

fn through_table_name(
    schemas: &Schemas,
    model: &ModelRef,
    own_table: &str,
    field: &Field,
) -> ConnectorResult<String> {
    if let Some(through) = &field.through {
        return Ok(through.clone());
    }

    let target = field
        .target
        .as_ref()
        .ok_or_else(|| ConnectorError::operation("many-to-many field without a target model"))?;

    Ok(format!(
        "{}_{}",
        own_table,
        target_table(schemas, model, own_table, target)
    ))
}

/// The `CREATE TABLE` statement for a many-to-many through-table: a
/// surrogate key plus one foreign key per end of the relation.
fn render_through_table(
    renderer: &dyn SqlRenderer,
    schemas: &Schemas,
    model: &ModelRef,
    own_table: &str,
    field: &Field,
) -> ConnectorResult<String> {
    let target = field
        .target
        .as_ref()
        .ok_or_else(|| ConnectorError::operation("many-to-many field without a target model"))?;

    let through = through_table_name(schemas, model, own_table, field)?;
    let target_table = target_table(schemas, model, own_table, target);

    let (source_column, target_column) = if target == model {
        (
            format!("from_{}_id", model.model_name().to_snake_case()),
            format!("to_{}_id", target.model_name().to_snake_case()),
        )
    } else {
        (
            format!("{}_id", model.model_name().to_snake_case()),
            format!("{}_id", target.model_name().to_snake_case()),
        )
    };

    let id_field = Field::int().primary_key();
    let source_field = Field::foreign_key(model.clone());
    let target_field = Field::foreign_key(target.clone());

    let columns = vec![
        ColumnDef {
            name: "id".to_owned(),
            field: &id_field,
            references: None,
        },
        ColumnDef {
            name: source_column,
            field: &source_field,
            references: Some(ForeignKeyRef {
                table: own_table.to_owned(),
                column: "id".to_owned(),
                on_delete: source_field.on_delete,
            }),
        },
        ColumnDef {
            name: target_column,
            field: &target_field,
            references: Some(ForeignKeyRef {
                table: target_table,
                column: "id".to_owned(),
                on_delete: target_field.on_delete,
            }),
        },
    ];

    renderer.render_create_table(&through, &columns)
}

/// Re-creation of a dropped model from a previous-state entry: the table,
/// its through-tables, and its indexes.
fn render_model_creation(
    renderer: &dyn SqlRenderer,
    schemas: &Schemas,
    model: &ModelRef,
    entry: &ModelEntry,
) -> ConnectorResult<Vec<String>> {
    let columns = column_defs(schemas, model, &entry.table, entry.fields.iter())?;
    let mut statements = vec![renderer.render_create_table(&entry.table, &columns)?];

    for field in entry.fields.values().filter(|field| field.is_many_to_many()) {
        statements.push(render_through_table(
            renderer,
            schemas,
            model,
            &entry.table,
            field,
        )?);
    }

    for index in &entry.indexes {
        let columns = index_columns(model, entry, index)?;
        statements.push(renderer.render_create_index(&entry.table, &index.name, &columns, index.unique));
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_operations_round_trip() {
        let operations = vec![
            Operation::CreateModel {
                model: ModelRef::new("blog", "User"),
                table: Some("users".to_owned()),
                fields: indexmap::indexmap! {
                    "id".to_owned() => Field::int().primary_key(),
                    "name".to_owned() => Field::char(255),
                },
            },
            Operation::RenameField {
                model: ModelRef::new("blog", "User"),
                field_name: "name".to_owned(),
                new_field_name: Some("full_name".to_owned()),
                new_column_name: None,
            },
            Operation::RunSql {
                forward: "UPDATE users SET name = '';".to_owned(),
                backward: None,
            },
        ];

        for operation in operations {
            let serialized = toml::to_string(&operation).unwrap();
            let parsed: Operation = toml::from_str(&serialized).unwrap();

            assert_eq!(parsed, operation);
        }
    }

    #[test]
    fn required_imports_cover_field_kinds_and_operation_types() {
        let operation = Operation::CreateModel {
            model: ModelRef::new("blog", "User"),
            table: None,
            fields: indexmap::indexmap! {
                "id".to_owned() => Field::int().primary_key(),
                "name".to_owned() => Field::char(255),
                "joined_on".to_owned() => Field::date(),
            },
        };

        assert_eq!(
            operation.required_imports(),
            vec!["Char", "CreateModel", "Date", "Int"]
        );
    }
}
