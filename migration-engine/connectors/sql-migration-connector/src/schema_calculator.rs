//! Calculation of a target schema from model declarations.
//!
//! The model registry hands us raw declarations (fields plus model meta).
//! This module normalizes them into the same shape the state uses: default
//! table names filled in, implicit indexes materialized with deterministic
//! names, through-tables resolved, and many-to-many relations collapsed to
//! a single canonical direction.

use crate::error::{ConnectorError, ConnectorResult};
use crate::fields::Field;
use crate::model_ref::ModelRef;
use crate::state::{default_index_name, default_table_name, IndexDef, ModelEntry, Schemas};
use indexmap::IndexMap;
use std::collections::HashSet;

/// A `Meta.indexes` entry: a field list with an optional explicit name.
#[derive(Debug, Clone, Default)]
pub struct IndexDecl {
    pub fields: Vec<String>,
    pub name: Option<String>,
    pub unique: bool,
}

/// One declared model, before normalization.
#[derive(Debug, Clone, Default)]
pub struct ModelDecl {
    pub table: Option<String>,
    pub fields: IndexMap<String, Field>,
    pub indexes: Vec<IndexDecl>,
    pub unique_together: Vec<Vec<String>>,
}

/// Normalizes the whole declared universe into a target `Schemas`.
pub fn calculate_target_schema(
    decls: &IndexMap<String, IndexMap<String, ModelDecl>>,
) -> ConnectorResult<Schemas> {
    let mut tables: IndexMap<ModelRef, String> = IndexMap::new();

    for (app, models) in decls {
        for (model_name, decl) in models {
            let model = ModelRef::new(app, model_name);
            let table = decl
                .table
                .clone()
                .unwrap_or_else(|| default_table_name(model_name));
            tables.insert(model, table);
        }
    }

    validate_relation_targets(decls, &tables)?;
    let dropped_m2m = non_canonical_m2m_fields(decls);

    let mut schemas = Schemas::default();

    for (app, models) in decls {
        for (model_name, decl) in models {
            let model = ModelRef::new(app, model_name);
            let table = &tables[&model];
            let mut entry = ModelEntry::new(table.clone());

            for (field_name, field) in &decl.fields {
                if dropped_m2m.contains(&(model.clone(), field_name.clone())) {
                    continue;
                }

                let mut field = field.clone();

                // Materialize the through-table so descriptors in artifacts
                // are self-contained and diffs stay stable.
                if field.is_many_to_many() && field.through.is_none() {
                    let target = relation_target(&model, field_name, &field)?;
                    field.through = Some(format!("{}_{}", table, tables[&target]));
                }

                entry.fields.insert(field_name.clone(), field);
            }

            entry.indexes = model_indexes(&model, table, &entry.fields, decl)?;
            schemas.insert_model(&model, entry);
        }
    }

    Ok(schemas)
}

fn relation_target(
    model: &ModelRef,
    field_name: &str,
    field: &Field,
) -> ConnectorResult<ModelRef> {
    field.target.clone().ok_or_else(|| {
        ConnectorError::schema(format!(
            "relational field `{}` on `{}` has no target model",
            field_name, model
        ))
    })
}

fn validate_relation_targets(
    decls: &IndexMap<String, IndexMap<String, ModelDecl>>,
    tables: &IndexMap<ModelRef, String>,
) -> ConnectorResult<()> {
    for (app, models) in decls {
        for (model_name, decl) in models {
            let model = ModelRef::new(app, model_name);

            for (field_name, field) in &decl.fields {
                if !field.is_foreign_key() && !field.is_many_to_many() {
                    continue;
                }

                let target = relation_target(&model, field_name, field)?;
                if !tables.contains_key(&target) {
                    return Err(ConnectorError::schema(format!(
                        "field `{}` on `{}` references unknown model `{}`",
                        field_name, model, target
                    )));
                }
            }
        }
    }

    Ok(())
}

/// The non-canonical ends of many-to-many relations declared from both
/// sides. The relation must appear exactly once in operations; the
/// canonical direction is the lexicographic minimum of `(model, field)`.
fn non_canonical_m2m_fields(
    decls: &IndexMap<String, IndexMap<String, ModelDecl>>,
) -> HashSet<(ModelRef, String)> {
    let mut m2m_fields: Vec<(ModelRef, String, ModelRef)> = Vec::new();

    for (app, models) in decls {
        for (model_name, decl) in models {
            let model = ModelRef::new(app, model_name);

            for (field_name, field) in &decl.fields {
                if let (true, Some(target)) = (field.is_many_to_many(), field.target.as_ref()) {
                    m2m_fields.push((model.clone(), field_name.clone(), target.clone()));
                }
            }
        }
    }

    let mut dropped = HashSet::new();

    for (model, field_name, target) in &m2m_fields {
        if model == target {
            continue;
        }

        let has_smaller_counterpart = m2m_fields.iter().any(|(other, other_field, other_target)| {
            other == target
                && other_target == model
                && (other, other_field) < (model, field_name)
        });

        if has_smaller_counterpart {
            dropped.insert((model.clone(), field_name.clone()));
        }
    }

    dropped
}

/// Declared indexes, `unique_together` entries, and `db_index` promotions,
/// in declaration order, with deterministic names where none is set.
fn model_indexes(
    model: &ModelRef,
    table: &str,
    fields: &IndexMap<String, Field>,
    decl: &ModelDecl,
) -> ConnectorResult<Vec<IndexDef>> {
    let mut indexes = Vec::new();

    let check_fields = |index_fields: &[String]| -> ConnectorResult<()> {
        for field_name in index_fields {
            if !fields.contains_key(field_name) {
                return Err(ConnectorError::schema(format!(
                    "index on `{}` references unknown field `{}`",
                    model, field_name
                )));
            }
        }
        Ok(())
    };

    for index in &decl.indexes {
        check_fields(&index.fields)?;
        let name = index
            .name
            .clone()
            .unwrap_or_else(|| default_index_name(table, &index.fields));
        indexes.push(IndexDef::new(name, index.fields.clone(), index.unique));
    }

    for unique_fields in &decl.unique_together {
        check_fields(unique_fields)?;
        let name = default_index_name(table, unique_fields);
        indexes.push(IndexDef::new(name, unique_fields.clone(), true));
    }

    for (field_name, field) in fields {
        if field.db_index && !field.unique && !field.primary_key {
            let index_fields = vec![field_name.clone()];
            let name = default_index_name(table, &index_fields);
            indexes.push(IndexDef::new(name, index_fields, false));
        }
    }

    Ok(indexes)
}
