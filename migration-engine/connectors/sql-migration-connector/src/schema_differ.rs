//! The schema differ: computes the ordered operation sequence turning a
//! prior state into a target schema.
//!
//! Ordering rules:
//!
//! - Added models first, topologically sorted on their non-nullable
//!   foreign keys and many-to-many relations, alphabetical tie-break.
//!   Nullable foreign keys into models created later are deferred to an
//!   `AddField` queued right after the target's `CreateModel`.
//! - Then field and index diffs on surviving models, per model: drops,
//!   adds, alters, index drops, index adds.
//! - Dropped models last, in reverse dependency order.

use crate::error::{ConnectorError, ConnectorResult};
use crate::fields::{Field, OnDelete};
use crate::model_ref::ModelRef;
use crate::operations::Operation;
use crate::state::{default_table_name, ModelEntry, Schemas};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

/// The differ output: the operation sequence plus the app-level dependency
/// edges it induces (app → apps whose newly created models it references).
#[derive(Debug)]
pub struct DiffResult {
    pub operations: Vec<Operation>,
    pub app_dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

pub struct SchemaDiffer<'a> {
    prior: &'a Schemas,
    target: &'a Schemas,
}

impl<'a> SchemaDiffer<'a> {
    pub fn new(prior: &'a Schemas, target: &'a Schemas) -> Self {
        SchemaDiffer { prior, target }
    }

    pub fn diff(&self) -> ConnectorResult<DiffResult> {
        let prior_refs: BTreeSet<ModelRef> = self.prior.model_refs().into_iter().collect();
        let target_refs: BTreeSet<ModelRef> = self.target.model_refs().into_iter().collect();

        let added: BTreeSet<ModelRef> = target_refs.difference(&prior_refs).cloned().collect();
        let removed: BTreeSet<ModelRef> = prior_refs.difference(&target_refs).cloned().collect();
        let common: BTreeSet<ModelRef> = prior_refs.intersection(&target_refs).cloned().collect();

        let mut operations = Vec::new();

        self.push_added_models(&added, &mut operations)?;

        for model in &common {
            self.push_model_changes(model, &mut operations)?;
        }

        self.push_removed_models(&removed, &mut operations);

        let app_dependencies = app_dependencies(&operations, &added);

        Ok(DiffResult {
            operations,
            app_dependencies,
        })
    }

    fn push_added_models(
        &self,
        added: &BTreeSet<ModelRef>,
        operations: &mut Vec<Operation>,
    ) -> ConnectorResult<()> {
        let order = self.creation_order(added)?;

        let mut created: HashSet<ModelRef> = HashSet::new();
        let mut deferred: Vec<(ModelRef, Operation)> = Vec::new();

        for model in order {
            let entry = self
                .target
                .get_model(&model)
                .unwrap_or_else(|| unreachable!("added model is in the target schema"));

            let mut create_fields = indexmap::IndexMap::new();

            for (field_name, field) in &entry.fields {
                match self.deferral_target(&model, field, added, &created) {
                    Some(waiting_for) => deferred.push((
                        waiting_for,
                        Operation::AddField {
                            model: model.clone(),
                            field_name: field_name.clone(),
                            field: field.clone(),
                        },
                    )),
                    None => {
                        create_fields.insert(field_name.clone(), field.clone());
                    }
                }
            }

            let table = if entry.table == default_table_name(model.model_name()) {
                None
            } else {
                Some(entry.table.clone())
            };

            operations.push(Operation::CreateModel {
                model: model.clone(),
                table,
                fields: create_fields,
            });
            created.insert(model.clone());

            for index in &entry.indexes {
                operations.push(Operation::AddIndex {
                    model: model.clone(),
                    index: index.clone(),
                });
            }

            // Cycle-breaking fields waiting for this model.
            let (ready, waiting): (Vec<_>, Vec<_>) = deferred
                .drain(..)
                .partition(|(waiting_for, _)| *waiting_for == model);
            deferred = waiting;

            let mut ready: Vec<Operation> = ready.into_iter().map(|(_, op)| op).collect();
            ready.sort_by(|a, b| deferred_sort_key(a).cmp(&deferred_sort_key(b)));
            operations.extend(ready);
        }

        // Every deferral waits for an added model, which was created above.
        debug_assert!(deferred.is_empty());
        operations.extend(deferred.into_iter().map(|(_, op)| op));

        Ok(())
    }

    /// The model this field must wait for before it can exist, if any.
    fn deferral_target(
        &self,
        model: &ModelRef,
        field: &Field,
        added: &BTreeSet<ModelRef>,
        created: &HashSet<ModelRef>,
    ) -> Option<ModelRef> {
        if !field.is_foreign_key() && !field.is_many_to_many() {
            return None;
        }

        let target = field.target.as_ref()?;

        if target == model || !added.contains(target) || created.contains(target) {
            return None;
        }

        Some(target.clone())
    }

    /// Stable topological order for model creation. Non-nullable foreign
    /// keys and many-to-many relations into other added models force the
    /// target to be created first; a cycle among those has no valid order.
    fn creation_order(&self, added: &BTreeSet<ModelRef>) -> ConnectorResult<Vec<ModelRef>> {
        let mut in_degree: BTreeMap<&ModelRef, usize> =
            added.iter().map(|model| (model, 0)).collect();
        let mut dependents: HashMap<&ModelRef, Vec<&ModelRef>> = HashMap::new();

        for model in added {
            let entry = self
                .target
                .get_model(model)
                .unwrap_or_else(|| unreachable!("added model is in the target schema"));

            for field in entry.fields.values() {
                let hard_edge = (field.is_foreign_key() && !field.nullable)
                    || field.is_many_to_many();

                if !hard_edge {
                    continue;
                }

                if let Some(target) = &field.target {
                    if target != model && added.contains(target) {
                        *in_degree.get_mut(model).unwrap_or_else(|| unreachable!()) += 1;
                        dependents.entry(target).or_default().push(model);
                    }
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<&ModelRef>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(model, _)| Reverse(*model))
            .collect();

        let mut order = Vec::with_capacity(added.len());

        while let Some(Reverse(model)) = ready.pop() {
            order.push(model.clone());

            for dependent in dependents.remove(model).unwrap_or_default() {
                let degree = in_degree
                    .get_mut(dependent)
                    .unwrap_or_else(|| unreachable!());
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() != added.len() {
            let ordered: HashSet<&ModelRef> = order.iter().collect();
            let cycle: Vec<ModelRef> = added
                .iter()
                .filter(|model| !ordered.contains(model))
                .cloned()
                .collect();
            return Err(ConnectorError::UnbuildableCycle(cycle));
        }

        Ok(order)
    }

    fn push_model_changes(
        &self,
        model: &ModelRef,
        operations: &mut Vec<Operation>,
    ) -> ConnectorResult<()> {
        let prior_entry = self
            .prior
            .get_model(model)
            .unwrap_or_else(|| unreachable!("common model is in the prior state"));
        let target_entry = self
            .target
            .get_model(model)
            .unwrap_or_else(|| unreachable!("common model is in the target schema"));

        if prior_entry.table != target_entry.table {
            operations.push(Operation::RenameModel {
                model: model.clone(),
                new_table: Some(target_entry.table.clone()),
                new_model_name: None,
            });
        }

        let prior_fields: BTreeSet<&String> = prior_entry.fields.keys().collect();
        let target_fields: BTreeSet<&String> = target_entry.fields.keys().collect();

        for field_name in prior_fields.difference(&target_fields) {
            operations.push(Operation::DropField {
                model: model.clone(),
                field_name: (*field_name).clone(),
            });
        }

        for field_name in target_fields.difference(&prior_fields) {
            operations.push(Operation::AddField {
                model: model.clone(),
                field_name: (*field_name).clone(),
                field: target_entry.fields[*field_name].clone(),
            });
        }

        for field_name in prior_fields.intersection(&target_fields) {
            let prior_field = &prior_entry.fields[*field_name];
            let target_field = &target_entry.fields[*field_name];

            let prior_normalized = normalized_field(self.prior, model, field_name, prior_field);
            let target_normalized = normalized_field(self.target, model, field_name, target_field);

            if prior_normalized != target_normalized {
                operations.push(Operation::AlterField {
                    model: model.clone(),
                    field_name: (*field_name).clone(),
                    field: target_field.clone(),
                });
            }
        }

        self.push_index_changes(model, prior_entry, target_entry, operations);

        Ok(())
    }

    fn push_index_changes(
        &self,
        model: &ModelRef,
        prior_entry: &ModelEntry,
        target_entry: &ModelEntry,
        operations: &mut Vec<Operation>,
    ) {
        let target_by_name: HashMap<&str, &crate::state::IndexDef> = target_entry
            .indexes
            .iter()
            .map(|index| (index.name.as_str(), index))
            .collect();
        let prior_by_name: HashMap<&str, &crate::state::IndexDef> = prior_entry
            .indexes
            .iter()
            .map(|index| (index.name.as_str(), index))
            .collect();

        for index in &prior_entry.indexes {
            let drop = match target_by_name.get(index.name.as_str()) {
                None => true,
                Some(target_index) => *target_index != index,
            };

            if drop {
                operations.push(Operation::DropIndex {
                    model: model.clone(),
                    index_name: index.name.clone(),
                });
            }
        }

        for index in &target_entry.indexes {
            let add = match prior_by_name.get(index.name.as_str()) {
                None => true,
                Some(prior_index) => *prior_index != index,
            };

            if add {
                operations.push(Operation::AddIndex {
                    model: model.clone(),
                    index: index.clone(),
                });
            }
        }
    }

    /// Removed models, most-referencing first so no dropped table is still
    /// referenced by a surviving foreign key among the removed set.
    fn push_removed_models(&self, removed: &BTreeSet<ModelRef>, operations: &mut Vec<Operation>) {
        let mut in_degree: BTreeMap<&ModelRef, usize> =
            removed.iter().map(|model| (model, 0)).collect();
        let mut dependents: HashMap<&ModelRef, Vec<&ModelRef>> = HashMap::new();

        for model in removed {
            let Some(entry) = self.prior.get_model(model) else {
                continue;
            };

            for field in entry.fields.values() {
                if !field.is_foreign_key() && !field.is_many_to_many() {
                    continue;
                }

                if let Some(target) = &field.target {
                    if target != model && removed.contains(target) {
                        // `model` references `target`: drop `model` first.
                        *in_degree.get_mut(target).unwrap_or_else(|| unreachable!()) += 1;
                        dependents.entry(model).or_default().push(target);
                    }
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<&ModelRef>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(model, _)| Reverse(*model))
            .collect();

        let mut order = Vec::with_capacity(removed.len());

        while let Some(Reverse(model)) = ready.pop() {
            order.push(model.clone());

            for dependent in dependents.remove(model).unwrap_or_default() {
                let degree = in_degree
                    .get_mut(dependent)
                    .unwrap_or_else(|| unreachable!());
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        // A reference cycle among dropped models has no strict order; fall
        // back to the alphabetical one for the remainder.
        if order.len() != removed.len() {
            let ordered: HashSet<&ModelRef> = order.iter().collect();
            let mut remainder: Vec<ModelRef> = removed
                .iter()
                .filter(|model| !ordered.contains(model))
                .cloned()
                .collect();
            remainder.sort();
            order.extend(remainder);
        }

        for model in order {
            operations.push(Operation::DropModel { model });
        }
    }
}

fn deferred_sort_key(operation: &Operation) -> (String, String) {
    match operation {
        Operation::AddField {
            model, field_name, ..
        } => (model.as_str().to_owned(), field_name.clone()),
        _ => (String::new(), String::new()),
    }
}

/// Structural field comparison on resolved descriptors, so that an
/// implicit column name and a materialized identical one do not read as a
/// change.
fn normalized_field(
    schemas: &Schemas,
    model: &ModelRef,
    field_name: &str,
    field: &Field,
) -> Field {
    let mut normalized = field.clone();

    if normalized.is_many_to_many() {
        if normalized.through.is_none() {
            normalized.through = schemas.through_table(model, field).ok();
        }
        return normalized;
    }

    normalized.source_column = Some(field.column_name(field_name).into_owned());

    if normalized.is_foreign_key() {
        normalized.to_column = Some(field.referenced_column().to_owned());
        if normalized.on_delete.is_none() {
            normalized.on_delete = Some(OnDelete::Cascade);
        }
    }

    normalized
}

/// The cross-app dependency edges induced by the emitted operations: app
/// `a` depends on app `b` when one of `a`'s operations references a model
/// in `b` that this diff newly creates.
fn app_dependencies(
    operations: &[Operation],
    added: &BTreeSet<ModelRef>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    let mut record = |app: &str, field: &Field| {
        if let Some(target) = &field.target {
            if target.app() != app && added.contains(target) {
                dependencies
                    .entry(app.to_owned())
                    .or_default()
                    .insert(target.app().to_owned());
            }
        }
    };

    for operation in operations {
        match operation {
            Operation::CreateModel { model, fields, .. } => {
                for field in fields.values() {
                    record(model.app(), field);
                }
            }
            Operation::AddField { model, field, .. }
            | Operation::AlterField { model, field, .. } => {
                record(model.app(), field);
            }
            _ => (),
        }
    }

    dependencies
}
