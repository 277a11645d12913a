//! Expansion of a column alteration into the per-dialect change steps that
//! are actually needed for the `(prev, next)` descriptor pair.

use crate::error::ConnectorResult;
use crate::fields::Field;
use crate::sql_renderer::SqlRenderer;

/// The SQL-affecting differences between two descriptors of the same
/// column.
#[derive(Debug, Default)]
pub(crate) struct ColumnChanges {
    pub(crate) type_changed: bool,
    pub(crate) default_changed: bool,
    pub(crate) nullability_changed: bool,
    pub(crate) uniqueness_changed: bool,
}

impl ColumnChanges {
    pub(crate) fn any(&self) -> bool {
        self.type_changed || self.default_changed || self.nullability_changed || self.uniqueness_changed
    }
}

pub(crate) fn column_changes(
    renderer: &dyn SqlRenderer,
    prev: &Field,
    next: &Field,
) -> ConnectorResult<ColumnChanges> {
    let prev_type = renderer.render_field_type(prev)?;
    let next_type = renderer.render_field_type(next)?;

    let prev_default = prev
        .default
        .as_ref()
        .map(|default| renderer.render_default(default, prev))
        .transpose()?;
    let next_default = next
        .default
        .as_ref()
        .map(|default| renderer.render_default(default, next))
        .transpose()?;

    Ok(ColumnChanges {
        type_changed: prev_type != next_type,
        default_changed: prev_default != next_default,
        nullability_changed: prev.nullable != next.nullable,
        uniqueness_changed: (prev.unique && !prev.primary_key) != (next.unique && !next.primary_key),
    })
}

/// https://www.postgresql.org/docs/current/sql-altertable.html
#[derive(Debug)]
pub(crate) enum PostgresAlterColumn {
    SetType(String),
    SetDefault(String),
    DropDefault,
    SetNotNull,
    DropNotNull,
    AddUnique,
    DropUnique,
}

pub(crate) fn expand_postgres_alter_column(
    renderer: &dyn SqlRenderer,
    prev: &Field,
    next: &Field,
) -> ConnectorResult<Vec<PostgresAlterColumn>> {
    let changes = column_changes(renderer, prev, next)?;
    let mut steps = Vec::new();

    if changes.type_changed {
        steps.push(PostgresAlterColumn::SetType(renderer.render_field_type(next)?));
    }

    if changes.default_changed {
        match &next.default {
            Some(default) => steps.push(PostgresAlterColumn::SetDefault(
                renderer.render_default(default, next)?,
            )),
            None => steps.push(PostgresAlterColumn::DropDefault),
        }
    }

    if changes.nullability_changed {
        if next.nullable {
            steps.push(PostgresAlterColumn::DropNotNull);
        } else {
            steps.push(PostgresAlterColumn::SetNotNull);
        }
    }

    if changes.uniqueness_changed {
        if next.unique && !next.primary_key {
            steps.push(PostgresAlterColumn::AddUnique);
        } else {
            steps.push(PostgresAlterColumn::DropUnique);
        }
    }

    Ok(steps)
}
