//! Rendering of migration artifacts.

use crate::error::{CoreError, CoreResult};
use crate::migration::Migration;
use heck::ToUpperCamelCase;
use sql_migration_connector::Operation;
use std::fmt::Write as _;

/// The artifact class name: `Pascal(name.split('_', 1)[1]) + "Migration"`.
pub fn class_name(migration_name: &str) -> String {
    let base = migration_name
        .split_once('_')
        .map(|(_, rest)| rest)
        .unwrap_or(migration_name);

    format!("{}Migration", base.to_upper_camel_case())
}

/// Every field-kind and operation-type symbol the operations refer to,
/// sorted and deduplicated.
pub fn collect_uses(operations: &[Operation]) -> Vec<String> {
    let mut uses: Vec<String> = operations
        .iter()
        .flat_map(|operation| operation.required_imports())
        .map(str::to_owned)
        .collect();

    uses.sort();
    uses.dedup();
    uses
}

/// Renders an artifact into its on-disk form: a header comment with a
/// human-readable summary, followed by the TOML document.
pub fn render_migration(migration: &Migration) -> CoreResult<String> {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "# Migration {} for app {}.",
        migration.name, migration.app
    );

    if migration.operations.is_empty() {
        let _ = writeln!(out, "#\n# Write your operations here.");
    } else {
        let _ = writeln!(out, "#\n# Changes:");
        for operation in &migration.operations {
            let _ = writeln!(out, "#   - {}", operation.describe());
        }
    }

    out.push('\n');

    let document = toml::to_string_pretty(migration).map_err(|err| {
        CoreError::discovery(format!(
            "failed to serialize migration `{}`: {}",
            migration.name, err
        ))
    })?;
    out.push_str(&document);

    Ok(out)
}

/// An artifact with no operations, for hand-written migrations.
pub fn empty_migration(app: &str, name: &str) -> Migration {
    Migration {
        class: class_name(name),
        app: app.to_owned(),
        uses: Vec::new(),
        dependencies: Vec::new(),
        operations: Vec::new(),
        name: name.to_owned(),
    }
}
