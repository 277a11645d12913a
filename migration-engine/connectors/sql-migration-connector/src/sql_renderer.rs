//! Render SQL DDL statements.
//!
//! Conventions:
//!
//! - 4 spaces for indentation (see `sql_ddl::SQL_INDENTATION`).
//! - SQL types and keywords are upper case.
//! - Renderer methods do not add semicolons at the end of statements, this
//!   is done when statements are assembled into a script.
//! - Renderers are pure: two calls with identical inputs produce
//!   byte-identical output.

mod common;
mod expanded_alter_column;
mod postgres_renderer;
mod sqlite_renderer;

use crate::error::ConnectorResult;
use crate::fields::{Field, FieldDefault, OnDelete};
use crate::flavour::Dialect;
use sql_ddl::IteratorJoin;

/// A resolved foreign key: the referenced table and column are looked up in
/// the state by the operation before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
    pub on_delete: Option<OnDelete>,
}

/// A column ready for rendering: the resolved column name, the field
/// descriptor, and the resolved foreign key, if any.
#[derive(Debug)]
pub struct ColumnDef<'a> {
    pub name: String,
    pub field: &'a Field,
    pub references: Option<ForeignKeyRef>,
}

pub trait SqlRenderer {
    fn dialect(&self) -> Dialect;

    /// The SQL type for a field, ignoring primary-key special cases.
    fn render_field_type(&self, field: &Field) -> ConnectorResult<String>;

    fn render_default(&self, default: &FieldDefault, field: &Field) -> ConnectorResult<String>;

    /// A single `CREATE TABLE` statement.
    fn render_create_table(&self, table: &str, columns: &[ColumnDef<'_>]) -> ConnectorResult<String>;

    fn render_drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", table)
    }

    fn render_rename_table(&self, name: &str, new_name: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", name, new_name)
    }

    fn render_add_column(&self, table: &str, column: &ColumnDef<'_>) -> ConnectorResult<Vec<String>>;

    /// Dropping a column. On SQLite this is a table rewrite, so the
    /// remaining columns are part of the input.
    fn render_drop_column(
        &self,
        table: &str,
        column_name: &str,
        remaining: &[ColumnDef<'_>],
    ) -> ConnectorResult<Vec<String>>;

    /// Altering a column from `prev` to `next`. `table_columns` is the full
    /// post-alteration column set, needed for the SQLite table rewrite.
    fn render_alter_column(
        &self,
        table: &str,
        column_name: &str,
        prev: &Field,
        next: &Field,
        table_columns: &[ColumnDef<'_>],
    ) -> ConnectorResult<Vec<String>>;

    fn render_rename_column(&self, table: &str, name: &str, new_name: &str) -> String {
        format!("ALTER TABLE {} RENAME COLUMN {} TO {}", table, name, new_name)
    }

    fn render_create_index(
        &self,
        table: &str,
        index_name: &str,
        columns: &[String],
        unique: bool,
    ) -> String {
        format!(
            "CREATE {uniqueness}INDEX {index_name} ON {table} ({columns})",
            uniqueness = if unique { "UNIQUE " } else { "" },
            index_name = index_name,
            table = table,
            columns = columns.iter().join(", "),
        )
    }

    fn render_drop_index(&self, index_name: &str) -> String {
        format!("DROP INDEX {}", index_name)
    }
}
