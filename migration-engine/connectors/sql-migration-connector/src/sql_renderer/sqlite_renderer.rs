use super::{
    common::escape_string_literal,
    expanded_alter_column::column_changes,
    ColumnDef, SqlRenderer,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::fields::{Field, FieldDefault, FieldKind};
use crate::flavour::{Dialect, SqliteFlavour};

impl SqlRenderer for SqliteFlavour {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn render_field_type(&self, field: &Field) -> ConnectorResult<String> {
        let rendered = match field.kind {
            FieldKind::Int => "INT".to_owned(),
            FieldKind::BigInt => "BIGINT".to_owned(),
            FieldKind::Char | FieldKind::CharEnum => {
                format!("VARCHAR({})", field.max_length.unwrap_or(255))
            }
            FieldKind::Text => "TEXT".to_owned(),
            FieldKind::Bool => "BOOLEAN".to_owned(),
            FieldKind::Float => "REAL".to_owned(),
            FieldKind::Decimal => format!(
                "DECIMAL({},{})",
                field.max_digits.unwrap_or(10),
                field.decimal_places.unwrap_or(2)
            ),
            FieldKind::Datetime => "TIMESTAMP".to_owned(),
            FieldKind::Date => "DATE".to_owned(),
            FieldKind::Json => "JSON".to_owned(),
            FieldKind::IntEnum => "INT".to_owned(),
            FieldKind::ForeignKey => "INT".to_owned(),
            FieldKind::ManyToMany => {
                return Err(ConnectorError::schema(
                    "many-to-many fields have no column type, they are represented by a through-table",
                ))
            }
        };

        Ok(rendered)
    }

    fn render_default(&self, default: &FieldDefault, _field: &Field) -> ConnectorResult<String> {
        render_default(default)
    }

    fn render_create_table(&self, table: &str, columns: &[ColumnDef<'_>]) -> ConnectorResult<String> {
        let columns = columns
            .iter()
            .map(|column| self.render_column(column))
            .collect::<ConnectorResult<Vec<_>>>()?;

        let create_table = sql_ddl::sqlite::CreateTable {
            table_name: table.into(),
            columns,
        };

        Ok(create_table.to_string())
    }

    fn render_add_column(&self, table: &str, column: &ColumnDef<'_>) -> ConnectorResult<Vec<String>> {
        let rendered = self.render_column(column)?.to_string();

        Ok(vec![format!(
            "ALTER TABLE {table} ADD COLUMN {column_definition}",
            table = table,
            column_definition = rendered.trim_start(),
        )])
    }

    fn render_drop_column(
        &self,
        table: &str,
        _column_name: &str,
        remaining: &[ColumnDef<'_>],
    ) -> ConnectorResult<Vec<String>> {
        let copy_columns: Vec<&str> = remaining.iter().map(|column| column.name.as_str()).collect();

        self.render_table_rewrite(table, remaining, &copy_columns)
    }

    fn render_alter_column(
        &self,
        table: &str,
        _column_name: &str,
        prev: &Field,
        next: &Field,
        table_columns: &[ColumnDef<'_>],
    ) -> ConnectorResult<Vec<String>> {
        if !column_changes(self, prev, next)?.any() {
            return Ok(Vec::new());
        }

        // SQLite cannot alter a column in place. See 'Making Other Kinds Of
        // Table Schema Changes' on https://www.sqlite.org/lang_altertable.html
        let copy_columns: Vec<&str> = table_columns
            .iter()
            .map(|column| column.name.as_str())
            .collect();

        self.render_table_rewrite(table, table_columns, &copy_columns)
    }
}

impl SqliteFlavour {
    fn render_column<'a>(&self, column: &'a ColumnDef<'_>) -> ConnectorResult<sql_ddl::sqlite::Column<'a>> {
        let field = column.field;
        let is_int_pk = field.primary_key && field.kind == FieldKind::Int;

        // An INTEGER PRIMARY KEY AUTOINCREMENT column must use exactly the
        // INTEGER type name.
        let r#type = if is_int_pk {
            "INTEGER".to_owned()
        } else {
            self.render_field_type(field)?
        };

        let default = field
            .default
            .as_ref()
            .map(render_default)
            .transpose()?;

        let references = column.references.as_ref().map(|fk| {
            let mut clause = format!("{}({})", fk.table, fk.column);
            if let Some(on_delete) = fk.on_delete {
                clause.push_str(" ON DELETE ");
                clause.push_str(on_delete.as_sql());
            }
            clause
        });

        Ok(sql_ddl::sqlite::Column {
            name: column.name.as_str().into(),
            r#type: r#type.into(),
            not_null: !field.nullable && !field.primary_key,
            primary_key: field.primary_key,
            autoincrement: is_int_pk,
            unique: field.unique && !field.primary_key,
            default: default.map(Into::into),
            references: references.map(Into::into),
        })
    }

    fn render_table_rewrite(
        &self,
        table: &str,
        columns: &[ColumnDef<'_>],
        copy_columns: &[&str],
    ) -> ConnectorResult<Vec<String>> {
        let temporary_table = format!("__new__{}", table);
        let create_table = self.render_create_table(&temporary_table, columns)?;
        let columns_list = copy_columns.join(", ");

        Ok(vec![
            "BEGIN TRANSACTION".to_owned(),
            create_table,
            format!(
                "INSERT INTO {temporary} ({columns}) SELECT {columns} FROM {table}",
                temporary = temporary_table,
                columns = columns_list,
                table = table,
            ),
            format!("DROP TABLE {}", table),
            format!(
                "ALTER TABLE {temporary} RENAME TO {table}",
                temporary = temporary_table,
                table = table,
            ),
            "COMMIT".to_owned(),
        ])
    }
}

fn render_default(default: &FieldDefault) -> ConnectorResult<String> {
    let rendered = match default {
        FieldDefault::AutoNow | FieldDefault::AutoNowAdd => "CURRENT_TIMESTAMP".to_owned(),
        FieldDefault::Value(serde_json::Value::Bool(true)) => "1".to_owned(),
        FieldDefault::Value(serde_json::Value::Bool(false)) => "0".to_owned(),
        FieldDefault::Value(serde_json::Value::Number(number)) => number.to_string(),
        FieldDefault::Value(serde_json::Value::String(value)) => {
            format!("'{}'", escape_string_literal(value))
        }
        FieldDefault::Value(value @ serde_json::Value::Array(_))
        | FieldDefault::Value(value @ serde_json::Value::Object(_)) => {
            format!("'{}'", escape_string_literal(&value.to_string()))
        }
        FieldDefault::Value(serde_json::Value::Null) => {
            return Err(ConnectorError::schema("null is not a valid field default"))
        }
    };

    Ok(rendered)
}
