use super::{
    common::escape_string_literal,
    expanded_alter_column::{expand_postgres_alter_column, PostgresAlterColumn},
    ColumnDef, SqlRenderer,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::fields::{Field, FieldDefault, FieldKind};
use crate::flavour::{Dialect, PostgresFlavour};

impl SqlRenderer for PostgresFlavour {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
            FieldKind::Float => "DOUBLE PRECISION".to_owned(),
            FieldKind::Decimal => format!(
                "DECIMAL({},{})",
                field.max_digits.unwrap_or(10),
                field.decimal_places.unwrap_or(2)
            ),
            FieldKind::Datetime => "TIMESTAMP".to_owned(),
            FieldKind::Date => "DATE".to_owned(),
            FieldKind::Json => "JSONB".to_owned(),
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
        let rendered = match default {
            FieldDefault::AutoNow | FieldDefault::AutoNowAdd => "CURRENT_TIMESTAMP".to_owned(),
            FieldDefault::Value(serde_json::Value::Bool(true)) => "TRUE".to_owned(),
            FieldDefault::Value(serde_json::Value::Bool(false)) => "FALSE".to_owned(),
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

    fn render_create_table(&self, table: &str, columns: &[ColumnDef<'_>]) -> ConnectorResult<String> {
        let rendered_columns = columns
            .iter()
            .map(|column| self.render_column(column))
            .collect::<ConnectorResult<Vec<_>>>()?;

        let foreign_keys = columns
            .iter()
            .filter_map(|column| {
                column.references.as_ref().map(|fk| sql_ddl::postgres::ForeignKey {
                    constrained_column: column.name.as_str().into(),
                    referenced_table: fk.table.as_str().into(),
                    referenced_column: fk.column.as_str().into(),
                    on_delete: fk.on_delete.map(|on_delete| on_delete.as_sql().into()),
                })
            })
            .collect();

        let create_table = sql_ddl::postgres::CreateTable {
            table_name: table.into(),
            columns: rendered_columns,
            foreign_keys,
        };

        Ok(create_table.to_string())
    }

    fn render_add_column(&self, table: &str, column: &ColumnDef<'_>) -> ConnectorResult<Vec<String>> {
        let rendered = self.render_column(column)?.to_string();

        let mut statements = vec![format!(
            "ALTER TABLE {table} ADD COLUMN {column_definition}",
            table = table,
            column_definition = rendered.trim_start(),
        )];

        if let Some(fk) = &column.references {
            let mut constraint = format!(
                "ALTER TABLE {table} ADD CONSTRAINT fk_{table}_{column} FOREIGN KEY ({column}) REFERENCES {referenced_table}({referenced_column})",
                table = table,
                column = column.name,
                referenced_table = fk.table,
                referenced_column = fk.column,
            );

            if let Some(on_delete) = fk.on_delete {
                constraint.push_str(" ON DELETE ");
                constraint.push_str(on_delete.as_sql());
            }

            statements.push(constraint);
        }

        Ok(statements)
    }

    fn render_drop_column(
        &self,
        table: &str,
        column_name: &str,
        _remaining: &[ColumnDef<'_>],
    ) -> ConnectorResult<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            table, column_name
        )])
    }

    fn render_alter_column(
        &self,
        table: &str,
        column_name: &str,
        prev: &Field,
        next: &Field,
        _table_columns: &[ColumnDef<'_>],
    ) -> ConnectorResult<Vec<String>> {
        let steps = expand_postgres_alter_column(self, prev, next)?;

        let statements = steps
            .into_iter()
            .map(|step| match step {
                PostgresAlterColumn::SetType(r#type) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
                    table, column_name, r#type
                ),
                PostgresAlterColumn::SetDefault(default) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    table, column_name, default
                ),
                PostgresAlterColumn::DropDefault => format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT",
                    table, column_name
                ),
                PostgresAlterColumn::SetNotNull => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                    table, column_name
                ),
                PostgresAlterColumn::DropNotNull => format!(
                    "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL",
                    table, column_name
                ),
                PostgresAlterColumn::AddUnique => format!(
                    "ALTER TABLE {table} ADD CONSTRAINT {column}_unique UNIQUE ({column})",
                    table = table,
                    column = column_name,
                ),
                PostgresAlterColumn::DropUnique => format!(
                    "ALTER TABLE {table} DROP CONSTRAINT {column}_unique",
                    table = table,
                    column = column_name,
                ),
            })
            .collect();

        Ok(statements)
    }
}

impl PostgresFlavour {
    fn render_column<'a>(&self, column: &'a ColumnDef<'_>) -> ConnectorResult<sql_ddl::postgres::Column<'a>> {
        let field = column.field;
        let is_serial = field.primary_key && field.kind == FieldKind::Int;

        let r#type = if is_serial {
            "SERIAL".to_owned()
        } else {
            self.render_field_type(field)?
        };

        let default = field
            .default
            .as_ref()
            .map(|default| self.render_default(default, field))
            .transpose()?;

        Ok(sql_ddl::postgres::Column {
            name: column.name.as_str().into(),
            r#type: r#type.into(),
            not_null: !field.nullable && !field.primary_key,
            primary_key: field.primary_key,
            unique: field.unique && !field.primary_key,
            default: default.map(Into::into),
        })
    }
}
