use crate::common::{IteratorJoin, SQL_INDENTATION};
use std::borrow::Cow;
use std::fmt::Display;

pub struct CreateTable<'a> {
    pub table_name: Cow<'a, str>,
    pub columns: Vec<Column<'a>>,
    pub foreign_keys: Vec<ForeignKey<'a>>,
}

impl Display for CreateTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CREATE TABLE \"{}\" (", self.table_name)?;
        f.write_str(&self.columns.iter().join(",\n"))?;

        for foreign_key in &self.foreign_keys {
            write!(f, ",\n{}{}", SQL_INDENTATION, foreign_key)?;
        }

        write!(f, "\n)")
    }
}

pub struct Column<'a> {
    pub name: Cow<'a, str>,
    pub r#type: Cow<'a, str>,
    pub not_null: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<Cow<'a, str>>,
}

impl<'a> Column<'a> {
    pub fn new(name: impl Into<Cow<'a, str>>, r#type: impl Into<Cow<'a, str>>) -> Self {
        Column {
            name: name.into(),
            r#type: r#type.into(),
            not_null: false,
            primary_key: false,
            unique: false,
            default: None,
        }
    }
}

impl Display for Column<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{} {}", SQL_INDENTATION, self.name, self.r#type)?;

        if self.primary_key {
            f.write_str(" PRIMARY KEY")?;
        }

        if self.not_null {
            f.write_str(" NOT NULL")?;
        }

        if self.unique {
            f.write_str(" UNIQUE")?;
        }

        if let Some(default) = &self.default {
            write!(f, " DEFAULT {}", default)?;
        }

        Ok(())
    }
}

/// A table-level `FOREIGN KEY` constraint.
pub struct ForeignKey<'a> {
    pub constrained_column: Cow<'a, str>,
    pub referenced_table: Cow<'a, str>,
    pub referenced_column: Cow<'a, str>,
    pub on_delete: Option<Cow<'a, str>>,
}

impl Display for ForeignKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FOREIGN KEY ({constrained}) REFERENCES {table}({referenced})",
            constrained = self.constrained_column,
            table = self.referenced_table,
            referenced = self.referenced_column,
        )?;

        if let Some(on_delete) = &self.on_delete {
            write!(f, " ON DELETE {}", on_delete)?;
        }

        Ok(())
    }
}

pub struct CreateIndex<'a> {
    pub index_name: Cow<'a, str>,
    pub table_name: Cow<'a, str>,
    pub columns: Vec<Cow<'a, str>>,
    pub unique: bool,
}

impl Display for CreateIndex<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CREATE {uniqueness}INDEX {index_name} ON {table_name} ({columns})",
            uniqueness = if self.unique { "UNIQUE " } else { "" },
            index_name = self.index_name,
            table_name = self.table_name,
            columns = self.columns.iter().join(", "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_with_serial_primary_key() {
        let create_table = CreateTable {
            table_name: "cats".into(),
            columns: vec![
                Column {
                    primary_key: true,
                    ..Column::new("id", "SERIAL")
                },
                Column {
                    not_null: true,
                    ..Column::new("name", "VARCHAR(255)")
                },
            ],
            foreign_keys: Vec::new(),
        };

        let expected = r#"
CREATE TABLE "cats" (
    id SERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL
)
"#;

        assert_eq!(create_table.to_string(), expected.trim_matches('\n'));
    }

    #[test]
    fn create_table_with_foreign_key() {
        let create_table = CreateTable {
            table_name: "comments".into(),
            columns: vec![Column {
                not_null: true,
                ..Column::new("blog_id", "INT")
            }],
            foreign_keys: vec![ForeignKey {
                constrained_column: "blog_id".into(),
                referenced_table: "blogs".into(),
                referenced_column: "id".into(),
                on_delete: Some("CASCADE".into()),
            }],
        };

        let expected = r#"
CREATE TABLE "comments" (
    blog_id INT NOT NULL,
    FOREIGN KEY (blog_id) REFERENCES blogs(id) ON DELETE CASCADE
)
"#;

        assert_eq!(create_table.to_string(), expected.trim_matches('\n'));
    }

    #[test]
    fn create_index() {
        let create_index = CreateIndex {
            index_name: "idx_cats_name_0a1b2c".into(),
            table_name: "cats".into(),
            columns: vec!["name".into()],
            unique: false,
        };

        assert_eq!(
            create_index.to_string(),
            "CREATE INDEX idx_cats_name_0a1b2c ON cats (name)"
        );
    }
}
