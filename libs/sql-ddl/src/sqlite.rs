use crate::common::{IteratorJoin, SQL_INDENTATION};
use std::borrow::Cow;
use std::fmt::Display;

pub struct CreateTable<'a> {
    pub table_name: Cow<'a, str>,
    pub columns: Vec<Column<'a>>,
}

impl Display for CreateTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CREATE TABLE \"{}\" (", self.table_name)?;
        f.write_str(&self.columns.iter().join(",\n"))?;
        write!(f, "\n)")
    }
}

/// A column definition. On SQLite, foreign keys are rendered inline as a
/// `REFERENCES` clause on the constrained column.
pub struct Column<'a> {
    pub name: Cow<'a, str>,
    pub r#type: Cow<'a, str>,
    pub not_null: bool,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub unique: bool,
    pub default: Option<Cow<'a, str>>,
    pub references: Option<Cow<'a, str>>,
}

impl<'a> Column<'a> {
    pub fn new(name: impl Into<Cow<'a, str>>, r#type: impl Into<Cow<'a, str>>) -> Self {
        Column {
            name: name.into(),
            r#type: r#type.into(),
            not_null: false,
            primary_key: false,
            autoincrement: false,
            unique: false,
            default: None,
            references: None,
        }
    }
}

impl Display for Column<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{} {}", SQL_INDENTATION, self.name, self.r#type)?;

        if self.primary_key {
            f.write_str(" PRIMARY KEY")?;
        }

        if self.autoincrement {
            f.write_str(" AUTOINCREMENT")?;
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

        if let Some(references) = &self.references {
            write!(f, " REFERENCES {}", references)?;
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
