//! Field descriptors: the typed representation of a model column (or, for
//! many-to-many fields, of a through-table).

use crate::model_ref::ModelRef;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// The closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int,
    BigInt,
    Char,
    Text,
    Bool,
    Float,
    Decimal,
    Datetime,
    Date,
    Json,
    IntEnum,
    CharEnum,
    ForeignKey,
    ManyToMany,
}

impl FieldKind {
    /// The symbol name used in generated migration artifacts.
    pub fn import_name(self) -> &'static str {
        match self {
            FieldKind::Int => "Int",
            FieldKind::BigInt => "BigInt",
            FieldKind::Char => "Char",
            FieldKind::Text => "Text",
            FieldKind::Bool => "Bool",
            FieldKind::Float => "Float",
            FieldKind::Decimal => "Decimal",
            FieldKind::Datetime => "Datetime",
            FieldKind::Date => "Date",
            FieldKind::Json => "Json",
            FieldKind::IntEnum => "IntEnum",
            FieldKind::CharEnum => "CharEnum",
            FieldKind::ForeignKey => "ForeignKey",
            FieldKind::ManyToMany => "ManyToMany",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl OnDelete {
    pub fn as_sql(self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::NoAction => "NO ACTION",
        }
    }
}

/// A field default. Callable defaults have no textual representation and
/// never reach SQL, so they are simply absent here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDefault {
    Value(serde_json::Value),
    AutoNow,
    AutoNowAdd,
}

/// A field descriptor.
///
/// Kind parameters (`max_length`, `target`, …) are flat optional members
/// so the descriptor round-trips through migration artifacts without any
/// custom parsing. Field order matters for the TOML serializer: scalar
/// members first, possibly-table members (`default`) last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_digits: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_places: Option<u32>,
    /// Target model for relational kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ModelRef>,
    /// Referenced column for foreign keys. Defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<OnDelete>,
    /// Through-table for many-to-many fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub db_index: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldDefault>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl Field {
    pub fn new(kind: FieldKind) -> Self {
        Field {
            kind,
            max_length: None,
            max_digits: None,
            decimal_places: None,
            target: None,
            to_column: None,
            on_delete: None,
            through: None,
            nullable: false,
            unique: false,
            primary_key: false,
            db_index: false,
            source_column: None,
            default: None,
        }
    }

    pub fn int() -> Self {
        Field::new(FieldKind::Int)
    }

    pub fn big_int() -> Self {
        Field::new(FieldKind::BigInt)
    }

    pub fn char(max_length: u32) -> Self {
        Field {
            max_length: Some(max_length),
            ..Field::new(FieldKind::Char)
        }
    }

    pub fn text() -> Self {
        Field::new(FieldKind::Text)
    }

    pub fn bool() -> Self {
        Field::new(FieldKind::Bool)
    }

    pub fn float() -> Self {
        Field::new(FieldKind::Float)
    }

    pub fn decimal(max_digits: u32, decimal_places: u32) -> Self {
        Field {
            max_digits: Some(max_digits),
            decimal_places: Some(decimal_places),
            ..Field::new(FieldKind::Decimal)
        }
    }

    pub fn datetime() -> Self {
        Field::new(FieldKind::Datetime)
    }

    pub fn date() -> Self {
        Field::new(FieldKind::Date)
    }

    pub fn json() -> Self {
        Field::new(FieldKind::Json)
    }

    pub fn int_enum() -> Self {
        Field::new(FieldKind::IntEnum)
    }

    pub fn char_enum(max_length: u32) -> Self {
        Field {
            max_length: Some(max_length),
            ..Field::new(FieldKind::CharEnum)
        }
    }

    pub fn foreign_key(target: ModelRef) -> Self {
        Field {
            target: Some(target),
            on_delete: Some(OnDelete::Cascade),
            ..Field::new(FieldKind::ForeignKey)
        }
    }

    pub fn many_to_many(target: ModelRef) -> Self {
        Field {
            target: Some(target),
            ..Field::new(FieldKind::ManyToMany)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.db_index = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(FieldDefault::Value(value));
        self
    }

    pub fn auto_now(mut self) -> Self {
        self.default = Some(FieldDefault::AutoNow);
        self
    }

    pub fn auto_now_add(mut self) -> Self {
        self.default = Some(FieldDefault::AutoNowAdd);
        self
    }

    pub fn with_source_column(mut self, column: impl Into<String>) -> Self {
        self.source_column = Some(column.into());
        self
    }

    pub fn with_to_column(mut self, column: impl Into<String>) -> Self {
        self.to_column = Some(column.into());
        self
    }

    pub fn with_through(mut self, through: impl Into<String>) -> Self {
        self.through = Some(through.into());
        self
    }

    pub fn with_on_delete(mut self, on_delete: OnDelete) -> Self {
        self.on_delete = Some(on_delete);
        self
    }

    pub fn is_foreign_key(&self) -> bool {
        self.kind == FieldKind::ForeignKey
    }

    pub fn is_many_to_many(&self) -> bool {
        self.kind == FieldKind::ManyToMany
    }

    /// The column this field maps to. Foreign keys default to
    /// `<field_name>_id`, everything else to the field name itself, unless
    /// overridden with `source_column`. Meaningless for many-to-many fields,
    /// which are represented by their through-table instead.
    pub fn column_name<'a>(&'a self, field_name: &'a str) -> Cow<'a, str> {
        if let Some(column) = &self.source_column {
            return Cow::Borrowed(column.as_str());
        }

        if self.is_foreign_key() {
            Cow::Owned(format!("{}_id", field_name))
        } else {
            Cow::Borrowed(field_name)
        }
    }

    /// The referenced column for foreign keys.
    pub fn referenced_column(&self) -> &str {
        self.to_column.as_deref().unwrap_or("id")
    }
}
