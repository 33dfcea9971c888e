//! Model metadata
//!
//! The `ModelRegistry` is the explicit catalogue of declared object types.
//! Each type lists its fields with storage options and carries a
//! last-modified timestamp that drives view staleness.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::schema::Dialect;
use crate::{now_millis, validate_identifier, Error, Result};

/// Columns every type view exposes besides its declared fields
pub const ID_COLUMNS: &[&str] = &["id", "parent_id", "creator_id"];
pub const ADDED_COLUMN: &str = "_added";
pub const UPDATED_COLUMN: &str = "_updated";

/// SQL cast applied to a field's stored text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastType {
    Signed,
    Unsigned,
    Decimal,
    Char,
    Binary,
    Date,
    DateTime,
    Time,
}

impl CastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CastType::Signed => "signed",
            CastType::Unsigned => "unsigned",
            CastType::Decimal => "decimal",
            CastType::Char => "char",
            CastType::Binary => "binary",
            CastType::Date => "date",
            CastType::DateTime => "datetime",
            CastType::Time => "time",
        }
    }

    pub fn all() -> &'static [CastType] {
        &[
            CastType::Signed,
            CastType::Unsigned,
            CastType::Decimal,
            CastType::Char,
            CastType::Binary,
            CastType::Date,
            CastType::DateTime,
            CastType::Time,
        ]
    }

    /// Target type inside `CAST(x AS <type>)`
    pub fn sql_type(&self, dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::MySql => match self {
                CastType::Signed => "SIGNED",
                CastType::Unsigned => "UNSIGNED",
                CastType::Decimal => "DECIMAL",
                CastType::Char => "CHAR",
                CastType::Binary => "BINARY",
                CastType::Date => "DATE",
                CastType::DateTime => "DATETIME",
                CastType::Time => "TIME",
            },
            Dialect::Sqlite => match self {
                CastType::Signed | CastType::Unsigned => "INTEGER",
                CastType::Decimal => "NUMERIC",
                CastType::Char | CastType::Date | CastType::DateTime | CastType::Time => "TEXT",
                CastType::Binary => "BLOB",
            },
        }
    }

    /// Wrap an SQL expression in this cast
    pub fn wrap(&self, expr: &str, dialect: Dialect) -> String {
        format!("CAST({} AS {})", expr, self.sql_type(dialect))
    }

    /// Casts whose values are worth a shadow-table index
    pub fn is_indexable(&self) -> bool {
        !matches!(self, CastType::Char | CastType::Binary)
    }
}

impl FromStr for CastType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "signed" | "int" | "integer" => Ok(CastType::Signed),
            "unsigned" => Ok(CastType::Unsigned),
            "decimal" | "numeric" => Ok(CastType::Decimal),
            "char" | "text" => Ok(CastType::Char),
            "binary" | "blob" => Ok(CastType::Binary),
            "date" => Ok(CastType::Date),
            "datetime" => Ok(CastType::DateTime),
            "time" => Ok(CastType::Time),
            _ => Err(Error::InvalidSchema(format!("Unknown cast type: {}", s))),
        }
    }
}

impl std::fmt::Display for CastType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declared field and its storage options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Never persisted as an attribute
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cast: Option<CastType>,
    /// Force a shadow-table index
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub indexed: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ignore: false,
            cast: None,
            indexed: false,
        }
    }

    pub fn with_cast(mut self, cast: CastType) -> Self {
        self.cast = Some(cast);
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed || self.cast.is_some_and(|c| c.is_indexable())
    }
}

/// A declared object type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeModel {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    /// Milliseconds since the epoch of the last change to `fields`
    pub modified: u64,
}

impl TypeModel {
    /// Fields that are persisted as attributes
    pub fn storage_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.ignore)
    }

    pub fn is_storage_field(&self, name: &str) -> bool {
        self.storage_fields().any(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column names of the type's views, in order
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = ID_COLUMNS.iter().map(|c| c.to_string()).collect();
        columns.extend(self.storage_fields().map(|f| f.name.clone()));
        columns.push(ADDED_COLUMN.to_string());
        columns.push(UPDATED_COLUMN.to_string());
        columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        ID_COLUMNS.contains(&name) || name == ADDED_COLUMN || name == UPDATED_COLUMN || self.is_storage_field(name)
    }
}

/// Registry of declared object types.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    types: BTreeMap<String, TypeModel>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a type or redeclare its fields.
    ///
    /// Redeclaring with a different field list bumps the type's modified
    /// time; an identical redeclaration leaves it untouched.
    pub fn register(&mut self, name: &str, fields: Vec<FieldSpec>) -> Result<&TypeModel> {
        validate_identifier(name)?;
        for (i, field) in fields.iter().enumerate() {
            validate_identifier(&field.name)?;
            if ID_COLUMNS.contains(&field.name.as_str())
                || field.name == ADDED_COLUMN
                || field.name == UPDATED_COLUMN
            {
                return Err(Error::InvalidSchema(format!(
                    "Field name {} is reserved (type {})",
                    field.name, name
                )));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::InvalidSchema(format!(
                    "Field {} declared twice on type {}",
                    field.name, name
                )));
            }
        }

        let changed = self.types.get(name).is_none_or(|existing| existing.fields != fields);
        if changed {
            let previous = self.types.get(name).map(|t| t.modified);
            let model = self.types.entry(name.to_string()).or_insert_with(|| TypeModel {
                name: name.to_string(),
                fields: Vec::new(),
                modified: 0,
            });
            model.fields = fields;
            model.modified = next_modified(previous);
            tracing::debug!("Registered type {} ({} fields)", name, model.fields.len());
        }

        self.get(name)
    }

    pub fn get(&self, name: &str) -> Result<&TypeModel> {
        self.types.get(name).ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeModel> {
        self.types.values()
    }

    pub fn storage_fields(&self, name: &str) -> Result<Vec<&FieldSpec>> {
        Ok(self.get(name)?.storage_fields().collect())
    }

    /// Mark a type's declaration as changed now
    pub fn touch(&mut self, name: &str) -> Result<u64> {
        let model = self
            .types
            .get_mut(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))?;
        model.modified = next_modified(Some(model.modified));
        Ok(model.modified)
    }

    /// Set a type's modified time explicitly (e.g. from a file's mtime)
    pub fn set_modified(&mut self, name: &str, modified: u64) -> Result<()> {
        let model = self
            .types
            .get_mut(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))?;
        model.modified = modified;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Current time, strictly after `previous`
fn next_modified(previous: Option<u64>) -> u64 {
    let now = now_millis();
    match previous {
        Some(prev) => now.max(prev + 1),
        None => now,
    }
}
