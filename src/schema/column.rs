//! Column definitions
//!
//! A `ColumnDef` describes one column of a declared table: its datatype,
//! nullability, default, and which keys it participates in. Definitions are
//! built with chained modifiers and rendered by `TableModel`.

use super::Dialect;

/// Column datatypes understood by the schema model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    BigInt,
    TinyInt,
    Char,
    Varchar,
    Text,
    LongText,
    Blob,
    Date,
    DateTime,
    Timestamp,
    Double,
    Enum,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Int => "INT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::TinyInt => "TINYINT",
            ColumnType::Char => "CHAR",
            ColumnType::Varchar => "VARCHAR",
            ColumnType::Text => "TEXT",
            ColumnType::LongText => "LONGTEXT",
            ColumnType::Blob => "BLOB",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Double => "DOUBLE",
            ColumnType::Enum => "ENUM",
        }
    }
}

/// `DEFAULT` clause of a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// Quoted literal
    Literal(String),
    /// `CURRENT_TIMESTAMP`, set on insert only
    CurrentTimestamp,
    /// Zero, refreshed to the current time whenever the row changes
    ZeroOnUpdate,
}

/// Referential action for `ON UPDATE` / `ON DELETE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkAction {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
}

impl FkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FkAction::Cascade => "CASCADE",
            FkAction::Restrict => "RESTRICT",
            FkAction::SetNull => "SET NULL",
            FkAction::NoAction => "NO ACTION",
        }
    }
}

impl std::fmt::Display for FkAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Foreign key reference held by a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_update: FkAction,
    pub on_delete: FkAction,
    /// Constraint name shared by the columns of a composite key
    pub name: Option<String>,
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub column_type: ColumnType,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub enum_values: Vec<String>,
    pub unsigned: bool,
    pub zero_fill: bool,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub auto_increment: bool,
    pub primary: bool,
    pub index: bool,
    pub index_name: Option<String>,
    pub unique: bool,
    pub unique_name: Option<String>,
    pub foreign_key: Option<ForeignKey>,
    /// Fulltext groups; `None` is the table's default group
    pub fulltext: Vec<Option<String>>,
    /// Whether the table's column prefix applies
    pub prefixed: bool,
}

impl ColumnDef {
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            length: None,
            precision: None,
            enum_values: Vec::new(),
            unsigned: false,
            zero_fill: false,
            nullable: true,
            default: None,
            auto_increment: false,
            primary: false,
            index: false,
            index_name: None,
            unique: false,
            unique_name: None,
            foreign_key: None,
            fulltext: Vec::new(),
            prefixed: true,
        }
    }

    // ========== Constructors ==========

    pub fn int(length: Option<u32>) -> Self {
        Self::new(ColumnType::Int).with_length(length)
    }

    /// `INT UNSIGNED NOT NULL`, unprefixed; the usual foreign key column
    pub fn int_fk(length: Option<u32>) -> Self {
        Self::int(length).no_prefix().not_null().unsigned()
    }

    /// `INT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY`
    pub fn int_pk(length: Option<u32>) -> Self {
        Self::int(length).auto_increment().not_null().primary().unsigned()
    }

    pub fn bigint(length: Option<u32>) -> Self {
        Self::new(ColumnType::BigInt).with_length(length)
    }

    pub fn bigint_fk(length: Option<u32>) -> Self {
        Self::bigint(length).unsigned().not_null().no_prefix()
    }

    pub fn bigint_pk(length: Option<u32>) -> Self {
        let mut column = Self::int_pk(length);
        column.column_type = ColumnType::BigInt;
        column
    }

    pub fn tinyint(length: Option<u32>) -> Self {
        Self::new(ColumnType::TinyInt).with_length(length)
    }

    pub fn tinyint_pk(length: Option<u32>) -> Self {
        let mut column = Self::int_pk(length);
        column.column_type = ColumnType::TinyInt;
        column
    }

    pub fn char(length: Option<u32>) -> Self {
        Self::new(ColumnType::Char).with_length(length)
    }

    pub fn varchar(length: Option<u32>) -> Self {
        Self::new(ColumnType::Varchar).with_length(length)
    }

    pub fn text() -> Self {
        Self::new(ColumnType::Text)
    }

    pub fn longtext() -> Self {
        Self::new(ColumnType::LongText)
    }

    pub fn blob() -> Self {
        Self::new(ColumnType::Blob)
    }

    pub fn date() -> Self {
        Self::new(ColumnType::Date)
    }

    pub fn datetime() -> Self {
        Self::new(ColumnType::DateTime)
    }

    /// `TIMESTAMP`; see `insert_only` and `update_only`
    pub fn timestamp() -> Self {
        Self::new(ColumnType::Timestamp)
    }

    pub fn double(length: u32, precision: u32) -> Self {
        let mut column = Self::new(ColumnType::Double);
        column.length = Some(length);
        column.precision = Some(precision);
        column
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut column = Self::new(ColumnType::Enum);
        column.enum_values = values.into_iter().map(Into::into).collect();
        column
    }

    // ========== Modifiers ==========

    fn with_length(mut self, length: Option<u32>) -> Self {
        self.length = length;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Quoted `DEFAULT` literal
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Reference `table.column` with the given referential actions
    pub fn foreign_key(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        on_update: FkAction,
        on_delete: FkAction,
    ) -> Self {
        self.foreign_key = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
            on_update,
            on_delete,
            name: None,
        });
        self
    }

    /// Name the foreign key so several columns share one composite constraint
    pub fn foreign_key_name(mut self, name: impl Into<String>) -> Self {
        if let Some(fk) = self.foreign_key.as_mut() {
            fk.name = Some(name.into());
        }
        self
    }

    /// Add the column to a `FULLTEXT` group (`None` for the table default)
    pub fn fulltext(mut self, group: Option<&str>) -> Self {
        let group = group.map(str::to_string);
        if !self.fulltext.contains(&group) {
            self.fulltext.push(group);
        }
        self
    }

    /// Index the column; columns sharing a name form a composite index
    pub fn index(mut self, name: Option<&str>) -> Self {
        self.index = true;
        self.index_name = name.map(str::to_string);
        self
    }

    /// `DEFAULT CURRENT_TIMESTAMP` for timestamp columns
    pub fn insert_only(mut self) -> Self {
        if self.column_type == ColumnType::Timestamp {
            self.default = Some(DefaultValue::CurrentTimestamp);
        }
        self
    }

    /// `DEFAULT 0 ON UPDATE CURRENT_TIMESTAMP` for timestamp columns
    pub fn update_only(mut self) -> Self {
        if self.column_type == ColumnType::Timestamp {
            self.default = Some(DefaultValue::ZeroOnUpdate);
        }
        self
    }

    pub fn no_prefix(mut self) -> Self {
        self.prefixed = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Unique index; columns sharing a name form a composite unique key
    pub fn unique(mut self, name: Option<&str>) -> Self {
        self.unique = true;
        self.unique_name = name.map(str::to_string);
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn zero_fill(mut self) -> Self {
        self.zero_fill = true;
        self
    }

    // ========== Rendering ==========

    /// Column name with the table prefix applied when enabled
    pub fn column_name(&self, name: &str, prefix: &str) -> String {
        if self.prefixed {
            format!("{}{}", prefix, name)
        } else {
            name.to_string()
        }
    }

    /// SQLite only turns `INTEGER PRIMARY KEY` into an auto-increment rowid
    pub(crate) fn is_rowid_alias(&self, dialect: Dialect) -> bool {
        dialect == Dialect::Sqlite && self.auto_increment && self.primary
    }

    /// Full column definition, e.g. `my_id INT UNSIGNED NOT NULL AUTO_INCREMENT`
    pub fn definition(&self, name: &str, prefix: &str, dialect: Dialect) -> String {
        let column = self.column_name(name, prefix);
        if self.is_rowid_alias(dialect) {
            return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", column);
        }

        let mut definition = format!("{} {}", column, self.type_clause(dialect));
        if dialect == Dialect::MySql {
            if self.unsigned {
                definition.push_str(" UNSIGNED");
            }
            if self.zero_fill {
                definition.push_str(" ZEROFILL");
            }
        }
        if !self.nullable {
            definition.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            definition.push_str(" DEFAULT ");
            definition.push_str(&match (default, dialect) {
                (DefaultValue::Literal(value), _) => dialect.quote(value),
                (DefaultValue::CurrentTimestamp, _) => "CURRENT_TIMESTAMP".to_string(),
                (DefaultValue::ZeroOnUpdate, Dialect::MySql) => "0 ON UPDATE CURRENT_TIMESTAMP".to_string(),
                // No ON UPDATE column clause in SQLite
                (DefaultValue::ZeroOnUpdate, Dialect::Sqlite) => "0".to_string(),
            });
        }
        if self.auto_increment && dialect == Dialect::MySql {
            definition.push_str(" AUTO_INCREMENT");
        }
        definition
    }

    /// Definition for SQLite's `ALTER TABLE ... ADD COLUMN`, which takes no
    /// primary keys, no non-constant defaults and no NOT NULL without a
    /// default. The flag is set when existing rows need a timestamp backfill.
    pub(crate) fn sqlite_added_definition(&self, name: &str, prefix: &str) -> (String, bool) {
        let mut column = self.clone();
        column.primary = false;
        column.auto_increment = false;
        let stamped = column.default == Some(DefaultValue::CurrentTimestamp);
        if stamped {
            column.default = None;
            column.nullable = true;
        } else if !column.nullable && column.default.is_none() {
            column.default = Some(DefaultValue::Literal(column.zero_value().to_string()));
        }
        (column.definition(name, prefix, Dialect::Sqlite), stamped)
    }

    fn zero_value(&self) -> &'static str {
        match self.column_type {
            ColumnType::Int | ColumnType::BigInt | ColumnType::TinyInt | ColumnType::Double => "0",
            _ => "",
        }
    }

    fn type_clause(&self, dialect: Dialect) -> String {
        if self.column_type == ColumnType::Enum {
            return match dialect {
                Dialect::MySql => {
                    let values: Vec<String> = self.enum_values.iter().map(|v| dialect.quote(v)).collect();
                    format!("ENUM({})", values.join(","))
                }
                Dialect::Sqlite => "TEXT".to_string(),
            };
        }
        match (self.length.filter(|l| *l > 0), self.precision.filter(|p| *p > 0)) {
            (Some(length), Some(precision)) => format!("{}({}, {})", self.column_type.as_str(), length, precision),
            (Some(length), None) => format!("{}({})", self.column_type.as_str(), length),
            _ => self.column_type.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_definition() {
        let pk = ColumnDef::int_pk(None);
        assert_eq!(
            pk.definition("id", "my_", Dialect::MySql),
            "my_id INT UNSIGNED NOT NULL AUTO_INCREMENT"
        );
        assert_eq!(
            pk.definition("id", "my_", Dialect::Sqlite),
            "my_id INTEGER PRIMARY KEY AUTOINCREMENT"
        );
    }

    #[test]
    fn test_prefix_skipped_for_fk() {
        let fk = ColumnDef::int_fk(None);
        assert_eq!(fk.definition("object_id", "attribute_", Dialect::MySql), "object_id INT UNSIGNED NOT NULL");
    }

    #[test]
    fn test_defaults_and_lengths() {
        let flag = ColumnDef::tinyint(Some(1)).not_null().default_value("0");
        assert_eq!(flag.definition("archived", "", Dialect::Sqlite), "archived TINYINT(1) NOT NULL DEFAULT '0'");

        let money = ColumnDef::double(6, 2);
        assert_eq!(money.definition("price", "", Dialect::MySql), "price DOUBLE(6, 2)");

        let stamp = ColumnDef::timestamp().update_only();
        assert_eq!(
            stamp.definition("changed", "", Dialect::MySql),
            "changed TIMESTAMP DEFAULT 0 ON UPDATE CURRENT_TIMESTAMP"
        );
        assert_eq!(stamp.definition("changed", "", Dialect::Sqlite), "changed TIMESTAMP DEFAULT 0");
    }

    #[test]
    fn test_insert_only_ignored_for_non_timestamps() {
        let column = ColumnDef::varchar(Some(10)).insert_only();
        assert!(column.default.is_none());
    }

    #[test]
    fn test_enum_definition() {
        let column = ColumnDef::enumeration(["NONE", "ALL"]).not_null();
        assert_eq!(column.definition("mode", "", Dialect::MySql), "mode ENUM('NONE','ALL') NOT NULL");
        assert_eq!(column.definition("mode", "", Dialect::Sqlite), "mode TEXT NOT NULL");
    }
}
