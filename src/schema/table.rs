//! Table definitions and CREATE/ALTER generation

use super::column::{ColumnDef, FkAction};
use super::Dialect;

/// What `TableModel::plan` decided for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaAction {
    /// Table is missing; statements create it
    Create(Vec<String>),
    /// Table exists but lacks declared columns
    Alter(Vec<String>),
    /// Live table already has every declared column
    Unchanged,
}

impl SchemaAction {
    pub fn statements(&self) -> &[String] {
        match self {
            SchemaAction::Create(statements) | SchemaAction::Alter(statements) => statements,
            SchemaAction::Unchanged => &[],
        }
    }
}

/// Columns grouped under one key name, in declaration order
#[derive(Debug, Default)]
struct KeyGroups {
    groups: Vec<(String, Vec<String>)>,
}

impl KeyGroups {
    fn push(&mut self, name: String, column: String) {
        match self.groups.iter_mut().find(|(n, _)| *n == name) {
            Some((_, columns)) => columns.push(column),
            None => self.groups.push((name, vec![column])),
        }
    }
}

#[derive(Debug)]
struct ForeignGroup {
    name: String,
    columns: Vec<String>,
    table: String,
    references: Vec<String>,
    on_update: FkAction,
    on_delete: FkAction,
}

/// Every key of a table, collected from its columns
#[derive(Debug, Default)]
struct TableKeys {
    primary: Vec<String>,
    indexes: KeyGroups,
    unique: KeyGroups,
    foreign: Vec<ForeignGroup>,
    fulltext: KeyGroups,
}

/// A declared table: name, column prefix, engine and ordered columns.
#[derive(Debug, Clone)]
pub struct TableModel {
    pub name: String,
    pub prefix: String,
    pub engine: String,
    columns: Vec<(String, ColumnDef)>,
}

impl TableModel {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
            engine: "InnoDB".to_string(),
            columns: Vec::new(),
        }
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    /// Declare a column; redeclaring a name replaces it in place
    pub fn column(mut self, name: impl Into<String>, def: ColumnDef) -> Self {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = def,
            None => self.columns.push((name, def)),
        }
        self
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnDef)> {
        self.columns.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Column names as they appear in the database
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(name, def)| def.column_name(name, &self.prefix))
            .collect()
    }

    fn collect_keys(&self, dialect: Dialect) -> TableKeys {
        let mut keys = TableKeys::default();

        for (name, def) in &self.columns {
            let column = def.column_name(name, &self.prefix);

            if def.primary && !def.is_rowid_alias(dialect) {
                keys.primary.push(column.clone());
            }
            if def.index {
                let key = def.index_name.clone().unwrap_or_else(|| format!("idx_{}", column));
                keys.indexes.push(key, column.clone());
            }
            if def.unique {
                let key = def.unique_name.clone().unwrap_or_else(|| format!("unq_{}", column));
                keys.unique.push(key, column.clone());
            }
            if let Some(fk) = &def.foreign_key {
                let key = fk.name.clone().unwrap_or_else(|| format!("fk_{}_{}", self.name, column));
                match keys.foreign.iter_mut().find(|g| g.name == key) {
                    Some(group) => {
                        if group.on_update != fk.on_update || group.on_delete != fk.on_delete {
                            tracing::warn!(
                                "Foreign key {} on {} mixes actions (ON UPDATE {} / {}, ON DELETE {} / {}); using the last",
                                key,
                                self.name,
                                group.on_update,
                                fk.on_update,
                                group.on_delete,
                                fk.on_delete
                            );
                        }
                        group.on_update = fk.on_update;
                        group.on_delete = fk.on_delete;
                        group.columns.push(column.clone());
                        group.references.push(fk.column.clone());
                    }
                    None => keys.foreign.push(ForeignGroup {
                        name: key,
                        columns: vec![column.clone()],
                        table: fk.table.clone(),
                        references: vec![fk.column.clone()],
                        on_update: fk.on_update,
                        on_delete: fk.on_delete,
                    }),
                }
            }
            for group in &def.fulltext {
                let key = group.clone().unwrap_or_else(|| format!("ft_{}", self.name));
                keys.fulltext.push(key, column.clone());
            }
        }

        keys
    }

    /// SQLite index names are global, so they are qualified by table
    fn sqlite_index_name(&self, key: &str) -> String {
        format!("{}_{}", self.name, key)
    }

    fn sqlite_index_statements(
        &self,
        keys: &TableKeys,
        only: impl Fn(&[String]) -> bool,
    ) -> Vec<String> {
        keys.indexes
            .groups
            .iter()
            .chain(keys.fulltext.groups.iter())
            .filter(|(_, columns)| only(columns))
            .map(|(key, columns)| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    self.sqlite_index_name(key),
                    self.name,
                    columns.join(", ")
                )
            })
            .collect()
    }

    /// Statements that create the table with every key
    pub fn create_statements(&self, dialect: Dialect) -> Vec<String> {
        let keys = self.collect_keys(dialect);

        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|(name, def)| def.definition(name, &self.prefix, dialect))
            .collect();

        if !keys.primary.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", keys.primary.join(", ")));
        }
        if dialect == Dialect::MySql {
            for (key, columns) in &keys.indexes.groups {
                lines.push(format!("INDEX {} ({})", key, columns.join(", ")));
            }
        }
        for (key, columns) in &keys.unique.groups {
            lines.push(match dialect {
                Dialect::MySql => format!("UNIQUE KEY {} ({})", key, columns.join(", ")),
                Dialect::Sqlite => format!("CONSTRAINT {} UNIQUE ({})", key, columns.join(", ")),
            });
        }
        for fk in &keys.foreign {
            lines.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
                fk.name,
                fk.columns.join(", "),
                fk.table,
                fk.references.join(", "),
                fk.on_update,
                fk.on_delete
            ));
        }
        if dialect == Dialect::MySql {
            for (key, columns) in &keys.fulltext.groups {
                lines.push(format!("FULLTEXT {} ({})", key, columns.join(", ")));
            }
        }

        let body = format!("CREATE TABLE IF NOT EXISTS {} (\n  {}\n)", self.name, lines.join(",\n  "));
        match dialect {
            Dialect::MySql => vec![format!("{} ENGINE={} DEFAULT CHARSET=utf8", body, self.engine)],
            Dialect::Sqlite => {
                let mut statements = vec![body];
                statements.extend(self.sqlite_index_statements(&keys, |_| true));
                statements
            }
        }
    }

    /// Statements adding declared columns missing from `live`.
    ///
    /// Columns are only ever added; nothing is dropped or narrowed. Returns
    /// `None` when nothing is missing.
    pub fn alter_statements(&self, live: &[String], dialect: Dialect) -> Option<Vec<String>> {
        let mut missing = Vec::new();
        let mut clauses = Vec::new();
        let mut previous: Option<String> = None;

        for (name, def) in &self.columns {
            let column = def.column_name(name, &self.prefix);
            if !live.iter().any(|l| l.eq_ignore_ascii_case(&column)) {
                let definition = def.definition(name, &self.prefix, dialect);
                clauses.push(match &previous {
                    Some(prev) => format!("ADD COLUMN {} AFTER {}", definition, prev),
                    None => format!("ADD COLUMN {} FIRST", definition),
                });
                missing.push((name.as_str(), def, column.clone()));
            }
            previous = Some(column);
        }

        if missing.is_empty() {
            return None;
        }

        match dialect {
            Dialect::MySql => Some(vec![format!("ALTER TABLE {} {}", self.name, clauses.join(", "))]),
            Dialect::Sqlite => {
                let mut statements = Vec::new();
                for (name, def, column) in &missing {
                    if def.primary {
                        tracing::warn!(
                            "Cannot add primary key column {} to existing table {}; adding it as a plain column",
                            column,
                            self.name
                        );
                    }
                    let (definition, stamped) = def.sqlite_added_definition(name, &self.prefix);
                    statements.push(format!("ALTER TABLE {} ADD COLUMN {}", self.name, definition));
                    if stamped {
                        statements.extend(self.sqlite_timestamp_backfill(column));
                    }
                }

                let added: Vec<&String> = missing.iter().map(|(_, _, column)| column).collect();
                let touches_added = |columns: &[String]| columns.iter().any(|c| added.contains(&c));
                let keys = self.collect_keys(dialect);
                statements.extend(self.sqlite_index_statements(&keys, touches_added));
                for (key, columns) in &keys.unique.groups {
                    if touches_added(columns) {
                        statements.push(format!(
                            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
                            self.sqlite_index_name(key),
                            self.name,
                            columns.join(", ")
                        ));
                    }
                }
                Some(statements)
            }
        }
    }

    /// SQLite cannot add a column defaulting to `CURRENT_TIMESTAMP`: stamp
    /// the existing rows, then stamp new rows from a trigger
    fn sqlite_timestamp_backfill(&self, column: &str) -> Vec<String> {
        vec![
            format!("UPDATE {} SET {} = CURRENT_TIMESTAMP", self.name, column),
            format!(
                "CREATE TRIGGER IF NOT EXISTS {trigger} AFTER INSERT ON {table} FOR EACH ROW \
                 WHEN NEW.{column} IS NULL BEGIN \
                 UPDATE {table} SET {column} = CURRENT_TIMESTAMP WHERE rowid = NEW.rowid; END",
                trigger = self.sqlite_index_name(&format!("stamp_{}", column)),
                table = self.name,
                column = column,
            ),
        ]
    }

    /// Decide between CREATE, ALTER or nothing given the live columns
    /// (`None` when the table does not exist)
    pub fn plan(&self, live: Option<&[String]>, dialect: Dialect) -> SchemaAction {
        match live {
            None => SchemaAction::Create(self.create_statements(dialect)),
            Some(live) => match self.alter_statements(live, dialect) {
                Some(statements) => SchemaAction::Alter(statements),
                None => SchemaAction::Unchanged,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TableModel {
        TableModel::new("samples", "sample_")
            .column("id", ColumnDef::int_pk(None))
            .column("name", ColumnDef::varchar(Some(64)).not_null().index(None))
            .column(
                "owner_id",
                ColumnDef::int_fk(None).foreign_key("objects", "object_id", FkAction::Cascade, FkAction::Cascade),
            )
    }

    #[test]
    fn test_create_mysql() {
        let statements = sample().create_statements(Dialect::MySql);
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0],
            "CREATE TABLE IF NOT EXISTS samples (\n  \
             sample_id INT UNSIGNED NOT NULL AUTO_INCREMENT,\n  \
             sample_name VARCHAR(64) NOT NULL,\n  \
             owner_id INT UNSIGNED NOT NULL,\n  \
             PRIMARY KEY (sample_id),\n  \
             INDEX idx_sample_name (sample_name),\n  \
             CONSTRAINT fk_samples_owner_id FOREIGN KEY (owner_id) REFERENCES objects (object_id) ON UPDATE CASCADE ON DELETE CASCADE\n\
             ) ENGINE=InnoDB DEFAULT CHARSET=utf8"
        );
    }

    #[test]
    fn test_create_sqlite_moves_indexes_out() {
        let statements = sample().create_statements(Dialect::Sqlite);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("sample_id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(!statements[0].contains("PRIMARY KEY (sample_id)"));
        assert!(!statements[0].contains("ENGINE"));
        assert_eq!(
            statements[1],
            "CREATE INDEX IF NOT EXISTS samples_idx_sample_name ON samples (sample_name)"
        );
    }

    #[test]
    fn test_composite_keys_share_a_name() {
        let table = TableModel::new("links", "")
            .column("origin_id", ColumnDef::int_fk(None).unique(Some("link")))
            .column("target_id", ColumnDef::int_fk(None).unique(Some("link")))
            .column("body", ColumnDef::text().fulltext(None))
            .column("title", ColumnDef::text().fulltext(None));
        let sql = &table.create_statements(Dialect::MySql)[0];
        assert!(sql.contains("UNIQUE KEY link (origin_id, target_id)"));
        assert!(sql.contains("FULLTEXT ft_links (body, title)"));
    }

    #[test]
    fn test_fk_action_mismatch_uses_last() {
        let table = TableModel::new("pairs", "")
            .column(
                "a_id",
                ColumnDef::int_fk(None)
                    .foreign_key("objects", "object_id", FkAction::Cascade, FkAction::Cascade)
                    .foreign_key_name("pair"),
            )
            .column(
                "b_id",
                ColumnDef::int_fk(None)
                    .foreign_key("objects", "object_id", FkAction::Restrict, FkAction::SetNull)
                    .foreign_key_name("pair"),
            );
        let sql = &table.create_statements(Dialect::MySql)[0];
        assert!(sql.contains(
            "CONSTRAINT pair FOREIGN KEY (a_id, b_id) REFERENCES objects (object_id, object_id) ON UPDATE RESTRICT ON DELETE SET NULL"
        ));
    }

    #[test]
    fn test_alter_mysql_positions() {
        let live = vec!["sample_id".to_string()];
        let statements = sample().alter_statements(&live, Dialect::MySql).unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE samples ADD COLUMN sample_name VARCHAR(64) NOT NULL AFTER sample_id, \
                 ADD COLUMN owner_id INT UNSIGNED NOT NULL AFTER sample_name"
                    .to_string()
            ]
        );

        let statements = sample().alter_statements(&[], Dialect::MySql).unwrap();
        assert!(statements[0].contains("ADD COLUMN sample_id INT UNSIGNED NOT NULL AUTO_INCREMENT FIRST"));
    }

    #[test]
    fn test_alter_sqlite_one_statement_per_column() {
        let live = vec!["sample_id".to_string(), "owner_id".to_string()];
        let statements = sample().alter_statements(&live, Dialect::Sqlite).unwrap();
        assert_eq!(
            statements,
            vec![
                "ALTER TABLE samples ADD COLUMN sample_name VARCHAR(64) NOT NULL DEFAULT ''".to_string(),
                "CREATE INDEX IF NOT EXISTS samples_idx_sample_name ON samples (sample_name)".to_string(),
            ]
        );
    }

    #[test]
    fn test_alter_sqlite_keeps_existing_rows_addable() {
        let table = TableModel::new("events", "event_")
            .column("id", ColumnDef::int_pk(None))
            .column("kind", ColumnDef::varchar(Some(16)).not_null().unique(None))
            .column("count", ColumnDef::int(None).not_null())
            .column("added", ColumnDef::timestamp().insert_only());
        let live = vec!["event_id".to_string()];
        let statements = table.alter_statements(&live, Dialect::Sqlite).unwrap();

        assert_eq!(statements[0], "ALTER TABLE events ADD COLUMN event_kind VARCHAR(16) NOT NULL DEFAULT ''");
        assert_eq!(statements[1], "ALTER TABLE events ADD COLUMN event_count INT NOT NULL DEFAULT '0'");
        assert_eq!(statements[2], "ALTER TABLE events ADD COLUMN event_added TIMESTAMP");
        assert_eq!(statements[3], "UPDATE events SET event_added = CURRENT_TIMESTAMP");
        assert!(statements[4].starts_with("CREATE TRIGGER IF NOT EXISTS events_stamp_event_added AFTER INSERT ON events"));
        assert_eq!(
            statements[5],
            "CREATE UNIQUE INDEX IF NOT EXISTS events_unq_event_kind ON events (event_kind)"
        );
    }

    #[test]
    fn test_plan() {
        let table = sample();
        assert!(matches!(table.plan(None, Dialect::Sqlite), SchemaAction::Create(_)));

        let live = table.column_names();
        assert_eq!(table.plan(Some(&live), Dialect::Sqlite), SchemaAction::Unchanged);

        let partial = vec!["sample_id".to_string()];
        assert!(matches!(table.plan(Some(&partial), Dialect::Sqlite), SchemaAction::Alter(_)));
    }
}
