//! Per-type view and shadow-table SQL
//!
//! Each declared field becomes one `LEFT JOIN` on the attributes table, so a
//! type's view has one row per live object and one column per field. The
//! preview variant joins preview rows too and prefers them when present.

use crate::model::{TypeModel, ADDED_COLUMN, UPDATED_COLUMN};
use crate::schema::Dialect;
use crate::storage::schema::{ATTRIBUTES_TABLE, OBJECTS_TABLE};

const OBJECT_ALIAS: &str = "o";

pub fn view_name(type_name: &str, preview: bool) -> String {
    if preview {
        format!("vp_{}", type_name)
    } else {
        format!("v_{}", type_name)
    }
}

pub fn shadow_name(type_name: &str, preview: bool) -> String {
    if preview {
        format!("qp_{}", type_name)
    } else {
        format!("q_{}", type_name)
    }
}

/// Relation a query reads from
pub fn from_target(type_name: &str, preview: bool, shadow_tables: bool) -> String {
    if shadow_tables {
        shadow_name(type_name, preview)
    } else {
        view_name(type_name, preview)
    }
}

pub struct ViewBuilder<'a> {
    model: &'a TypeModel,
    dialect: Dialect,
}

impl<'a> ViewBuilder<'a> {
    pub fn new(model: &'a TypeModel, dialect: Dialect) -> Self {
        Self { model, dialect }
    }

    fn join(&self, alias: &str, field: &str, preview: bool) -> String {
        format!(
            "LEFT JOIN {attrs} AS {alias} ON ({alias}.object_id = {o}.object_id AND {alias}.attribute_key = {key} \
             AND {alias}.attribute_archived = 0 AND {alias}.attribute_preview = {preview})",
            attrs = ATTRIBUTES_TABLE,
            alias = alias,
            o = OBJECT_ALIAS,
            key = self.dialect.quote(field),
            preview = if preview { 1 } else { 0 },
        )
    }

    /// The SELECT behind `v_<type>` (or `vp_<type>`)
    pub fn select_sql(&self, preview: bool) -> String {
        let o = OBJECT_ALIAS;
        let mut columns = vec![
            format!("{o}.object_id AS id"),
            format!("{o}.object_parent_id AS parent_id"),
            format!("{o}.object_creator_id AS creator_id"),
        ];
        let mut joins = Vec::new();
        let mut updated = Vec::new();

        for field in self.model.storage_fields() {
            let committed = format!("a_{}", field.name);
            joins.push(self.join(&committed, &field.name, false));

            let value = if preview {
                let pending = format!("ap_{}", field.name);
                joins.push(self.join(&pending, &field.name, true));
                updated.push(format!("IFNULL({pending}.attribute_added, {o}.object_added)"));
                format!("COALESCE({pending}.attribute_value, {committed}.attribute_value)")
            } else {
                format!("{committed}.attribute_value")
            };
            let value = match field.cast {
                Some(cast) => cast.wrap(&value, self.dialect),
                None => value,
            };
            columns.push(format!("{} AS {}", value, field.name));
            updated.push(format!("IFNULL({committed}.attribute_added, {o}.object_added)"));
        }

        columns.push(format!("{o}.object_added AS {}", ADDED_COLUMN));
        columns.push(if updated.is_empty() {
            format!("{o}.object_added AS {}", UPDATED_COLUMN)
        } else {
            format!(
                "{}({o}.object_added, {}) AS {}",
                self.dialect.greatest(),
                updated.join(", "),
                UPDATED_COLUMN
            )
        });

        let mut sql = format!("SELECT {}\nFROM {} AS {o}", columns.join(", "), OBJECTS_TABLE);
        for join in joins {
            sql.push('\n');
            sql.push_str(&join);
        }
        sql.push_str(&format!(
            "\nWHERE {o}.object_deleted = 0 AND {o}.object_type = {}",
            self.dialect.quote(&self.model.name)
        ));
        sql
    }

    /// Statements that (re)create one view
    pub fn view_statements(&self, preview: bool) -> Vec<String> {
        let name = view_name(&self.model.name, preview);
        let select = self.select_sql(preview);
        match self.dialect {
            Dialect::MySql => vec![format!("CREATE OR REPLACE VIEW {} AS {}", name, select)],
            Dialect::Sqlite => vec![
                format!("DROP VIEW IF EXISTS {}", name),
                format!("CREATE VIEW {} AS {}", name, select),
            ],
        }
    }

    /// Statements that (re)materialize one shadow table from its view
    pub fn shadow_statements(&self, preview: bool) -> Vec<String> {
        let table = shadow_name(&self.model.name, preview);
        let view = view_name(&self.model.name, preview);
        let mut statements = vec![
            format!("DROP TABLE IF EXISTS {}", table),
            format!("CREATE TABLE {} AS SELECT * FROM {}", table, view),
        ];

        match self.dialect {
            Dialect::MySql => {
                statements.push(format!("ALTER TABLE {} ADD PRIMARY KEY (id)", table));
                for field in self.model.storage_fields().filter(|f| f.is_indexed()) {
                    // Uncast values stay LONGTEXT, which needs a prefix length
                    let column = match field.cast {
                        Some(cast) if cast.is_indexable() => field.name.clone(),
                        _ => format!("{}(255)", field.name),
                    };
                    statements.push(format!("ALTER TABLE {} ADD INDEX idx_{} ({})", table, field.name, column));
                }
            }
            Dialect::Sqlite => {
                statements.push(format!("CREATE UNIQUE INDEX pk_{} ON {} (id)", table, table));
                for field in self.model.storage_fields().filter(|f| f.is_indexed()) {
                    statements.push(format!(
                        "CREATE INDEX idx_{}_{} ON {} ({})",
                        table, field.name, table, field.name
                    ));
                }
            }
        }
        statements
    }

    /// Everything a rebuild runs: both views, then both shadow tables (or
    /// their removal when shadow tables are off)
    pub fn build_statements(&self, shadow_tables: bool) -> Vec<String> {
        let mut statements = self.view_statements(false);
        statements.extend(self.view_statements(true));
        if shadow_tables {
            statements.extend(self.shadow_statements(false));
            statements.extend(self.shadow_statements(true));
        } else {
            for preview in [false, true] {
                statements.push(format!("DROP TABLE IF EXISTS {}", shadow_name(&self.model.name, preview)));
            }
        }
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CastType, FieldSpec, ModelRegistry};

    fn person() -> TypeModel {
        let mut registry = ModelRegistry::new();
        registry
            .register(
                "Person",
                vec![
                    FieldSpec::new("name"),
                    FieldSpec::new("age").with_cast(CastType::Signed),
                    FieldSpec::new("scratch").ignored(),
                ],
            )
            .unwrap()
            .clone()
    }

    #[test]
    fn test_select_sql() {
        let model = person();
        let sql = ViewBuilder::new(&model, Dialect::Sqlite).select_sql(false);

        assert!(sql.starts_with("SELECT o.object_id AS id, o.object_parent_id AS parent_id, o.object_creator_id AS creator_id, a_name.attribute_value AS name, CAST(a_age.attribute_value AS INTEGER) AS age, o.object_added AS _added, MAX(o.object_added, IFNULL(a_name.attribute_added, o.object_added), IFNULL(a_age.attribute_added, o.object_added)) AS _updated\nFROM objects AS o\n"));
        assert!(sql.contains(
            "LEFT JOIN attributes AS a_age ON (a_age.object_id = o.object_id AND a_age.attribute_key = 'age' AND a_age.attribute_archived = 0 AND a_age.attribute_preview = 0)"
        ));
        assert!(!sql.contains("scratch"));
        assert!(sql.ends_with("WHERE o.object_deleted = 0 AND o.object_type = 'Person'"));
    }

    #[test]
    fn test_preview_select_prefers_pending() {
        let model = person();
        let sql = ViewBuilder::new(&model, Dialect::MySql).select_sql(true);
        assert!(sql.contains("CAST(COALESCE(ap_age.attribute_value, a_age.attribute_value) AS SIGNED) AS age"));
        assert!(sql.contains("ap_age.attribute_preview = 1"));
        assert!(sql.contains("GREATEST(o.object_added"));
    }

    #[test]
    fn test_no_fields() {
        let mut registry = ModelRegistry::new();
        let model = registry.register("Tag", vec![]).unwrap().clone();
        let sql = ViewBuilder::new(&model, Dialect::Sqlite).select_sql(false);
        assert!(sql.contains("o.object_added AS _updated"));
        assert!(!sql.contains("MAX("));
    }

    #[test]
    fn test_build_statements() {
        let model = person();
        let builder = ViewBuilder::new(&model, Dialect::Sqlite);

        let statements = builder.build_statements(true);
        assert_eq!(statements[0], "DROP VIEW IF EXISTS v_Person");
        assert!(statements[1].starts_with("CREATE VIEW v_Person AS SELECT"));
        assert!(statements.contains(&"CREATE TABLE q_Person AS SELECT * FROM v_Person".to_string()));
        assert!(statements.contains(&"CREATE UNIQUE INDEX pk_qp_Person ON qp_Person (id)".to_string()));
        assert!(statements.contains(&"CREATE INDEX idx_q_Person_age ON q_Person (age)".to_string()));

        let statements = builder.build_statements(false);
        assert_eq!(statements.last().unwrap(), "DROP TABLE IF EXISTS qp_Person");

        let mysql = ViewBuilder::new(&model, Dialect::MySql).view_statements(false);
        assert!(mysql[0].starts_with("CREATE OR REPLACE VIEW v_Person AS SELECT"));
    }

    #[test]
    fn test_targets() {
        assert_eq!(from_target("Person", false, false), "v_Person");
        assert_eq!(from_target("Person", true, false), "vp_Person");
        assert_eq!(from_target("Person", false, true), "q_Person");
        assert_eq!(from_target("Person", true, true), "qp_Person");
    }
}
