//! Core table declarations
//!
//! Every object store has the same four tables; per-type relations are
//! generated by the view builder.

use crate::schema::{ColumnDef, DataModel, Dialect, FkAction, TableModel};

pub const OBJECTS_TABLE: &str = "objects";
pub const ATTRIBUTES_TABLE: &str = "attributes";
pub const CACHES_TABLE: &str = "object_caches";
pub const LINKS_TABLE: &str = "object_links";

/// Keeps at most one current row per (object, key)
pub const CURRENT_ATTRIBUTE_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS unq_attribute_current \
     ON attributes (object_id, attribute_key) WHERE attribute_archived = 0 AND attribute_preview = 0";

fn object_ref() -> ColumnDef {
    ColumnDef::int(None)
        .unsigned()
        .foreign_key(OBJECTS_TABLE, "object_id", FkAction::Cascade, FkAction::SetNull)
}

fn owned_by_object() -> ColumnDef {
    ColumnDef::int_fk(None).foreign_key(OBJECTS_TABLE, "object_id", FkAction::Cascade, FkAction::Cascade)
}

pub fn objects_table() -> TableModel {
    TableModel::new(OBJECTS_TABLE, "object_")
        .column("id", ColumnDef::int_pk(None))
        .column("parent_id", object_ref().index(None))
        .column("creator_id", object_ref())
        .column("type", ColumnDef::varchar(Some(64)).not_null().index(None))
        .column("added", ColumnDef::timestamp().insert_only())
        .column("deleted", ColumnDef::tinyint(Some(1)).not_null().default_value("0"))
}

pub fn attributes_table() -> TableModel {
    TableModel::new(ATTRIBUTES_TABLE, "attribute_")
        .column("object_id", owned_by_object().index(None))
        .column("creator_id", object_ref())
        .column("key", ColumnDef::varchar(Some(64)).not_null().index(None))
        .column("value", ColumnDef::longtext())
        .column("added", ColumnDef::timestamp().insert_only())
        .column("archived", ColumnDef::tinyint(Some(1)).not_null().default_value("0").index(None))
        .column("preview", ColumnDef::tinyint(Some(1)).not_null().default_value("0"))
}

pub fn caches_table() -> TableModel {
    TableModel::new(CACHES_TABLE, "")
        .column("object_id", owned_by_object().unique(None))
        .column("cache", ColumnDef::blob())
}

pub fn links_table() -> TableModel {
    TableModel::new(LINKS_TABLE, "")
        .column("origin_id", owned_by_object().unique(Some("object_link")))
        .column("target_id", owned_by_object().unique(Some("object_link")).index(None))
        .column("added", ColumnDef::timestamp().insert_only())
}

/// The core tables in creation order
pub fn core_model(dialect: Dialect) -> DataModel {
    let mut model = DataModel::new(dialect);
    model
        .add_table(objects_table())
        .add_table(attributes_table())
        .add_table(caches_table())
        .add_table(links_table());
    if dialect == Dialect::Sqlite {
        model.add_table_queries(ATTRIBUTES_TABLE, [CURRENT_ATTRIBUTE_INDEX]);
    }
    model
}
