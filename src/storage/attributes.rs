//! Attribute store: populate, update and delete
//!
//! Attribute rows are append-only. A write archives the previous current row
//! of each changed key and inserts a new one, so history is kept and at most
//! one row per (object, key) is current.

use std::collections::{HashSet, VecDeque};

use serde_json::{Map, Value};

use super::cache::write_cache_with;
use super::db::Database;
use super::store::ObjectStore;
use crate::model::{CastType, FieldSpec, TypeModel, ADDED_COLUMN, UPDATED_COLUMN};
use crate::object::Entity;
use crate::view::{shadow_name, view_name};
use crate::{Error, Result};

/// The `objects` row of one object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHeader {
    pub id: u64,
    pub type_name: String,
    pub parent_id: Option<u64>,
    pub creator_id: Option<u64>,
    pub added: Option<String>,
    pub deleted: bool,
}

impl ObjectStore {
    // ========== Read Operations ==========

    /// The `objects` row of `id`, deleted or not
    pub fn object_header(&self, id: u64) -> Result<Option<ObjectHeader>> {
        header_with(self.database(), id)
    }

    /// Flat snapshot of object `id`: the cache when usable, otherwise rebuilt
    /// from current attribute rows (and written back to the cache)
    pub fn populate(&self, id: u64) -> Result<Map<String, Value>> {
        if let Some(snapshot) = self.read_cache(id)? {
            return Ok(snapshot);
        }
        tracing::debug!("Cache miss for object {}", id);
        let snapshot = self.fetch_direct(id)?;
        self.write_cache(id, &snapshot)?;
        Ok(snapshot)
    }

    /// Snapshot rebuilt from the attribute table, bypassing the cache
    pub fn fetch_direct(&self, id: u64) -> Result<Map<String, Value>> {
        snapshot_with(self.database(), self, id)
    }

    /// Row of object `id` in the preview view, pending values included
    pub fn populate_preview(&self, type_name: &str, id: u64) -> Result<Map<String, Value>> {
        self.build_if_expired(type_name)?;
        let rows = self.database().query(
            &format!("SELECT * FROM {} WHERE id = ?1", view_name(type_name, true)),
            [id],
        )?;
        rows.assoc(0).ok_or(Error::NotFound(id))
    }

    /// Load object `id` as an entity, restricted to `allowed` types (any type
    /// when empty). Deleted objects are not found.
    pub fn from_id(&self, id: u64, allowed: &[&str]) -> Result<Entity> {
        let header = self
            .object_header(id)?
            .filter(|h| !h.deleted)
            .ok_or(Error::NotFound(id))?;
        if !allowed.is_empty() && !allowed.contains(&header.type_name.as_str()) {
            return Err(Error::WrongType {
                id,
                actual: header.type_name,
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
            });
        }
        let snapshot = self.populate(id)?;
        Ok(Entity::from_record(header.type_name, snapshot))
    }

    // ========== Write Operations ==========

    /// Persist `entity`, allocating an id when it is new; returns the id.
    ///
    /// Only declared, non-ignored fields are written. New objects write every
    /// present field; existing objects write the changed ones. In preview mode
    /// every present field is written as a pending preview row instead.
    pub fn update(&self, entity: &mut Entity) -> Result<u64> {
        let model = self.models().get(&entity.type_name)?;
        if self.options().shadow_tables {
            self.build_if_expired(&model.name)?;
        }

        let was_new = entity.is_new();
        let preview = self.options().preview;
        let result = self
            .database()
            .transaction(|db| self.write_entity(db, model, entity, preview));

        match result {
            Ok((id, snapshot)) => {
                if let Some(snapshot) = snapshot {
                    let saved = Entity::from_record(model.name.clone(), snapshot);
                    entity.added = saved.added;
                    entity.updated = saved.updated;
                }
                entity.reset_changes();
                tracing::debug!("Saved {} {}", model.name, id);
                Ok(id)
            }
            Err(e) => {
                if was_new {
                    entity.id = None;
                }
                Err(Error::write("saving", e))
            }
        }
    }

    fn write_entity(
        &self,
        db: &Database,
        model: &TypeModel,
        entity: &mut Entity,
        preview: bool,
    ) -> Result<(u64, Option<Map<String, Value>>)> {
        let was_new = entity.is_new();
        let id = match entity.id {
            None => {
                let id = db.insert(
                    "INSERT INTO objects (object_type, object_parent_id, object_creator_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![model.name, entity.parent_id, entity.creator_id],
                )?;
                entity.id = Some(id);
                id
            }
            Some(id) => {
                let header = header_with(db, id)?.ok_or(Error::NotFound(id))?;
                if header.type_name != model.name {
                    return Err(Error::WrongType {
                        id,
                        actual: header.type_name,
                        allowed: vec![model.name.clone()],
                    });
                }
                db.execute(
                    "UPDATE objects SET object_parent_id = ?1, object_creator_id = ?2 WHERE object_id = ?3",
                    rusqlite::params![entity.parent_id, entity.creator_id, id],
                )?;
                id
            }
        };

        let fields: Vec<&FieldSpec> = model
            .storage_fields()
            .filter(|f| {
                if was_new || preview {
                    entity.get(&f.name).is_some()
                } else {
                    entity.is_key_changed(&f.name)
                }
            })
            .collect();

        if !preview {
            for field in &fields {
                db.execute(
                    "UPDATE attributes SET attribute_archived = 1 \
                     WHERE object_id = ?1 AND attribute_key = ?2 AND attribute_archived = 0 AND attribute_preview = 0",
                    rusqlite::params![id, field.name],
                )?;
            }
        }
        db.execute("DELETE FROM attributes WHERE object_id = ?1 AND attribute_preview = 1", [id])?;

        for field in &fields {
            // Removed keys are only archived
            let Some(value) = entity.get(&field.name) else {
                continue;
            };
            let placeholder = match field.cast {
                Some(cast) => cast.wrap("?4", db.dialect()),
                None => "?4".to_string(),
            };
            db.execute(
                &format!(
                    "INSERT INTO attributes (object_id, attribute_creator_id, attribute_key, attribute_value, attribute_preview) \
                     VALUES (?1, ?2, ?3, {}, ?5)",
                    placeholder
                ),
                rusqlite::params![id, entity.creator_id, field.name, encode_value(value), preview],
            )?;
        }

        upsert_shadow(db, model, id, true)?;
        if preview {
            return Ok((id, None));
        }

        let snapshot = snapshot_with(db, self, id)?;
        write_cache_with(db, id, &snapshot)?;
        upsert_shadow(db, model, id, false)?;
        Ok((id, Some(snapshot)))
    }

    /// Soft-delete `id` and every descendant reachable through `parent_id`;
    /// returns the ids marked deleted
    pub fn delete(&self, id: u64) -> Result<Vec<u64>> {
        let root = self.object_header(id)?.ok_or(Error::NotFound(id))?;

        let deleted = self
            .database()
            .transaction(|db| {
                let mut queue = VecDeque::from([(root.id, root.type_name.clone())]);
                let mut seen = HashSet::new();
                let mut deleted = Vec::new();

                while let Some((current, type_name)) = queue.pop_front() {
                    if !seen.insert(current) {
                        continue;
                    }
                    db.execute("UPDATE objects SET object_deleted = 1 WHERE object_id = ?1", [current])?;
                    for preview in [false, true] {
                        let table = shadow_name(&type_name, preview);
                        if db.table_exists(&table)? {
                            db.execute(&format!("DELETE FROM {} WHERE id = ?1", table), [current])?;
                        }
                    }
                    deleted.push(current);

                    let children = db.query(
                        "SELECT object_id, object_type FROM objects WHERE object_parent_id = ?1 AND object_deleted = 0",
                        [current],
                    )?;
                    for row in children.cursor() {
                        if let (Some(child), Some(Value::String(child_type))) =
                            (row.first().and_then(crate::object::value_to_u64), row.get(1))
                        {
                            queue.push_back((child, child_type.clone()));
                        }
                    }
                }
                Ok(deleted)
            })
            .map_err(|e| Error::write("deleting", e))?;

        tracing::debug!("Deleted {} object(s) under {}", deleted.len(), id);
        Ok(deleted)
    }
}

fn header_with(db: &Database, id: u64) -> Result<Option<ObjectHeader>> {
    db.query_row(
        "SELECT object_id, object_type, object_parent_id, object_creator_id, object_added, object_deleted \
         FROM objects WHERE object_id = ?1",
        [id],
        row_to_header,
    )
}

fn row_to_header(row: &rusqlite::Row) -> rusqlite::Result<ObjectHeader> {
    let deleted: i64 = row.get(5)?;
    Ok(ObjectHeader {
        id: row.get(0)?,
        type_name: row.get(1)?,
        parent_id: row.get(2)?,
        creator_id: row.get(3)?,
        added: row.get(4)?,
        deleted: deleted != 0,
    })
}

/// Rebuild the flat snapshot of `id` from its current attribute rows
fn snapshot_with(db: &Database, store: &ObjectStore, id: u64) -> Result<Map<String, Value>> {
    let header = header_with(db, id)?.ok_or(Error::NotFound(id))?;
    let model = store.models().get(&header.type_name).ok();

    let rows = db.query(
        "SELECT attribute_key, attribute_value, attribute_added FROM attributes \
         WHERE object_id = ?1 AND attribute_archived = 0 AND attribute_preview = 0",
        [id],
    )?;

    let mut snapshot = Map::new();
    let mut updated = header.added.clone();
    for row in rows.cursor() {
        let (Some(Value::String(key)), Some(value)) = (row.first(), row.get(1)) else {
            continue;
        };
        let field = model.and_then(|m| m.storage_fields().find(|f| &f.name == key));
        if model.is_some() && field.is_none() {
            continue;
        }
        let value = match field.and_then(|f| f.cast) {
            Some(cast) => coerce(value, cast),
            None => value.clone(),
        };
        snapshot.insert(key.clone(), value);

        if let Some(Value::String(added)) = row.get(2) {
            if updated.as_ref().is_none_or(|u| added > u) {
                updated = Some(added.clone());
            }
        }
    }

    snapshot.insert("id".to_string(), Value::from(id));
    snapshot.insert("parent_id".to_string(), header.parent_id.map(Value::from).unwrap_or(Value::Null));
    snapshot.insert("creator_id".to_string(), header.creator_id.map(Value::from).unwrap_or(Value::Null));
    snapshot.insert(ADDED_COLUMN.to_string(), header.added.map(Value::from).unwrap_or(Value::Null));
    snapshot.insert(UPDATED_COLUMN.to_string(), updated.map(Value::from).unwrap_or(Value::Null));
    Ok(snapshot)
}

/// Upsert the shadow row of `id` from its view, when the shadow table exists
fn upsert_shadow(db: &Database, model: &TypeModel, id: u64, preview: bool) -> Result<()> {
    let table = shadow_name(&model.name, preview);
    if !db.table_exists(&table)? {
        return Ok(());
    }
    let assignments: Vec<String> = model
        .columns()
        .into_iter()
        .filter(|c| c != "id")
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    db.execute(
        &format!(
            "INSERT INTO {} SELECT * FROM {} WHERE id = ?1 ON CONFLICT(id) DO UPDATE SET {}",
            table,
            view_name(&model.name, preview),
            assignments.join(", ")
        ),
        [id],
    )?;
    Ok(())
}

/// Text stored for a field value; `None` stores SQL NULL
fn encode_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some("0".to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Apply a field cast to stored text the way the views do
fn coerce(value: &Value, cast: CastType) -> Value {
    let Value::String(text) = value else {
        return value.clone();
    };
    match cast {
        CastType::Signed | CastType::Unsigned => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        CastType::Decimal => match text.trim().parse::<i64>() {
            Ok(i) => Value::from(i),
            Err(_) => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
        },
        _ => value.clone(),
    }
}
