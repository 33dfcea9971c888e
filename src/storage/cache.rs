//! Per-object snapshot cache

use serde_json::{Map, Value};

use super::db::Database;
use super::store::ObjectStore;
use crate::Result;

impl ObjectStore {
    // ========== Cache Operations ==========

    /// Cached snapshot of object `id`; `None` when absent or unreadable
    pub fn read_cache(&self, id: u64) -> Result<Option<Map<String, Value>>> {
        let Some(bytes) = self
            .database()
            .query_blob("SELECT cache FROM object_caches WHERE object_id = ?1", [id])?
        else {
            return Ok(None);
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(snapshot)) => Ok(Some(snapshot)),
            Ok(_) => {
                tracing::warn!("Cache for object {} is not an object; ignoring", id);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Corrupt cache for object {}: {}", id, e);
                Ok(None)
            }
        }
    }

    /// Replace the cached snapshot of object `id`
    pub fn write_cache(&self, id: u64, snapshot: &Map<String, Value>) -> Result<()> {
        write_cache_with(self.database(), id, snapshot)
    }

    pub fn clear_cache(&self, id: u64) -> Result<bool> {
        let removed = self
            .database()
            .execute("DELETE FROM object_caches WHERE object_id = ?1", [id])?;
        Ok(removed > 0)
    }
}

pub(crate) fn write_cache_with(db: &Database, id: u64, snapshot: &Map<String, Value>) -> Result<()> {
    let bytes = serde_json::to_vec(snapshot)?;
    db.execute(
        "INSERT INTO object_caches (object_id, cache) VALUES (?1, ?2) \
         ON CONFLICT(object_id) DO UPDATE SET cache = excluded.cache",
        rusqlite::params![id, bytes],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, ModelRegistry};
    use crate::object::Entity;
    use serde_json::json;

    fn store() -> ObjectStore {
        let mut models = ModelRegistry::new();
        models.register("Note", vec![FieldSpec::new("body")]).unwrap();
        ObjectStore::open_in_memory(models).unwrap()
    }

    #[test]
    fn test_write_and_read() {
        let store = store();
        let mut note = Entity::new("Note");
        note.set("body", "hello");
        let id = store.update(&mut note).unwrap();

        let cached = store.read_cache(id).unwrap().unwrap();
        assert_eq!(cached["body"], json!("hello"));
        assert_eq!(cached["id"], json!(id));

        let mut replaced = Map::new();
        replaced.insert("body".to_string(), json!("bye"));
        store.write_cache(id, &replaced).unwrap();
        assert_eq!(store.read_cache(id).unwrap().unwrap()["body"], json!("bye"));
    }

    #[test]
    fn test_corrupt_cache_is_a_miss() {
        let store = store();
        let mut note = Entity::new("Note");
        note.set("body", "hello");
        let id = store.update(&mut note).unwrap();

        store
            .database()
            .execute("UPDATE object_caches SET cache = X'00FF' WHERE object_id = ?1", [id])
            .unwrap();
        assert!(store.read_cache(id).unwrap().is_none());

        // populate falls back to the attribute rows and repairs the cache
        let snapshot = store.populate(id).unwrap();
        assert_eq!(snapshot["body"], json!("hello"));
        assert!(store.read_cache(id).unwrap().is_some());
    }

    #[test]
    fn test_clear() {
        let store = store();
        assert!(store.read_cache(42).unwrap().is_none());
        assert!(!store.clear_cache(42).unwrap());
    }
}
