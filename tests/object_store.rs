//! End-to-end behaviour of a file-backed object store

use std::path::Path;

use eavdb::storage::StoreOptions;
use eavdb::{CastType, Direction, Entity, Error, FieldSpec, ModelRegistry, ObjectStore};
use serde_json::json;
use tempfile::TempDir;

fn registry() -> ModelRegistry {
    let mut models = ModelRegistry::new();
    models
        .register(
            "Person",
            vec![
                FieldSpec::new("name").indexed(),
                FieldSpec::new("age").with_cast(CastType::Signed),
                FieldSpec::new("email"),
            ],
        )
        .unwrap();
    models
        .register("Company", vec![FieldSpec::new("title")])
        .unwrap();
    models
}

fn options(dir: &Path, shadow_tables: bool) -> StoreOptions {
    StoreOptions {
        shadow_tables,
        preview: false,
        view_list: Some(dir.join("views.json")),
        replica: None,
    }
}

fn open(dir: &TempDir, models: ModelRegistry, shadow_tables: bool) -> ObjectStore {
    let store = ObjectStore::open(
        &dir.path().join("store.db"),
        models,
        options(dir.path(), shadow_tables),
    )
    .unwrap();
    store.migrate().unwrap();
    store
}

fn person(store: &ObjectStore, name: &str, age: i64) -> u64 {
    let mut entity = Entity::new("Person").with("name", name).with("age", age);
    store.update(&mut entity).unwrap()
}

fn attribute_rows(store: &ObjectStore, id: u64, key: &str, archived: bool) -> usize {
    let count: Option<i64> = store
        .database()
        .query_row(
            "SELECT COUNT(*) FROM attributes WHERE object_id = ?1 AND attribute_key = ?2 \
             AND attribute_archived = ?3 AND attribute_preview = 0",
            rusqlite::params![id, key, archived],
            |row| row.get(0),
        )
        .unwrap();
    count.unwrap_or(0) as usize
}

#[test]
fn test_people_roundtrip_and_query() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, registry(), false);

    let ann = person(&store, "Ann", 34);
    let bob = person(&store, "Bob", 17);
    person(&store, "Cid", 52);

    let snapshot = store.populate(ann).unwrap();
    assert_eq!(snapshot["name"], json!("Ann"));
    assert_eq!(snapshot["age"], json!(34));
    assert_eq!(snapshot["id"], json!(ann));

    let mut adults = store.select("Person").unwrap();
    adults.gte("age", 18).unwrap().order_by("age", Direction::Desc).unwrap();
    let names: Vec<String> = adults
        .entities()
        .unwrap()
        .iter()
        .filter_map(|e| e.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    assert_eq!(names, vec!["Cid".to_string(), "Ann".to_string()]);

    let mut minors = store.select("Person").unwrap();
    minors.lt("age", 18).unwrap();
    assert_eq!(minors.ids().unwrap(), vec![bob]);

    let loaded = store.from_id(bob, &["Person"]).unwrap();
    assert_eq!(loaded.get("age"), Some(&json!(17)));
    assert!(matches!(
        store.from_id(bob, &["Company"]),
        Err(Error::WrongType { .. })
    ));
}

#[test]
fn test_every_change_archives_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, registry(), false);

    let mut ann = Entity::new("Person").with("name", "Ann").with("age", 34);
    let id = store.update(&mut ann).unwrap();

    ann.set("age", 35);
    store.update(&mut ann).unwrap();
    ann.set("age", 36);
    store.update(&mut ann).unwrap();

    assert_eq!(attribute_rows(&store, id, "age", false), 1);
    assert_eq!(attribute_rows(&store, id, "age", true), 2);
    // Unchanged keys are not rewritten
    assert_eq!(attribute_rows(&store, id, "name", false), 1);
    assert_eq!(attribute_rows(&store, id, "name", true), 0);
    assert_eq!(store.populate(id).unwrap()["age"], json!(36));
}

#[test]
fn test_rapid_updates_keep_single_current_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, registry(), false);
    let id = person(&store, "Ann", 34);

    for name in ["Anna", "Annie", "Anne"] {
        let mut entity = store.from_id(id, &[]).unwrap();
        entity.set("name", name);
        store.update(&mut entity).unwrap();
    }

    assert_eq!(attribute_rows(&store, id, "name", false), 1);
    let mut query = store.select("Person").unwrap();
    query.eq("name", "Anne").unwrap();
    assert_eq!(query.ids().unwrap(), vec![id]);
    assert_eq!(store.fetch_direct(id).unwrap()["name"], json!("Anne"));
}

#[test]
fn test_delete_hides_object_and_descendants() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, registry(), false);

    let mut acme = Entity::new("Company").with("title", "Acme");
    let acme_id = store.update(&mut acme).unwrap();
    let mut ann = Entity::new("Person").with("name", "Ann").with("age", 34);
    ann.parent_id = Some(acme_id);
    let ann_id = store.update(&mut ann).unwrap();
    let bob = person(&store, "Bob", 40);

    let mut deleted = store.delete(acme_id).unwrap();
    deleted.sort();
    assert_eq!(deleted, vec![acme_id, ann_id]);

    assert!(matches!(store.from_id(ann_id, &[]), Err(Error::NotFound(_))));
    assert!(store.object_header(ann_id).unwrap().unwrap().deleted);
    assert_eq!(store.select("Person").unwrap().ids().unwrap(), vec![bob]);
    assert_eq!(store.select("Company").unwrap().count().unwrap(), 0);

    let stats = store.stats().unwrap();
    assert_eq!(stats.objects, 1);
    assert_eq!(stats.deleted, 2);
}

#[test]
fn test_views_build_once_until_declaration_changes() {
    let dir = tempfile::tempdir().unwrap();
    let models = registry();

    {
        let store = open(&dir, models.clone(), false);
        store.select("Person").unwrap();
        store.select("Person").unwrap();
        assert_eq!(store.view_catalog().builds("Person"), 1);
    }

    // The view list survives a reopen, so an unchanged declaration is not rebuilt
    let mut store = open(&dir, models, false);
    assert_eq!(store.view_catalog().builds("Person"), 1);
    store.select("Person").unwrap();
    assert_eq!(store.view_catalog().builds("Person"), 1);

    store
        .models_mut()
        .register(
            "Person",
            vec![FieldSpec::new("name"), FieldSpec::new("nickname")],
        )
        .unwrap();
    let mut query = store.select("Person").unwrap();
    assert!(query.to_sql().unwrap().contains("v_Person"));
    query.count().unwrap();
    assert_eq!(store.view_catalog().builds("Person"), 2);
    assert!(dir.path().join("views.json").exists());
}

#[test]
fn test_shadow_tables_follow_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, registry(), true);

    let mut ann = Entity::new("Person").with("name", "Ann").with("age", 34);
    let id = store.update(&mut ann).unwrap();
    assert!(store.database().table_exists("q_Person").unwrap());
    assert!(store.database().table_exists("qp_Person").unwrap());

    let mut query = store.select("Person").unwrap();
    query.eq("name", "Ann").unwrap();
    assert!(query.to_sql().unwrap().contains("FROM q_Person"));
    assert_eq!(query.ids().unwrap(), vec![id]);

    ann.set("name", "Anna");
    store.update(&mut ann).unwrap();
    let name: Option<String> = store
        .database()
        .query_row("SELECT name FROM q_Person WHERE id = ?1", [id], |row| row.get(0))
        .unwrap();
    assert_eq!(name.as_deref(), Some("Anna"));
    assert_eq!(store.database().count("q_Person").unwrap(), 1);

    store.delete(id).unwrap();
    assert_eq!(store.database().count("q_Person").unwrap(), 0);
    assert_eq!(store.database().count("qp_Person").unwrap(), 0);
}

#[test]
fn test_preview_writes_stay_pending() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = open(&dir, registry(), false);
    let id = person(&store, "Ann", 34);

    store.set_preview(true);
    let mut draft = store.from_id(id, &["Person"]).unwrap();
    draft.set("name", "Draft Ann");
    store.update(&mut draft).unwrap();

    assert_eq!(store.populate(id).unwrap()["name"], json!("Ann"));
    let pending = store.populate_preview("Person", id).unwrap();
    assert_eq!(pending["name"], json!("Draft Ann"));
    assert_eq!(pending["age"], json!(34));

    let mut preview_query = store.select("Person").unwrap();
    preview_query.eq("name", "Draft Ann").unwrap();
    assert_eq!(preview_query.ids().unwrap(), vec![id]);
    assert_eq!(attribute_rows(&store, id, "name", true), 0);

    // A committed write discards pending rows
    store.set_preview(false);
    let mut committed = store.from_id(id, &["Person"]).unwrap();
    committed.set("age", 35);
    store.update(&mut committed).unwrap();
    let after = store.populate_preview("Person", id).unwrap();
    assert_eq!(after["name"], json!("Ann"));
    assert_eq!(after["age"], json!(35));
    assert_eq!(store.stats().unwrap().previews, 0);
}

#[test]
fn test_links_between_objects() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, registry(), false);

    let ann = person(&store, "Ann", 34);
    let bob = person(&store, "Bob", 17);
    let mut acme = Entity::new("Company").with("title", "Acme");
    let acme_id = store.update(&mut acme).unwrap();

    store.link(acme_id, ann).unwrap();
    store.link(acme_id, bob).unwrap();
    assert!(store.is_linked(ann, acme_id).unwrap());

    let mut staff = store.select_links(acme_id, "Person").unwrap();
    staff.gte("age", 18).unwrap();
    assert_eq!(staff.ids().unwrap(), vec![ann]);

    store.unlink(acme_id, bob).unwrap();
    assert_eq!(store.linked_ids(acme_id, None).unwrap(), vec![ann]);
    assert_eq!(store.stats().unwrap().links, 2);
}

#[test]
fn test_cache_is_rebuilt_after_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, registry(), false);
    let id = person(&store, "Ann", 34);

    assert!(store.read_cache(id).unwrap().is_some());
    assert!(store.clear_cache(id).unwrap());
    assert!(store.read_cache(id).unwrap().is_none());

    let snapshot = store.populate(id).unwrap();
    assert_eq!(snapshot["name"], json!("Ann"));
    assert_eq!(store.read_cache(id).unwrap(), Some(snapshot));
}

fn check_uncast_age_queries(shadow_tables: bool) {
    let dir = tempfile::tempdir().unwrap();
    let mut models = ModelRegistry::new();
    models
        .register("Person", vec![FieldSpec::new("name"), FieldSpec::new("age")])
        .unwrap();
    let mut store = open(&dir, models, shadow_tables);

    let mut ann = Entity::new("Person").with("name", "Ann").with("age", 30);
    let id = store.update(&mut ann).unwrap();
    ann.set("age", 31);
    store.update(&mut ann).unwrap();

    for preview in [false, true] {
        store.set_preview(preview);
        let mut current = store.select("Person").unwrap();
        current.eq("age", 31).unwrap();
        assert_eq!(current.ids().unwrap(), vec![id], "preview {}", preview);

        let mut previous = store.select("Person").unwrap();
        previous.eq("age", 30).unwrap();
        assert_eq!(previous.count().unwrap(), 0, "preview {}", preview);
    }

    // Still in preview mode: a pending value is only visible to preview queries
    ann.set("age", 32);
    store.update(&mut ann).unwrap();
    let mut pending = store.select("Person").unwrap();
    pending.eq("age", 32).unwrap();
    assert_eq!(pending.ids().unwrap(), vec![id]);

    store.set_preview(false);
    let mut committed = store.select("Person").unwrap();
    committed.eq("age", 32).unwrap();
    assert_eq!(committed.count().unwrap(), 0);
    let mut committed = store.select("Person").unwrap();
    committed.eq("age", 31).unwrap();
    assert_eq!(committed.ids().unwrap(), vec![id]);
}

#[test]
fn test_uncast_age_queries_on_views() {
    check_uncast_age_queries(false);
}

#[test]
fn test_uncast_age_queries_on_shadow_tables() {
    check_uncast_age_queries(true);
}
