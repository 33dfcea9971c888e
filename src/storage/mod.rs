//! Storage Layer - SQLite-backed object persistence
//!
//! System of record is SQLite with tables:
//! - objects(object_id, object_parent_id, object_creator_id, object_type, object_added, object_deleted)
//! - attributes(object_id, attribute_creator_id, attribute_key, attribute_value, attribute_added, attribute_archived, attribute_preview)
//! - object_caches(object_id, cache)
//! - object_links(origin_id, target_id, added)

mod attributes;
mod cache;
pub mod db;
mod links;
pub mod results;
pub mod schema;
mod store;

pub use attributes::ObjectHeader;
pub use db::Database;
pub use results::{Cursor, ResultSet};
pub use store::{DbStats, ObjectStore, StoreOptions};
