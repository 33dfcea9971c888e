//! Object links
//!
//! Links are directed `(origin, target)` rows, unique per pair. `link` and
//! `unlink` write both directions for symmetric relations.

use super::store::ObjectStore;
use crate::object::Link;
use crate::query::QueryBuilder;
use crate::{Error, Result};

impl ObjectStore {
    // ========== Link Operations ==========

    /// Link `origin` to `target`; false when the link already existed
    pub fn link_directed(&self, origin: u64, target: u64) -> Result<bool> {
        let inserted = self.database().execute(
            "INSERT OR IGNORE INTO object_links (origin_id, target_id) VALUES (?1, ?2)",
            [origin, target],
        )?;
        Ok(inserted > 0)
    }

    /// Remove the `origin` to `target` link; false when there was none
    pub fn unlink_directed(&self, origin: u64, target: u64) -> Result<bool> {
        let removed = self.database().execute(
            "DELETE FROM object_links WHERE origin_id = ?1 AND target_id = ?2",
            [origin, target],
        )?;
        Ok(removed > 0)
    }

    /// Link two objects in both directions
    pub fn link(&self, a: u64, b: u64) -> Result<()> {
        self.database()
            .transaction(|_| {
                self.link_directed(a, b)?;
                self.link_directed(b, a)?;
                Ok(())
            })
            .map_err(|e| Error::write("linking", e))
    }

    /// Remove both directions of a link
    pub fn unlink(&self, a: u64, b: u64) -> Result<()> {
        self.database()
            .transaction(|_| {
                self.unlink_directed(a, b)?;
                self.unlink_directed(b, a)?;
                Ok(())
            })
            .map_err(|e| Error::write("unlinking", e))
    }

    pub fn is_linked(&self, origin: u64, target: u64) -> Result<bool> {
        let found: Option<i64> = self.database().query_row(
            "SELECT 1 FROM object_links WHERE origin_id = ?1 AND target_id = ?2",
            [origin, target],
            |row| row.get(0),
        )?;
        Ok(found.is_some())
    }

    /// Live targets linked from `origin`, optionally of one type
    pub fn linked_ids(&self, origin: u64, type_name: Option<&str>) -> Result<Vec<u64>> {
        let rows = self.database().query(
            "SELECT l.target_id FROM object_links AS l \
             JOIN objects AS o ON o.object_id = l.target_id \
             WHERE l.origin_id = ?1 AND o.object_deleted = 0 AND (?2 IS NULL OR o.object_type = ?2) \
             ORDER BY l.target_id",
            rusqlite::params![origin, type_name],
        )?;
        Ok(rows
            .cursor()
            .filter_map(|row| row.first().and_then(crate::object::value_to_u64))
            .collect())
    }

    /// Every link row leaving `origin`
    pub fn links_from(&self, origin: u64) -> Result<Vec<Link>> {
        let rows = self.database().query(
            "SELECT origin_id, target_id, added FROM object_links WHERE origin_id = ?1 ORDER BY target_id",
            [origin],
        )?;
        Ok(rows
            .cursor()
            .filter_map(|row| {
                Some(Link {
                    origin_id: crate::object::value_to_u64(row.first()?)?,
                    target_id: crate::object::value_to_u64(row.get(1)?)?,
                    added: row.get(2).and_then(|v| v.as_str()).map(str::to_string),
                })
            })
            .collect())
    }

    /// Query over the `type_name` objects linked from `origin`
    pub fn select_links(&self, origin: u64, type_name: &str) -> Result<QueryBuilder<'_>> {
        let ids = self.linked_ids(origin, Some(type_name))?;
        let mut query = self.select(type_name)?;
        query.is_in("id", ids)?;
        Ok(query)
    }

    /// Distinct types of the live objects linked from `origin`
    pub fn linked_types(&self, origin: u64) -> Result<Vec<String>> {
        let rows = self.database().query(
            "SELECT DISTINCT o.object_type FROM object_links AS l \
             JOIN objects AS o ON o.object_id = l.target_id \
             WHERE l.origin_id = ?1 AND o.object_deleted = 0 ORDER BY o.object_type",
            [origin],
        )?;
        Ok(rows
            .cursor()
            .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }

    pub fn link_count(&self, origin: u64, type_name: Option<&str>) -> Result<usize> {
        Ok(self.linked_ids(origin, type_name)?.len())
    }
}
