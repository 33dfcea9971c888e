//! The object store
//!
//! `ObjectStore` ties the gateway, the declared types and the view catalog
//! together. Attribute, cache and link operations live in sibling modules as
//! further `impl ObjectStore` blocks.

use std::cell::{Ref, RefCell};
use std::path::{Path, PathBuf};

use super::db::Database;
use super::schema::{core_model, ATTRIBUTES_TABLE, CACHES_TABLE, LINKS_TABLE, OBJECTS_TABLE};
use crate::model::ModelRegistry;
use crate::query::QueryBuilder;
use crate::view::{ViewBuilder, ViewCatalog};
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Materialize `q_`/`qp_` tables and query them instead of the views
    pub shadow_tables: bool,
    /// Writes become preview rows and queries read the preview relations
    pub preview: bool,
    /// Where the view catalog is persisted
    pub view_list: Option<PathBuf>,
    /// Read-only replica for plain reads
    pub replica: Option<PathBuf>,
}

pub struct ObjectStore {
    db: Database,
    models: ModelRegistry,
    views: RefCell<ViewCatalog>,
    options: StoreOptions,
}

impl ObjectStore {
    /// Open a store on a database file. The schema is not migrated; call
    /// `migrate` for that.
    pub fn open(path: &Path, models: ModelRegistry, options: StoreOptions) -> Result<Self> {
        let mut db = Database::open(path)?;
        if let Some(replica) = &options.replica {
            db = db.with_replica(replica)?;
        }
        Self::with_database(db, models, options)
    }

    /// Open a migrated in-memory store (for testing)
    pub fn open_in_memory(models: ModelRegistry) -> Result<Self> {
        let store = Self::with_database(Database::open_in_memory()?, models, StoreOptions::default())?;
        store.migrate()?;
        Ok(store)
    }

    pub fn with_database(db: Database, models: ModelRegistry, options: StoreOptions) -> Result<Self> {
        let views = match &options.view_list {
            Some(path) => ViewCatalog::load(path)?,
            None => ViewCatalog::new(),
        };
        Ok(Self {
            db,
            models,
            views: RefCell::new(views),
            options,
        })
    }

    /// Create or extend the core tables; returns the number of statements run
    pub fn migrate(&self) -> Result<usize> {
        let statements = core_model(self.db.dialect()).plan(|table| self.db.live_columns(table))?;
        if statements.is_empty() {
            tracing::debug!("Schema is up to date");
            return Ok(0);
        }

        self.db.transaction(|db| {
            for statement in &statements {
                db.execute(statement, [])?;
            }
            Ok(())
        })?;

        tracing::info!("Applied {} schema statements", statements.len());
        Ok(statements.len())
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelRegistry {
        &mut self.models
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn set_preview(&mut self, preview: bool) {
        self.options.preview = preview;
    }

    /// Switch shadow tables on or off; every type is rebuilt on next use
    pub fn set_shadow_tables(&mut self, enabled: bool) {
        if self.options.shadow_tables != enabled {
            self.options.shadow_tables = enabled;
            let mut views = self.views.borrow_mut();
            let names: Vec<String> = views.entries().map(|(name, _)| name.to_string()).collect();
            for name in names {
                views.forget(&name);
            }
        }
    }

    // ========== View Operations ==========

    /// Start a query over `type_name`, rebuilding its views first if stale
    pub fn select(&self, type_name: &str) -> Result<QueryBuilder<'_>> {
        let model = self.models.get(type_name)?;
        self.build_if_expired(type_name)?;
        Ok(QueryBuilder::new(self, model))
    }

    /// Rebuild views of `type_name` when its declaration is newer than the
    /// last build; returns whether a rebuild happened
    pub fn build_if_expired(&self, type_name: &str) -> Result<bool> {
        let model = self.models.get(type_name)?;
        if !self.views.borrow().is_expired(type_name, model.modified) {
            return Ok(false);
        }
        self.rebuild_views(type_name)?;
        Ok(true)
    }

    /// Unconditionally rebuild the views (and shadow tables) of `type_name`
    pub fn rebuild_views(&self, type_name: &str) -> Result<()> {
        let model = self.models.get(type_name)?;
        let statements = ViewBuilder::new(model, self.db.dialect()).build_statements(self.options.shadow_tables);

        self.db.transaction(|db| {
            for statement in &statements {
                db.execute(statement, [])?;
            }
            Ok(())
        })?;

        let mut views = self.views.borrow_mut();
        views.mark_built(type_name, model.modified);
        views.save()?;
        tracing::info!(
            "Built views for {} (build #{}, shadow tables {})",
            type_name,
            views.builds(type_name),
            if self.options.shadow_tables { "on" } else { "off" }
        );
        Ok(())
    }

    /// Rebuild every declared type; returns how many were rebuilt
    pub fn rebuild_all_views(&self, force: bool) -> Result<usize> {
        let mut rebuilt = 0;
        for name in self.models.type_names() {
            if force {
                self.rebuild_views(name)?;
                rebuilt += 1;
            } else if self.build_if_expired(name)? {
                rebuilt += 1;
            }
        }
        Ok(rebuilt)
    }

    pub fn view_catalog(&self) -> Ref<'_, ViewCatalog> {
        self.views.borrow()
    }

    // ========== Stats ==========

    fn count_where(&self, table: &str, condition: &str) -> Result<usize> {
        let count: Option<i64> = self.db.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", table, condition),
            [],
            |row| row.get(0),
        )?;
        Ok(count.unwrap_or(0) as usize)
    }

    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            types: self.models.len(),
            objects: self.count_where(OBJECTS_TABLE, "object_deleted = 0")?,
            deleted: self.count_where(OBJECTS_TABLE, "object_deleted = 1")?,
            attributes: self.count_where(ATTRIBUTES_TABLE, "attribute_archived = 0 AND attribute_preview = 0")?,
            archived: self.count_where(ATTRIBUTES_TABLE, "attribute_archived = 1")?,
            previews: self.count_where(ATTRIBUTES_TABLE, "attribute_preview = 1")?,
            caches: self.db.count(CACHES_TABLE)?,
            links: self.db.count(LINKS_TABLE)?,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub types: usize,
    pub objects: usize,
    pub deleted: usize,
    pub attributes: usize,
    pub archived: usize,
    pub previews: usize,
    pub caches: usize,
    pub links: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Types: {}", self.types)?;
        writeln!(f, "  Objects: {} ({} deleted)", self.objects, self.deleted)?;
        writeln!(f, "  Attributes: {} current, {} archived, {} preview", self.attributes, self.archived, self.previews)?;
        writeln!(f, "  Caches: {}", self.caches)?;
        writeln!(f, "  Links: {}", self.links)
    }
}
