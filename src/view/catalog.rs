//! Build bookkeeping for per-type views
//!
//! The catalog remembers when each type's views were last built and which
//! declaration they were built for. A type is stale once its declaration's
//! modified time is newer than that. When a path is set the catalog is
//! persisted as JSON after every build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{now_millis, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEntry {
    /// Milliseconds since the epoch
    pub built_at: u64,
    /// Modified time of the declaration the views were built from
    #[serde(default)]
    pub modified: u64,
    pub builds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewCatalog {
    #[serde(default)]
    views: BTreeMap<String, ViewEntry>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl ViewCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog stored at `path`; a missing or unreadable file starts
    /// an empty catalog that will be written there
    pub fn load(path: &Path) -> Result<Self> {
        let mut catalog = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<ViewCatalog>(&content) {
                Ok(catalog) => catalog,
                Err(e) => {
                    tracing::warn!("Ignoring corrupt view list {}: {}", path.display(), e);
                    ViewCatalog::default()
                }
            }
        } else {
            ViewCatalog::default()
        };
        catalog.path = Some(path.to_path_buf());
        Ok(catalog)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether views for `type_name` predate a declaration modified at `modified`
    pub fn is_expired(&self, type_name: &str, modified: u64) -> bool {
        match self.views.get(type_name) {
            Some(entry) => modified > entry.modified,
            None => true,
        }
    }

    /// Record a build of `type_name` for a declaration modified at `modified`
    pub fn mark_built(&mut self, type_name: &str, modified: u64) {
        let entry = self.views.entry(type_name.to_string()).or_default();
        entry.built_at = now_millis().max(modified);
        entry.modified = modified;
        entry.builds += 1;
    }

    pub fn last_built(&self, type_name: &str) -> Option<u64> {
        self.views.get(type_name).map(|e| e.built_at)
    }

    /// How many times views for `type_name` were built
    pub fn builds(&self, type_name: &str) -> u64 {
        self.views.get(type_name).map(|e| e.builds).unwrap_or(0)
    }

    pub fn forget(&mut self, type_name: &str) {
        self.views.remove(type_name);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ViewEntry)> {
        self.views.iter().map(|(k, v)| (k.as_str(), v))
    }
}
