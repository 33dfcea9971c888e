//! `eavdb.toml` configuration
//!
//! ```toml
//! database = ".eavdb/eavdb.db"
//! shadow_tables = true
//!
//! [types.Person]
//! fields = [
//!     { name = "name" },
//!     { name = "age", cast = "signed" },
//! ]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::model::{FieldSpec, ModelRegistry};
use crate::storage::StoreOptions;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EavConfig {
    pub database: Option<String>,
    pub replica: Option<String>,
    #[serde(default)]
    pub shadow_tables: bool,
    #[serde(default)]
    pub preview: bool,
    pub view_list: Option<String>,
    #[serde(default)]
    pub types: BTreeMap<String, TypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TypeConfig {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl EavConfig {
    /// Database path, relative paths resolved against `base`
    pub fn database_path(&self, base: &Path) -> PathBuf {
        match &self.database {
            Some(db) => base.join(db),
            None => default_database_path_in(base),
        }
    }

    pub fn store_options(&self, base: &Path) -> StoreOptions {
        let view_list = match &self.view_list {
            Some(path) => base.join(path),
            None => default_view_list_path_in(base),
        };
        StoreOptions {
            shadow_tables: self.shadow_tables,
            preview: self.preview,
            view_list: Some(view_list),
            replica: self.replica.as_ref().map(|r| base.join(r)),
        }
    }

    /// Build the type registry; every type takes `modified` as its
    /// declaration time
    pub fn registry(&self, modified: Option<u64>) -> crate::Result<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        for (name, declared) in &self.types {
            registry.register(name, declared.fields.clone())?;
            if let Some(modified) = modified {
                registry.set_modified(name, modified)?;
            }
        }
        Ok(registry)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("eavdb.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".eavdb").join("eavdb.db")
}

pub fn default_view_list_path_in(base: &Path) -> PathBuf {
    base.join(".eavdb").join("views.json")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<EavConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: EavConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

/// Modification time of a file in milliseconds since the epoch
pub fn modified_millis(path: &Path) -> Option<u64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_millis() as u64)
}

pub fn write_config(path: &Path, config: &EavConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CastType;

    const SAMPLE: &str = r#"
database = "data/store.db"
shadow_tables = true

[types.Person]
fields = [
    { name = "name" },
    { name = "age", cast = "signed" },
    { name = "notes", ignore = true },
]

[types.Tag]
fields = [{ name = "label", indexed = true }]
"#;

    #[test]
    fn test_parse_and_registry() {
        let config: EavConfig = toml::from_str(SAMPLE).unwrap();
        assert!(config.shadow_tables);
        assert!(!config.preview);
        assert_eq!(config.database_path(Path::new("/srv")), PathBuf::from("/srv/data/store.db"));

        let registry = config.registry(Some(1234)).unwrap();
        let person = registry.get("Person").unwrap();
        assert_eq!(person.modified, 1234);
        assert_eq!(person.field("age").unwrap().cast, Some(CastType::Signed));
        assert!(person.field("notes").unwrap().ignore);
        assert!(registry.get("Tag").unwrap().field("label").unwrap().indexed);
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eavdb.toml");
        let config: EavConfig = toml::from_str(SAMPLE).unwrap();

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.types, config.types);
        assert!(modified_millis(&path).is_some());
        assert!(load_config(Some(&dir.path().join("missing.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_store_options_defaults() {
        let options = EavConfig::default().store_options(Path::new("base"));
        assert_eq!(options.view_list, Some(PathBuf::from("base/.eavdb/views.json")));
        assert!(options.replica.is_none());
        assert!(!options.shadow_tables);
    }
}
