//! File-based config adapter
//!
//! Each scope lives in its own JSON file next to the root file:
//! `envs/app.json` for the root, `envs/app-api.dev.json` for scope `api.dev`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{ConfigAdapter, ConfigValue, ConfigValues, encode_values};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct FileConfigAdapter {
    path: PathBuf,
}

impl FileConfigAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the file holding `scope`
    pub fn scope_path(&self, scope: Option<&str>) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match scope {
            Some(scope) => format!("{}-{}", stem, scope),
            None => stem,
        };
        let file_name = match self.path.extension() {
            Some(ext) => format!("{}.{}", name, ext.to_string_lossy()),
            None => name,
        };
        self.path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(file_name)
    }
}

#[async_trait]
impl ConfigAdapter for FileConfigAdapter {
    async fn load(&self, scope: Option<&str>) -> Result<ConfigValues> {
        let path = self.scope_path(scope);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ConfigValues::new()),
            Err(e) => return Err(e.into()),
        };
        let raw: BTreeMap<String, ConfigValue> = serde_json::from_str(&content)?;
        encode_values(raw)
    }

    async fn save(&self, values: &ConfigValues, scope: Option<&str>) -> Result<()> {
        let path = self.scope_path(scope);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(values)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopedConfig;
    use tempfile::TempDir;

    #[test]
    fn test_scope_path() {
        let adapter = FileConfigAdapter::new("/etc/envs/app.json");
        assert_eq!(adapter.scope_path(None), PathBuf::from("/etc/envs/app.json"));
        assert_eq!(
            adapter.scope_path(Some("api.dev")),
            PathBuf::from("/etc/envs/app-api.dev.json")
        );
    }

    #[test]
    fn test_scope_path_without_extension() {
        let adapter = FileConfigAdapter::new("envs/app");
        assert_eq!(adapter.scope_path(Some("api")), PathBuf::from("envs/app-api"));
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let adapter = FileConfigAdapter::new(dir.path().join("app.json"));
        assert!(adapter.load(Some("api")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let adapter = FileConfigAdapter::new(dir.path().join("nested/app.json"));

        let mut values = ConfigValues::new();
        values.insert("PORT".to_string(), "8080".to_string());
        adapter.save(&values, Some("api")).await.unwrap();

        assert!(dir.path().join("nested/app-api.json").exists());
        assert_eq!(adapter.load(Some("api")).await.unwrap(), values);
        assert!(adapter.load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_string_values_are_encoded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.json");
        std::fs::write(&path, r#"{"REPLICAS": 3, "KAFKA": {"host": "k"}, "NAME": "api"}"#)
            .unwrap();

        let values = FileConfigAdapter::new(&path).load(None).await.unwrap();
        assert_eq!(values["REPLICAS"], "3");
        assert_eq!(values["KAFKA"], r#"{"host":"k"}"#);
        assert_eq!(values["NAME"], "api");
    }

    #[tokio::test]
    async fn test_scoped_config_over_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.json");
        std::fs::write(&path, r#"{"A": "root", "B": "root"}"#).unwrap();
        std::fs::write(dir.path().join("app-api.json"), r#"{"B": "api"}"#).unwrap();

        let root = ScopedConfig::of(FileConfigAdapter::new(&path));
        let merged = root.scope("api").to_json().await.unwrap();
        assert_eq!(merged["A"], "root");
        assert_eq!(merged["B"], "api");
    }
}
