//! Layered key/value configuration
//!
//! A [`ScopedConfig`] reads its own values through a [`ConfigAdapter`] the first time they are
//! needed and layers them over its parent's values:
//!
//! ```text
//! root            { LOG_LEVEL=info, REGION=eu }
//! └── api         { LOG_LEVEL=debug }            -> { LOG_LEVEL=debug, REGION=eu }
//!     └── api.dev { REGION=us }                  -> { LOG_LEVEL=debug, REGION=us }
//! ```
//!
//! Adapters decide where values live (a cluster ConfigMap/Secret, a local JSON file, memory).
//! Each scope is stored separately; saving a child never rewrites its parent's values.

mod file;
mod memory;

pub use file::FileConfigAdapter;
pub use memory::{AdapterCounts, MemoryConfigAdapter};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Flat string map as stored by adapters
pub type ConfigValues = BTreeMap<String, String>;

/// Loads and saves the values of one configuration scope
///
/// `scope` is `None` for the root config and the dotted scope path otherwise (`api.dev`).
#[async_trait]
pub trait ConfigAdapter: Send + Sync {
    async fn load(&self, scope: Option<&str>) -> Result<ConfigValues>;

    async fn save(&self, values: &ConfigValues, scope: Option<&str>) -> Result<()>;
}

/// A value to store: plain text, or structured data kept as JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Text(String),
    Structured(serde_json::Value),
}

impl ConfigValue {
    /// Encode for storage
    pub fn into_stored(self) -> Result<String> {
        match self {
            ConfigValue::Text(text) => Ok(text),
            ConfigValue::Structured(value) => Ok(serde_json::to_string(&value)?),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Text(value)
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => ConfigValue::Text(text),
            other => ConfigValue::Structured(other),
        }
    }
}

/// Encode a map of [`ConfigValue`]s for storage
pub fn encode_values(values: BTreeMap<String, ConfigValue>) -> Result<ConfigValues> {
    values
        .into_iter()
        .map(|(key, value)| Ok((key, value.into_stored()?)))
        .collect()
}

/// Hierarchical configuration view
pub struct ScopedConfig {
    adapter: Arc<dyn ConfigAdapter>,
    segments: Vec<String>,
    parent: Option<Arc<ScopedConfig>>,
    /// Own values; `None` until first loaded
    values: Mutex<Option<ConfigValues>>,
}

impl ScopedConfig {
    /// Root config backed by `adapter`
    pub fn of(adapter: impl ConfigAdapter + 'static) -> Arc<Self> {
        Self::with_adapter(Arc::new(adapter))
    }

    /// Root config backed by a shared adapter
    pub fn with_adapter(adapter: Arc<dyn ConfigAdapter>) -> Arc<Self> {
        Arc::new(Self {
            adapter,
            segments: Vec::new(),
            parent: None,
            values: Mutex::new(None),
        })
    }

    /// Child config under `segment`, layered over `self`
    pub fn scope(self: &Arc<Self>, segment: &str) -> Arc<Self> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Arc::new(Self {
            adapter: Arc::clone(&self.adapter),
            segments,
            parent: Some(Arc::clone(self)),
            values: Mutex::new(None),
        })
    }

    /// Dotted scope path, `None` for the root
    pub fn scope_key(&self) -> Option<String> {
        if self.segments.is_empty() {
            None
        } else {
            Some(self.segments.join("."))
        }
    }

    pub fn parent(&self) -> Option<&Arc<ScopedConfig>> {
        self.parent.as_ref()
    }

    /// This scope's own values, loading them on first access
    pub async fn own_values(&self) -> Result<ConfigValues> {
        let mut guard = self.values.lock().await;
        if let Some(values) = guard.as_ref() {
            return Ok(values.clone());
        }

        let scope = self.scope_key();
        debug!(scope = scope.as_deref().unwrap_or("<root>"), "loading config");
        let loaded = self.adapter.load(scope.as_deref()).await?;
        *guard = Some(loaded.clone());
        Ok(loaded)
    }

    /// Merged view: parent values overridden by own values
    pub fn to_json(&self) -> BoxFuture<'_, Result<ConfigValues>> {
        Box::pin(async move {
            let mut merged = match &self.parent {
                Some(parent) => parent.to_json().await?,
                None => ConfigValues::new(),
            };
            merged.extend(self.own_values().await?);
            Ok(merged)
        })
    }

    /// Look up a key; absence is not an error
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.to_json().await?.remove(key))
    }

    /// Look up a key and parse it; absence is [`CoreError::MissingKey`]
    pub async fn get_with<T, E, F>(&self, key: &str, parser: F) -> Result<T>
    where
        F: FnOnce(&str) -> std::result::Result<T, E>,
        E: fmt::Display,
    {
        let value = self.get(key).await?.ok_or_else(|| CoreError::MissingKey {
            key: key.to_string(),
        })?;
        parser(&value).map_err(|e| CoreError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Look up a key holding JSON text
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_with(key, |v| serde_json::from_str::<T>(v)).await
    }

    /// Merged values as `KEY=value` lines
    pub async fn to_env(&self) -> Result<String> {
        Ok(self
            .to_json()
            .await?
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect())
    }

    /// Replace this scope's values and persist them
    pub async fn put(&self, values: ConfigValues) -> Result<()> {
        let mut guard = self.values.lock().await;
        self.adapter
            .save(&values, self.scope_key().as_deref())
            .await?;
        *guard = Some(values);
        Ok(())
    }

    /// Like [`put`](Self::put), encoding structured values as JSON
    pub async fn put_json(&self, values: BTreeMap<String, ConfigValue>) -> Result<()> {
        self.put(encode_values(values)?).await
    }

    /// Persist the current in-memory values of this scope
    pub async fn save(&self) -> Result<()> {
        let values = self.own_values().await?;
        self.adapter.save(&values, self.scope_key().as_deref()).await
    }
}

impl fmt::Debug for ScopedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedConfig")
            .field("scope", &self.scope_key())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, &str)]) -> ConfigValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn seeded() -> MemoryConfigAdapter {
        let adapter = MemoryConfigAdapter::new();
        adapter.seed(None, values(&[("LOG_LEVEL", "info"), ("REGION", "eu")]));
        adapter.seed(Some("api"), values(&[("LOG_LEVEL", "debug")]));
        adapter.seed(Some("api.dev"), values(&[("REGION", "us")]));
        adapter
    }

    #[test]
    fn test_scope_keys() {
        let root = ScopedConfig::of(MemoryConfigAdapter::new());
        assert_eq!(root.scope_key(), None);
        assert_eq!(root.scope("api").scope_key().as_deref(), Some("api"));
        assert_eq!(
            root.scope("api").scope("dev").scope_key().as_deref(),
            Some("api.dev")
        );
    }

    #[tokio::test]
    async fn test_child_overrides_parent() {
        let root = ScopedConfig::of(seeded());
        let api = root.scope("api");
        let dev = api.scope("dev");

        assert_eq!(
            api.to_json().await.unwrap(),
            values(&[("LOG_LEVEL", "debug"), ("REGION", "eu")])
        );
        assert_eq!(
            dev.to_json().await.unwrap(),
            values(&[("LOG_LEVEL", "debug"), ("REGION", "us")])
        );
        // The parent is unaffected by its children
        assert_eq!(
            root.to_json().await.unwrap(),
            values(&[("LOG_LEVEL", "info"), ("REGION", "eu")])
        );
    }

    #[tokio::test]
    async fn test_removing_override_restores_parent_value() {
        let adapter = seeded();
        let root = ScopedConfig::of(adapter);
        let api = root.scope("api");
        assert_eq!(api.get("LOG_LEVEL").await.unwrap().as_deref(), Some("debug"));

        api.put(ConfigValues::new()).await.unwrap();
        assert_eq!(api.get("LOG_LEVEL").await.unwrap().as_deref(), Some("info"));
    }

    #[tokio::test]
    async fn test_loads_lazily_and_once() {
        let adapter = seeded();
        let root = ScopedConfig::of(adapter.clone());
        let api = root.scope("api");
        assert_eq!(adapter.counts().loads, 0);

        api.get("LOG_LEVEL").await.unwrap();
        api.get("REGION").await.unwrap();
        api.to_json().await.unwrap();

        // one load for api, one for root
        assert_eq!(adapter.counts().loads, 2);
    }

    #[tokio::test]
    async fn test_get_absent_key_without_parser_is_none() {
        let root = ScopedConfig::of(seeded());
        assert_eq!(root.get("MISSING").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_absent_key_with_parser_is_error() {
        let root = ScopedConfig::of(seeded());
        let err = root
            .get_with("MISSING", |v| v.parse::<u16>())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingKey { ref key } if key == "MISSING"));
    }

    #[tokio::test]
    async fn test_get_with_parser() {
        let adapter = MemoryConfigAdapter::new();
        adapter.seed(None, values(&[("PORT", "8080"), ("BAD", "x")]));
        let root = ScopedConfig::of(adapter);

        assert_eq!(root.get_with("PORT", |v| v.parse::<u16>()).await.unwrap(), 8080);
        let err = root.get_with("BAD", |v| v.parse::<u16>()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_put_json_round_trips_structured_values() {
        let adapter = MemoryConfigAdapter::new();
        let root = ScopedConfig::of(adapter.clone());
        let kafka = root.scope("kafka");

        let mut input = BTreeMap::new();
        input.insert("HOST".to_string(), ConfigValue::from("kafka:9092"));
        input.insert(
            "AUTH".to_string(),
            ConfigValue::from(json!({ "mechanism": "PLAIN" })),
        );
        kafka.put_json(input).await.unwrap();

        assert_eq!(
            adapter.stored(Some("kafka")).unwrap()["AUTH"],
            r#"{"mechanism":"PLAIN"}"#
        );
        let auth: serde_json::Value = kafka.get_json("AUTH").await.unwrap();
        assert_eq!(auth["mechanism"], "PLAIN");
    }

    #[tokio::test]
    async fn test_save_only_writes_own_scope() {
        let adapter = seeded();
        let root = ScopedConfig::of(adapter.clone());
        let api = root.scope("api");
        api.to_json().await.unwrap();

        api.save().await.unwrap();

        assert_eq!(adapter.counts().saves, 1);
        assert_eq!(adapter.saved_scopes(), vec![Some("api".to_string())]);
        assert_eq!(adapter.stored(Some("api")).unwrap(), values(&[("LOG_LEVEL", "debug")]));
    }

    #[tokio::test]
    async fn test_to_env() {
        let root = ScopedConfig::of(seeded());
        insta::assert_snapshot!(root.scope("api").to_env().await.unwrap(), @r"
        LOG_LEVEL=debug
        REGION=eu
        ");
    }
}
