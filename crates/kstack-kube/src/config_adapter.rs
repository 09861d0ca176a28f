//! ConfigMap/Secret-backed configuration storage
//!
//! Each config scope lives in its own object named `<name>[.<scope>]`. Objects are created
//! empty on first load so a fresh cluster needs no preparation.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use kstack_core::{ConfigAdapter, ConfigValues, CoreError, ShellCommand};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::KubeError;
use crate::kubectl::Kubectl;

/// Kind of object holding the values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigKind {
    #[default]
    ConfigMap,
    /// Values are base64 encoded at rest and decoded on load
    Secret,
}

impl ConfigKind {
    fn resource(self) -> &'static str {
        match self {
            ConfigKind::ConfigMap => "configmap",
            ConfigKind::Secret => "secret",
        }
    }
}

/// Stores config scopes as ConfigMaps or Secrets through `kubectl`
#[derive(Clone)]
pub struct KubeConfigAdapter {
    kubectl: Kubectl,
    name: String,
    namespace: Option<String>,
    kind: ConfigKind,
}

impl KubeConfigAdapter {
    pub fn config_map(kubectl: Kubectl, name: impl Into<String>) -> Self {
        Self {
            kubectl,
            name: name.into(),
            namespace: None,
            kind: ConfigKind::ConfigMap,
        }
    }

    pub fn secret(kubectl: Kubectl, name: impl Into<String>) -> Self {
        Self {
            kind: ConfigKind::Secret,
            ..Self::config_map(kubectl, name)
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn kind(&self) -> ConfigKind {
        self.kind
    }

    /// Object name for a scope: `<name>` or `<name>.<scope>`
    pub fn object_name(&self, scope: Option<&str>) -> String {
        match scope {
            Some(scope) => format!("{}.{}", self.name, scope),
            None => self.name.clone(),
        }
    }

    fn with_namespace(&self, command: ShellCommand) -> ShellCommand {
        match &self.namespace {
            Some(namespace) => command.arg(format!("-n={}", namespace)),
            None => command,
        }
    }

    /// Fetch the object, creating it empty when missing
    async fn ensure_object(&self, name: &str) -> Result<Value, KubeError> {
        if let Some(namespace) = &self.namespace {
            self.kubectl.ensure_namespace(namespace).await?;
        }

        let resource = self.kind.resource();
        let namespace = self.namespace.as_deref();
        if let Some(object) = self.kubectl.get_json(resource, name, namespace).await? {
            return Ok(object);
        }

        debug!(resource, name, "creating config object");
        let create = match self.kind {
            ConfigKind::ConfigMap => ShellCommand::new("kubectl").args(["create", "configmap", name]),
            ConfigKind::Secret => {
                ShellCommand::new("kubectl").args(["create", "secret", "generic", name])
            }
        };
        self.kubectl.runner().run(&self.with_namespace(create)).await?;

        self.kubectl
            .get_json(resource, name, namespace)
            .await?
            .ok_or_else(|| {
                CoreError::Adapter(format!("{} '{}' missing right after creation", resource, name)).into()
            })
    }

    fn decode(&self, object: &Value) -> Result<ConfigValues, KubeError> {
        let Some(data) = object["data"].as_object() else {
            return Ok(ConfigValues::new());
        };

        data.iter()
            .map(|(key, value)| {
                let raw = value.as_str().unwrap_or_default();
                let decoded = match self.kind {
                    ConfigKind::ConfigMap => raw.to_string(),
                    ConfigKind::Secret => {
                        let bytes = BASE64.decode(raw).map_err(|e| CoreError::InvalidValue {
                            key: key.clone(),
                            message: e.to_string(),
                        })?;
                        String::from_utf8(bytes).map_err(|e| CoreError::InvalidValue {
                            key: key.clone(),
                            message: e.to_string(),
                        })?
                    }
                };
                Ok((key.clone(), decoded))
            })
            .collect()
    }

    /// Merge patch replacing the stored values with `values`
    ///
    /// Keys stored but absent from `values` are removed with explicit nulls.
    fn replacement_patch(&self, current: &Value, values: &ConfigValues) -> Value {
        let removed: Map<String, Value> = current["data"]
            .as_object()
            .into_iter()
            .flat_map(|data| data.keys())
            .filter(|key| !values.contains_key(*key))
            .map(|key| (key.clone(), Value::Null))
            .collect();

        match self.kind {
            ConfigKind::ConfigMap => {
                let mut data = removed;
                for (key, value) in values {
                    data.insert(key.clone(), Value::String(value.clone()));
                }
                json!({ "data": data })
            }
            ConfigKind::Secret if removed.is_empty() => json!({ "stringData": values }),
            ConfigKind::Secret => json!({ "stringData": values, "data": removed }),
        }
    }

    async fn load_values(&self, scope: Option<&str>) -> Result<ConfigValues, KubeError> {
        let object = self.ensure_object(&self.object_name(scope)).await?;
        self.decode(&object)
    }

    async fn save_values(&self, values: &ConfigValues, scope: Option<&str>) -> Result<(), KubeError> {
        let name = self.object_name(scope);
        let current = self.ensure_object(&name).await?;
        let patch = self.replacement_patch(&current, values);

        let command = ShellCommand::new("kubectl").args(["patch", self.kind.resource(), &name]);
        let command = self
            .with_namespace(command)
            .args(["--type", "merge", "-p"])
            .arg(patch.to_string());
        self.kubectl.runner().run(&command).await?;
        Ok(())
    }
}

/// Adapter errors surface through the core error type
fn into_core(err: KubeError) -> CoreError {
    match err {
        KubeError::Core(e) => e,
        other => CoreError::Adapter(other.to_string()),
    }
}

#[async_trait]
impl ConfigAdapter for KubeConfigAdapter {
    async fn load(&self, scope: Option<&str>) -> kstack_core::Result<ConfigValues> {
        self.load_values(scope).await.map_err(into_core)
    }

    async fn save(&self, values: &ConfigValues, scope: Option<&str>) -> kstack_core::Result<()> {
        self.save_values(values, scope).await.map_err(into_core)
    }
}
