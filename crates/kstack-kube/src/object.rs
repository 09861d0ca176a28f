//! Rendered Kubernetes documents

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{KubeError, Result};

/// Kinds that never carry a namespace
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterIssuer",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "GatewayClass",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// One Kubernetes object as it will be written to the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiObject(Value);

impl ApiObject {
    /// Wrap a JSON document; it must be an object with `apiVersion` and `kind`
    pub fn from_value(value: Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| KubeError::InvalidManifest("document is not an object".to_string()))?;
        for field in ["apiVersion", "kind"] {
            if !object.get(field).is_some_and(Value::is_string) {
                return Err(KubeError::InvalidManifest(format!(
                    "document is missing '{}'",
                    field
                )));
            }
        }
        match object.get("metadata") {
            None | Some(Value::Null) | Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(KubeError::InvalidManifest(format!(
                    "{} has a 'metadata' field that is not a mapping",
                    object["kind"].as_str().unwrap_or_default()
                )));
            }
        }
        Ok(Self(value))
    }

    /// Convert a typed `k8s_openapi` resource
    pub fn from_resource<K>(resource: &K) -> Result<Self>
    where
        K: k8s_openapi::Resource + Serialize,
    {
        Self::from_value(serde_json::to_value(resource)?)
    }

    /// Deserialize into a typed resource
    pub fn parse<K: DeserializeOwned>(&self) -> Result<K> {
        Ok(serde_json::from_value(self.0.clone())?)
    }

    pub fn api_version(&self) -> &str {
        self.0["apiVersion"].as_str().unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.0["kind"].as_str().unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.0["metadata"]["name"].as_str()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0["metadata"]["namespace"].as_str()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0["metadata"]["labels"][key].as_str()
    }

    pub fn is_cluster_scoped(&self) -> bool {
        CLUSTER_SCOPED_KINDS.contains(&self.kind())
    }

    /// `metadata` as a map, created when absent or null
    fn metadata_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let metadata = self
            .0
            .as_object_mut()?
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        metadata.as_object_mut()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert("name".to_string(), Value::String(name.into()));
        }
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        if let Some(metadata) = self.metadata_mut() {
            metadata.insert("namespace".to_string(), Value::String(namespace.into()));
        }
    }

    pub fn insert_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let Some(metadata) = self.metadata_mut() else {
            return;
        };
        let labels = metadata
            .entry("labels")
            .or_insert_with(|| Value::Object(Map::new()));
        if !labels.is_object() {
            *labels = Value::Object(Map::new());
        }
        if let Some(labels) = labels.as_object_mut() {
            labels.insert(key.into(), Value::String(value.into()));
        }
    }

    /// Mutable access to an arbitrary field, e.g. `spec`
    pub fn field_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Parse a multi-document YAML stream, skipping empty documents
pub fn parse_documents(text: &str) -> Result<Vec<ApiObject>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        // `kind: List` wrappers are flattened
        if value["kind"] == "List"
            && let Some(items) = value["items"].as_array()
        {
            for item in items {
                objects.push(ApiObject::from_value(item.clone())?);
            }
            continue;
        }
        objects.push(ApiObject::from_value(value)?);
    }
    Ok(objects)
}

/// Render objects as a multi-document YAML stream
pub fn to_yaml(objects: &[ApiObject]) -> Result<String> {
    let mut out = String::new();
    for (index, object) in objects.iter().enumerate() {
        if index > 0 {
            out.push_str("---\n");
        }
        out.push_str(&serde_yaml::to_string(object)?);
    }
    Ok(out)
}
