//! A single Kubernetes object as a construct

use serde::Serialize;
use serde_json::Value;

use crate::chart::{Chart, Construct};
use crate::error::Result;
use crate::object::ApiObject;

/// One object owned by a chart
///
/// An object without `metadata.name` is named `chart.resolve(id)`.
#[derive(Debug, Clone)]
pub struct Resource {
    id: String,
    object: ApiObject,
}

impl Resource {
    pub fn new(chart: &Chart, id: impl Into<String>, mut object: ApiObject) -> Self {
        let id = id.into();
        if object.name().is_none() {
            object.set_name(chart.resolve(&id));
        }
        Self { id, object }
    }

    /// From a typed `k8s_openapi` resource
    pub fn typed<K>(chart: &Chart, id: impl Into<String>, resource: &K) -> Result<Self>
    where
        K: k8s_openapi::Resource + Serialize,
    {
        Ok(Self::new(chart, id, ApiObject::from_resource(resource)?))
    }

    /// From a raw JSON document
    pub fn raw(chart: &Chart, id: impl Into<String>, value: Value) -> Result<Self> {
        Ok(Self::new(chart, id, ApiObject::from_value(value)?))
    }

    pub fn name(&self) -> &str {
        self.object.name().unwrap_or_default()
    }

    pub fn object(&self) -> &ApiObject {
        &self.object
    }
}

impl Construct for Resource {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        self.object.kind()
    }

    fn api_objects(&self) -> Result<Vec<ApiObject>> {
        Ok(vec![self.object.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;
    use serde_json::json;

    #[test]
    fn test_default_name_from_chart() {
        let chart = Chart::new("web", "dev");
        let resource = Resource::typed(&chart, "svc", &Service::default()).unwrap();

        assert_eq!(resource.name(), "web-svc");
        assert_eq!(resource.type_name(), "Service");
    }

    #[test]
    fn test_explicit_name_is_kept() {
        let chart = Chart::new("web", "dev");
        let resource = Resource::raw(
            &chart,
            "issuer",
            json!({
                "apiVersion": "cert-manager.io/v1",
                "kind": "ClusterIssuer",
                "metadata": { "name": "letsencrypt" }
            }),
        )
        .unwrap();

        assert_eq!(resource.name(), "letsencrypt");
    }

    #[test]
    fn test_raw_rejects_invalid_documents() {
        let chart = Chart::new("web", "dev");
        assert!(Resource::raw(&chart, "bad", json!({ "metadata": {} })).is_err());
    }
}
