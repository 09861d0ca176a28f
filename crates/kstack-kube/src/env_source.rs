//! Exposing configuration to pods
//!
//! The merged values of a [`ScopedConfig`] are written into a ConfigMap or Secret owned by the
//! chart, and the returned `EnvFromSource` is dropped into a container spec.

use k8s_openapi::api::core::v1::{ConfigMap, EnvFromSource, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kstack_core::ScopedConfig;
use serde_json::json;

use crate::chart::Chart;
use crate::config_adapter::ConfigKind;
use crate::constructs::Resource;
use crate::error::Result;

/// Add a ConfigMap/Secret `<chart>-<id>` holding the merged config and reference it
pub async fn env_source(
    config: &ScopedConfig,
    chart: &mut Chart,
    id: &str,
    kind: ConfigKind,
) -> Result<EnvFromSource> {
    let values = config.to_json().await?;
    let metadata = ObjectMeta {
        name: Some(chart.resolve(id)),
        ..Default::default()
    };

    let (resource, reference) = match kind {
        ConfigKind::ConfigMap => {
            let config_map = ConfigMap {
                metadata,
                data: Some(values),
                ..Default::default()
            };
            (Resource::typed(chart, id, &config_map)?, "configMapRef")
        }
        ConfigKind::Secret => {
            let secret = Secret {
                metadata,
                string_data: Some(values),
                ..Default::default()
            };
            (Resource::typed(chart, id, &secret)?, "secretRef")
        }
    };

    let source = serde_json::from_value(json!({ reference: { "name": resource.name() } }))?;
    chart.add(resource)?;
    Ok(source)
}
