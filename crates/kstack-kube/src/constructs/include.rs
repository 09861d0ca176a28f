//! Externally maintained manifests (CRD bundles and the like)

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::chart::Construct;
use crate::error::{KubeError, Result};
use crate::hooks::{HookPhase, HookTable};
use crate::object::{ApiObject, parse_documents};

/// Where the manifest text is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeSource {
    Url(String),
    File(PathBuf),
}

impl IncludeSource {
    /// `http(s)://` sources are fetched, anything else is a local path
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            IncludeSource::Url(source.to_string())
        } else {
            IncludeSource::File(PathBuf::from(source))
        }
    }

    async fn read(&self, client: &reqwest::Client) -> Result<String> {
        match self {
            IncludeSource::Url(url) => {
                let response = client.get(url).send().await?.error_for_status()?;
                Ok(response.text().await?)
            }
            IncludeSource::File(path) => Ok(tokio::fs::read_to_string(path).await?),
        }
    }
}

type Loaded = Arc<RwLock<Option<Vec<ApiObject>>>>;

/// Multi-document YAML loaded during `pre:build`
///
/// Nothing is fetched while charts are defined; the objects become available once the
/// construct's `pre:build` hook has run.
pub struct Include {
    id: String,
    source: IncludeSource,
    loaded: Loaded,
    hooks: HookTable,
}

impl Include {
    pub fn new(id: impl Into<String>, source: &str) -> Self {
        Self::with_client(id, source, reqwest::Client::new())
    }

    pub fn with_client(id: impl Into<String>, source: &str, client: reqwest::Client) -> Self {
        let id = id.into();
        let source = IncludeSource::parse(source);
        let loaded: Loaded = Arc::default();

        let mut hooks = HookTable::new();
        let hook_source = source.clone();
        let hook_loaded = Arc::clone(&loaded);
        hooks.add(HookPhase::PreBuild, move || {
            let source = hook_source.clone();
            let loaded = Arc::clone(&hook_loaded);
            let client = client.clone();
            async move { load_into(&source, &client, &loaded).await }
        });

        Self {
            id,
            source,
            loaded,
            hooks,
        }
    }

    pub fn source(&self) -> &IncludeSource {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

async fn load_into(source: &IncludeSource, client: &reqwest::Client, loaded: &Loaded) -> Result<()> {
    if loaded.read().unwrap_or_else(|e| e.into_inner()).is_some() {
        return Ok(());
    }
    info!(source = ?source, "loading included manifests");
    let objects = parse_documents(&source.read(client).await?)?;
    *loaded.write().unwrap_or_else(|e| e.into_inner()) = Some(objects);
    Ok(())
}

impl Construct for Include {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        "Include"
    }

    fn api_objects(&self) -> Result<Vec<ApiObject>> {
        self.loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| KubeError::NotLoaded {
                id: self.id.clone(),
            })
    }

    fn hooks(&self) -> Option<&HookTable> {
        Some(&self.hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Chart;
    use crate::hooks::HookOptions;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CRDS: &str = r#"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: gateways.gateway.networking.k8s.io
---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: httproutes.gateway.networking.k8s.io
"#;

    #[test]
    fn test_source_detection() {
        assert_eq!(
            IncludeSource::parse("https://example.com/crds.yaml"),
            IncludeSource::Url("https://example.com/crds.yaml".to_string())
        );
        assert_eq!(
            IncludeSource::parse("./crds.yaml"),
            IncludeSource::File(PathBuf::from("./crds.yaml"))
        );
    }

    #[test]
    fn test_objects_before_load_is_error() {
        let include = Include::new("crds", "./crds.yaml");
        assert!(!include.is_loaded());
        assert!(matches!(
            include.api_objects(),
            Err(KubeError::NotLoaded { ref id }) if id == "crds"
        ));
    }

    #[tokio::test]
    async fn test_pre_build_fetches_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/standard-install.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(CRDS))
            .expect(1)
            .mount(&server)
            .await;

        let mut chart = Chart::new("infra", "infra");
        chart
            .add(Include::new(
                "gateway-crds",
                &format!("{}/standard-install.yaml", server.uri()),
            ))
            .unwrap();

        chart
            .run_hook(HookPhase::PreBuild, &HookOptions::default())
            .await
            .unwrap();
        // a second build reuses the loaded objects
        chart
            .run_hook(HookPhase::PreBuild, &HookOptions::default())
            .await
            .unwrap();

        let objects = chart.synth().unwrap();
        assert_eq!(objects.len(), 2);
        assert!(objects.iter().all(|o| o.namespace().is_none()));
    }

    #[tokio::test]
    async fn test_http_error_fails_the_hook() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut chart = Chart::new("infra", "infra");
        chart
            .add(Include::new("crds", &format!("{}/missing.yaml", server.uri())))
            .unwrap();

        let err = chart
            .run_hook(HookPhase::PreBuild, &HookOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::HookFailed { ref construct, .. } if construct == "crds"));
    }

    #[tokio::test]
    async fn test_loads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("crds.yaml");
        std::fs::write(&file, CRDS).unwrap();

        let include = Include::new("crds", &file.display().to_string());
        include.hooks().unwrap().run("crds", HookPhase::PreBuild).await.unwrap();

        assert!(include.is_loaded());
        assert_eq!(include.api_objects().unwrap().len(), 2);
    }
}
