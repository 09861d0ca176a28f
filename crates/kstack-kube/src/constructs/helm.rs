//! Helm charts rendered into the chart's manifest
//!
//! Rendering happens when the release is created so its objects can be inspected and patched
//! while the rest of the chart is being defined. Helm never talks to the cluster here: the
//! rendered objects are applied with everything else.

use kstack_core::{CommandRunner, ShellCommand};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::chart::{Chart, Construct};
use crate::error::Result;
use crate::object::{ApiObject, parse_documents};

/// Where a Helm chart comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmChart {
    /// Chart name in the repo, or a local path / OCI reference
    pub chart: String,
    pub repo: Option<String>,
    pub version: Option<String>,
    pub include_crds: bool,
}

impl HelmChart {
    pub fn new(chart: impl Into<String>) -> Self {
        Self {
            chart: chart.into(),
            repo: None,
            version: None,
            include_crds: false,
        }
    }

    pub fn repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn include_crds(mut self) -> Self {
        self.include_crds = true;
        self
    }

    /// Traefik ingress/gateway controller
    pub fn traefik() -> Self {
        Self::new("traefik")
            .repo("https://traefik.github.io/charts")
            .version("35.1.0")
            .include_crds()
    }

    /// cert-manager with its CRDs
    pub fn cert_manager() -> Self {
        Self::new("cert-manager")
            .repo("https://charts.jetstack.io")
            .version("v1.17.2")
    }

    /// `helm template` invocation; values are passed on stdin
    pub fn template_command(&self, release: &str, namespace: &str, values: &Value) -> ShellCommand {
        let mut cmd = ShellCommand::new("helm").args(["template", release, &self.chart]);
        if let Some(repo) = &self.repo {
            cmd = cmd.arg("--repo").arg(repo);
        }
        if let Some(version) = &self.version {
            cmd = cmd.arg("--version").arg(version);
        }
        if self.include_crds {
            cmd = cmd.arg("--include-crds");
        }
        cmd.args(["--namespace", namespace, "--values", "-"])
            .stdin(values.to_string())
    }
}

/// A rendered Helm release
///
/// The release is named after the chart id and installed into the chart namespace.
#[derive(Debug, Clone)]
pub struct HelmRelease {
    id: String,
    chart: HelmChart,
    objects: Vec<ApiObject>,
}

impl HelmRelease {
    pub async fn render(
        parent: &Chart,
        id: impl Into<String>,
        chart: HelmChart,
        values: Value,
        runner: &dyn CommandRunner,
    ) -> Result<Self> {
        let id = id.into();
        let release = parent.id();
        info!(release, chart = %chart.chart, "rendering helm chart");

        let output = runner
            .run(&chart.template_command(release, parent.namespace(), &values))
            .await?;
        let objects = parse_documents(&output.stdout)?;

        Ok(Self { id, chart, objects })
    }

    pub fn chart(&self) -> &HelmChart {
        &self.chart
    }

    pub fn objects(&self) -> &[ApiObject] {
        &self.objects
    }

    /// First rendered object matching `predicate`
    pub fn find_resource<P>(&self, predicate: P) -> Option<&ApiObject>
    where
        P: Fn(&ApiObject) -> bool,
    {
        self.objects.iter().find(|o| predicate(o))
    }

    /// Like [`find_resource`](Self::find_resource), for patching the rendered object
    pub fn find_resource_mut<P>(&mut self, predicate: P) -> Option<&mut ApiObject>
    where
        P: Fn(&ApiObject) -> bool,
    {
        self.objects.iter_mut().find(|o| predicate(o))
    }

    /// First object of type `K` matching `predicate`, deserialized
    pub fn find_typed<K, P>(&self, predicate: P) -> Result<Option<K>>
    where
        K: k8s_openapi::Resource + DeserializeOwned,
        P: Fn(&ApiObject) -> bool,
    {
        self.find_resource(|o| o.kind() == K::KIND && o.api_version() == K::API_VERSION && predicate(o))
            .map(ApiObject::parse)
            .transpose()
    }
}

impl Construct for HelmRelease {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        "HelmRelease"
    }

    fn api_objects(&self) -> Result<Vec<ApiObject>> {
        Ok(self.objects.clone())
    }
}
