//! The stack managed by `kstack`
//!
//! Two charts are declared:
//! - `infra`: Gateway API CRDs, cert-manager and a Let's Encrypt `ClusterIssuer` solving DNS01
//!   challenges through Cloudflare
//! - `env`: one environment (namespace `KSTACK_ENV`) with Traefik as gateway controller, a
//!   wildcard certificate, the gateway and its routes, and the application itself. The Traefik
//!   dashboard and metrics are served on `traefik.<env domain>` behind basic auth.
//!
//! The application's environment comes from the stack configuration Secret, scope
//! `<env>.app`. DNS records for the environment follow the gateway's load balancer.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Secret, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kstack_core::{
    DockerImage, Domain, MemoryConfigAdapter, Platform, ProcessRunner, ScopedConfig, StackEnv,
};
use kstack_kube::constructs::{
    BackendRef, ExtensionRef, Gateway, GatewayClassSource, HelmChart, HelmRelease, ImageBuild,
    Include, Listener, RequestRedirect, Resource, RouteOptions,
};
use kstack_kube::{
    App, Chart, CloudflareClient, ConfigKind, DnsRecord, HookPhase, KubeConfigAdapter, KubeError,
    Kubectl, TrialConfig, env_source, run_with_trials,
};
use serde_json::json;
use tracing::{debug, info};

use crate::error::Result;

pub const INFRA_CHART: &str = "infra";
pub const ENV_CHART: &str = "env";

/// Namespace of the stack configuration Secret
pub const CONFIG_NAMESPACE: &str = "kstack";
/// Name of the stack configuration Secret; scopes are stored as `kstack-config.<scope>`
pub const CONFIG_NAME: &str = "kstack-config";

const GATEWAY_API_CRDS: &str =
    "https://github.com/kubernetes-sigs/gateway-api/releases/download/v1.2.1/standard-install.yaml";
const ACME_SERVER: &str = "https://acme-v02.api.letsencrypt.org/directory";
const GATEWAY_CONTROLLER: &str = "traefik.io/gateway-controller";

const APP_IMAGE: &str = "ghcr.io/kstack-dev/app";
const APP_CONTEXT: &str = "app";
const APP_PORT: u16 = 8080;

/// Config scope under the environment holding settings of the internal routes; a sibling of
/// `app` so none of it reaches the application's environment
pub const INTERNAL_SCOPE: &str = "internal";
/// htpasswd lines of the users allowed on internal routes
pub const INTERNAL_USERS_KEY: &str = "USERS";

/// Cloud load balancers usually get an address within a couple of minutes
const LOAD_BALANCER_TRIES: u32 = 30;
const LOAD_BALANCER_DELAY: Duration = Duration::from_secs(10);

/// Where chart definitions read configuration from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// The configuration Secret in the cluster
    Cluster,
    /// Nothing; for commands that never synthesize manifests
    Empty,
}

/// Everything the chart definitions depend on
pub struct StackContext {
    pub env: StackEnv,
    pub kubectl: Kubectl,
    pub config: Arc<ScopedConfig>,
    pub cloudflare: CloudflareClient,
    /// How long the post:deploy DNS hook waits for the gateway's load balancer address
    pub load_balancer_wait: TrialConfig,
}

impl StackContext {
    pub fn new(env: StackEnv, kubectl: Kubectl, config: Arc<ScopedConfig>) -> Self {
        let cloudflare =
            CloudflareClient::new(&env.cloudflare_api_token, &env.cloudflare_zone_id);
        Self {
            env,
            kubectl,
            config,
            cloudflare,
            load_balancer_wait: TrialConfig::new(LOAD_BALANCER_TRIES, LOAD_BALANCER_DELAY),
        }
    }
}

/// Root of the stack configuration stored in the cluster
pub fn root_config(kubectl: &Kubectl) -> Arc<ScopedConfig> {
    ScopedConfig::of(
        KubeConfigAdapter::secret(kubectl.clone(), CONFIG_NAME).in_namespace(CONFIG_NAMESPACE),
    )
}

/// The config scope at dotted `path` under `root`; an empty path is the root itself
pub fn scoped(root: &Arc<ScopedConfig>, path: &str) -> Arc<ScopedConfig> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .fold(Arc::clone(root), |config, segment| config.scope(segment))
}

/// Read the environment, define every chart and register them in an [`App`]
pub async fn load(out_dir: &Path, source: ConfigSource) -> Result<App> {
    let env = StackEnv::from_env()?;
    let kubectl = Kubectl::new(Arc::new(ProcessRunner));
    let config = match source {
        ConfigSource::Cluster => root_config(&kubectl),
        ConfigSource::Empty => ScopedConfig::of(MemoryConfigAdapter::new()),
    };

    let ctx = StackContext::new(env, kubectl.clone(), config);
    let mut app = App::new(kubectl, out_dir);
    for chart in define(&ctx).await? {
        app.add(chart)?;
    }
    Ok(app)
}

/// All charts of the stack, in deploy order
pub async fn define(ctx: &StackContext) -> Result<Vec<Chart>> {
    let infra = infra_chart(ctx).await?;
    let issuer = infra.resolve("cluster-issuer");
    let env = environment_chart(ctx, &issuer).await?;
    Ok(vec![infra, env])
}

async fn infra_chart(ctx: &StackContext) -> Result<Chart> {
    let mut chart = Chart::new(INFRA_CHART, INFRA_CHART).with_type_name("InfraChart");

    chart.add(Include::new("crd-gateway-api", GATEWAY_API_CRDS))?;

    let values = json!({
        "crds": { "enabled": true },
        "global": { "leaderElection": { "namespace": chart.namespace() } },
        "dns01RecursiveNameserversOnly": true,
        "dns01RecursiveNameservers": "1.1.1.1:53,9.9.9.9:53",
        "podDnsPolicy": "None",
        "podDnsConfig": { "nameservers": ["1.1.1.1", "9.9.9.9"] },
    });
    let cert_manager = HelmRelease::render(
        &chart,
        "cert-manager",
        HelmChart::cert_manager(),
        values,
        ctx.kubectl.runner().as_ref(),
    )
    .await?;
    chart.add(cert_manager)?;

    let token = Secret {
        string_data: Some(BTreeMap::from([(
            "apiToken".to_string(),
            ctx.env.cloudflare_api_token.clone(),
        )])),
        ..Default::default()
    };
    let token = Resource::typed(&chart, "cloudflare-api-token", &token)?;
    let token_name = token.name().to_string();
    chart.add(token)?;

    let issuer = Resource::raw(
        &chart,
        "cluster-issuer",
        json!({
            "apiVersion": "cert-manager.io/v1",
            "kind": "ClusterIssuer",
            "spec": {
                "acme": {
                    "email": ctx.env.cert_email,
                    "server": ACME_SERVER,
                    "privateKeySecretRef": { "name": chart.resolve("cluster-issuer-key") },
                    "solvers": [{
                        "dns01": {
                            "cloudflare": {
                                "apiTokenSecretRef": { "name": token_name, "key": "apiToken" }
                            }
                        }
                    }]
                }
            }
        }),
    )?;
    chart.add(issuer)?;

    Ok(chart)
}

async fn environment_chart(ctx: &StackContext, issuer: &str) -> Result<Chart> {
    let environment = &ctx.env.environment;
    let domain = ctx.env.domain.scope(environment);

    let mut chart = Chart::new(ENV_CHART, environment).with_type_name("EnvironmentChart");
    chart.add_label("env", environment);

    let tls_secret = chart.resolve("certificate-secret");
    let certificate = Resource::raw(
        &chart,
        "certificate",
        json!({
            "apiVersion": "cert-manager.io/v1",
            "kind": "Certificate",
            "spec": {
                "secretName": tls_secret,
                "issuerRef": { "name": issuer, "kind": "ClusterIssuer" },
                "commonName": domain.common(),
                "dnsNames": hostnames(&domain),
            }
        }),
    )?;
    chart.add(certificate)?;

    let values = json!({
        "gateway": { "enabled": false },
        "providers": { "kubernetesGateway": { "enabled": true } },
    });
    let traefik = HelmRelease::render(
        &chart,
        "traefik",
        HelmChart::traefik(),
        values,
        ctx.kubectl.runner().as_ref(),
    )
    .await?;
    chart.add(traefik)?;

    // ports of Traefik's default web/websecure entrypoints
    let gateway = Gateway::new(
        &chart,
        "gateway",
        GatewayClassSource::Controller(GATEWAY_CONTROLLER.to_string()),
        vec![
            Listener::http("http", 8000),
            Listener::https("https", 8443, &tls_secret),
        ],
    )?;

    let app_service = add_app(ctx, &mut chart).await?;

    let auth = ExtensionRef::traefik_middleware(add_internal_auth(ctx, &mut chart).await?);
    let traefik_host = domain.sub("traefik");

    let routes = vec![
        gateway.route(
            &chart,
            "app-route",
            RouteOptions::new("https")
                .host(domain.base())
                .backend(BackendRef::service(app_service, APP_PORT)),
        )?,
        gateway.route(
            &chart,
            "http-redirect-route",
            RouteOptions::new("http").redirect(RequestRedirect::https()),
        )?,
        // internal routes, behind basic auth
        gateway.route(
            &chart,
            "traefik-dashboard-route",
            RouteOptions::new("https")
                .host(&traefik_host)
                .backend(BackendRef::traefik_service("api@internal"))
                .extension(auth.clone()),
        )?,
        gateway.route(
            &chart,
            "traefik-metrics-route",
            RouteOptions::new("https")
                .host(&traefik_host)
                .path("/metrics")
                .backend(BackendRef::traefik_service("prometheus@internal"))
                .extension(auth),
        )?,
    ];
    chart.add(gateway)?;
    for route in routes {
        chart.add(route)?;
    }

    add_dns_hooks(ctx, &mut chart, &domain);
    Ok(chart)
}

/// Base name plus, for wildcard domains, the `*.` name
fn hostnames(domain: &Domain) -> Vec<String> {
    let mut names = vec![domain.base().to_string()];
    let common = domain.common();
    if common != domain.base() {
        names.push(common);
    }
    names
}

/// Basic-auth Secret and Traefik Middleware guarding internal routes; returns the middleware name
///
/// Without configured users the middleware rejects every request.
async fn add_internal_auth(ctx: &StackContext, chart: &mut Chart) -> Result<String> {
    let users = ctx
        .config
        .scope(&ctx.env.environment)
        .scope(INTERNAL_SCOPE)
        .get(INTERNAL_USERS_KEY)
        .await?
        .map(|raw| htpasswd_lines(&raw))
        .unwrap_or_default();
    if users.is_empty() {
        debug!(key = INTERNAL_USERS_KEY, "no internal users configured");
    }

    let secret = Secret {
        string_data: Some(BTreeMap::from([("users".to_string(), users)])),
        ..Default::default()
    };
    let secret = Resource::typed(chart, "internal-basic-auth", &secret)?;
    let secret_name = secret.name().to_string();
    chart.add(secret)?;

    let middleware = Resource::raw(
        chart,
        "internal-basic-auth-middleware",
        json!({
            "apiVersion": "traefik.io/v1alpha1",
            "kind": "Middleware",
            "spec": {
                "basicAuth": { "secret": secret_name, "removeHeader": true }
            }
        }),
    )?;
    let name = middleware.name().to_string();
    chart.add(middleware)?;
    Ok(name)
}

/// Users are stored either as plain lines or, after `config put` of an array, as JSON text
fn htpasswd_lines(raw: &str) -> String {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(lines) => lines.join("\n"),
        Err(_) => raw.trim().to_string(),
    }
}

/// Image, config Secret, Deployment and Service of the application; returns the service name
async fn add_app(ctx: &StackContext, chart: &mut Chart) -> Result<String> {
    let image = DockerImage::new(APP_IMAGE, &ctx.env.image_tag, APP_CONTEXT)
        .platform(Platform::linux_amd64());
    let image = ImageBuild::new("app-image", image, Arc::clone(ctx.kubectl.runner()));
    let image_ref = image.name_tag();
    chart.add(image)?;

    let app_config = ctx.config.scope(&ctx.env.environment).scope("app");
    let env_from = env_source(&app_config, chart, "app-config", ConfigKind::Secret).await?;

    let name = chart.resolve("app");
    let labels = BTreeMap::from([("app".to_string(), name.clone())]);

    let deployment = Deployment {
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "app".to_string(),
                        image: Some(image_ref),
                        env_from: Some(vec![env_from]),
                        ports: Some(vec![ContainerPort {
                            container_port: i32::from(APP_PORT),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    let deployment = Resource::typed(chart, "app", &deployment)?;
    chart.add(deployment)?;

    let service = Service {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                port: i32::from(APP_PORT),
                target_port: Some(IntOrString::Int(i32::from(APP_PORT))),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let service = Resource::typed(chart, "app-service", &service)?;
    chart.add(service)?;

    Ok(name)
}

/// Point the environment's hostnames at the gateway after deploy, drop them after delete
fn add_dns_hooks(ctx: &StackContext, chart: &mut Chart, domain: &Domain) {
    let hosts = hostnames(domain);
    let namespace = chart.namespace().to_string();

    let kubectl = ctx.kubectl.clone();
    let cloudflare = ctx.cloudflare.clone();
    let wait = ctx.load_balancer_wait.clone();
    let upsert_hosts = hosts.clone();
    chart.add_hook(HookPhase::PostDeploy, move || {
        let kubectl = kubectl.clone();
        let cloudflare = cloudflare.clone();
        let wait = wait.clone();
        let hosts = upsert_hosts.clone();
        let namespace = namespace.clone();
        async move {
            let ip = run_with_trials(&wait, "load balancer address", |_| {
                let kubectl = kubectl.clone();
                let namespace = namespace.clone();
                async move {
                    let ip = kubectl.load_balancer_ip(&namespace).await?;
                    ip.ok_or(KubeError::NoLoadBalancer { namespace })
                }
            })
            .await?;
            for host in &hosts {
                let outcome = cloudflare.upsert_record(&DnsRecord::a(host, &ip)).await?;
                info!(host = %host, ip = %ip, ?outcome, "DNS record");
            }
            Ok(())
        }
    });

    let cloudflare = ctx.cloudflare.clone();
    chart.add_hook(HookPhase::PostDelete, move || {
        let cloudflare = cloudflare.clone();
        let hosts = hosts.clone();
        async move {
            for host in &hosts {
                cloudflare.delete_record(host, "A").await?;
            }
            Ok(())
        }
    });
}
