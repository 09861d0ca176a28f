//! Gateway API: GatewayClass, Gateway and HTTPRoute

use serde::Serialize;
use serde_json::{Value, json};

use crate::chart::{Chart, Construct};
use crate::error::{KubeError, Result};
use crate::object::ApiObject;

const GATEWAY_API_VERSION: &str = "gateway.networking.k8s.io/v1";

/// Which GatewayClass a gateway uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayClassSource {
    /// Emit a new class `<chart>-<id>-class` handled by this controller
    Controller(String),
    /// Reference a class installed elsewhere (e.g. by a Helm chart)
    Existing(String),
}

/// Which namespaces may attach routes to a listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum AllowedNamespaces {
    #[default]
    Same,
    All,
}

/// A Gateway listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub hostname: Option<String>,
    /// Secret holding the certificate for TLS termination
    pub certificate: Option<String>,
    pub allowed_namespaces: AllowedNamespaces,
}

impl Listener {
    pub fn http(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            protocol: "HTTP".to_string(),
            hostname: None,
            certificate: None,
            allowed_namespaces: AllowedNamespaces::Same,
        }
    }

    /// HTTPS listener terminating TLS with the certificate stored in `secret`
    pub fn https(name: impl Into<String>, port: u16, secret: impl Into<String>) -> Self {
        Self {
            protocol: "HTTPS".to_string(),
            certificate: Some(secret.into()),
            ..Self::http(name, port)
        }
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn allow_all_namespaces(mut self) -> Self {
        self.allowed_namespaces = AllowedNamespaces::All;
        self
    }

    fn to_json(&self) -> Value {
        let mut listener = json!({
            "name": self.name,
            "port": self.port,
            "protocol": self.protocol,
            "allowedRoutes": { "namespaces": { "from": self.allowed_namespaces } },
        });
        if let Some(hostname) = &self.hostname {
            listener["hostname"] = json!(hostname);
        }
        if let Some(secret) = &self.certificate {
            listener["tls"] = json!({
                "mode": "Terminate",
                "certificateRefs": [{ "kind": "Secret", "name": secret }],
            });
        }
        listener
    }
}

/// How a route's path is matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PathType {
    #[default]
    PathPrefix,
    Exact,
    RegularExpression,
}

/// Backend receiving a route's traffic; a core `Service` unless `kind` says otherwise
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl BackendRef {
    pub fn service(name: impl Into<String>, port: u16) -> Self {
        Self {
            group: None,
            kind: None,
            name: name.into(),
            port: Some(port),
            namespace: None,
        }
    }

    /// Traefik's own services, e.g. `api@internal` for the dashboard
    pub fn traefik_service(name: impl Into<String>) -> Self {
        Self {
            group: Some("traefik.io".to_string()),
            kind: Some("TraefikService".to_string()),
            name: name.into(),
            port: None,
            namespace: None,
        }
    }
}

/// `RequestRedirect` filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRedirect {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl RequestRedirect {
    /// Permanent redirect to https
    pub fn https() -> Self {
        Self {
            scheme: Some("https".to_string()),
            status_code: Some(301),
            ..Default::default()
        }
    }
}

/// `ExtensionRef` filter, e.g. a Traefik `Middleware`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionRef {
    pub group: String,
    pub kind: String,
    pub name: String,
}

impl ExtensionRef {
    pub fn traefik_middleware(name: impl Into<String>) -> Self {
        Self {
            group: "traefik.io".to_string(),
            kind: "Middleware".to_string(),
            name: name.into(),
        }
    }
}

/// Options of [`Gateway::route`]
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Listener (section) the route attaches to
    pub listener: String,
    pub host: Option<String>,
    pub path: Option<String>,
    pub path_type: PathType,
    pub backend: Option<BackendRef>,
    pub redirect: Option<RequestRedirect>,
    pub extension: Option<ExtensionRef>,
}

impl RouteOptions {
    pub fn new(listener: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            ..Default::default()
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn path_type(mut self, path_type: PathType) -> Self {
        self.path_type = path_type;
        self
    }

    pub fn backend(mut self, backend: BackendRef) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn redirect(mut self, redirect: RequestRedirect) -> Self {
        self.redirect = Some(redirect);
        self
    }

    pub fn extension(mut self, extension: ExtensionRef) -> Self {
        self.extension = Some(extension);
        self
    }
}

/// A Gateway plus, unless an existing class is used, its GatewayClass
#[derive(Debug, Clone)]
pub struct Gateway {
    id: String,
    name: String,
    class_name: String,
    listeners: Vec<Listener>,
    objects: Vec<ApiObject>,
}

impl Gateway {
    pub fn new(
        chart: &Chart,
        id: impl Into<String>,
        class: GatewayClassSource,
        listeners: Vec<Listener>,
    ) -> Result<Self> {
        let id = id.into();
        let name = chart.resolve(&id);
        let mut objects = Vec::new();

        let class_name = match class {
            GatewayClassSource::Existing(name) => name,
            GatewayClassSource::Controller(controller) => {
                let class_name = chart.resolve(&format!("{}-class", id));
                objects.push(ApiObject::from_value(json!({
                    "apiVersion": GATEWAY_API_VERSION,
                    "kind": "GatewayClass",
                    "metadata": { "name": class_name },
                    "spec": { "controllerName": controller },
                }))?);
                class_name
            }
        };

        let listener_json: Vec<Value> = listeners.iter().map(Listener::to_json).collect();
        objects.push(ApiObject::from_value(json!({
            "apiVersion": GATEWAY_API_VERSION,
            "kind": "Gateway",
            "metadata": { "name": name },
            "spec": {
                "gatewayClassName": class_name,
                "listeners": listener_json,
            },
        }))?);

        Ok(Self {
            id,
            name,
            class_name,
            listeners,
            objects,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    /// HTTPRoute attached to one of this gateway's listeners
    pub fn route(&self, chart: &Chart, id: impl Into<String>, options: RouteOptions) -> Result<HttpRoute> {
        if !self.listeners.iter().any(|l| l.name == options.listener) {
            return Err(KubeError::UnknownListener {
                gateway: self.name.clone(),
                listener: options.listener,
            });
        }

        let mut rule = serde_json::Map::new();
        if let Some(path) = &options.path {
            rule.insert(
                "matches".to_string(),
                json!([{ "path": { "type": options.path_type, "value": path } }]),
            );
        }

        let mut filters = Vec::new();
        if let Some(redirect) = &options.redirect {
            filters.push(json!({ "type": "RequestRedirect", "requestRedirect": redirect }));
        }
        if let Some(extension) = &options.extension {
            filters.push(json!({ "type": "ExtensionRef", "extensionRef": extension }));
        }
        if !filters.is_empty() {
            rule.insert("filters".to_string(), Value::Array(filters));
        }
        if let Some(backend) = &options.backend {
            rule.insert("backendRefs".to_string(), json!([backend]));
        }

        let id = id.into();
        let mut spec = json!({
            "parentRefs": [{ "name": self.name, "sectionName": options.listener }],
            "rules": [rule],
        });
        if let Some(host) = &options.host {
            spec["hostnames"] = json!([host]);
        }

        let object = ApiObject::from_value(json!({
            "apiVersion": GATEWAY_API_VERSION,
            "kind": "HTTPRoute",
            "metadata": { "name": chart.resolve(&id) },
            "spec": spec,
        }))?;
        Ok(HttpRoute { id, object })
    }
}

impl Construct for Gateway {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        "Gateway"
    }

    fn api_objects(&self) -> Result<Vec<ApiObject>> {
        Ok(self.objects.clone())
    }
}

/// A route created by [`Gateway::route`]
#[derive(Debug, Clone)]
pub struct HttpRoute {
    id: String,
    object: ApiObject,
}

impl HttpRoute {
    pub fn object(&self) -> &ApiObject {
        &self.object
    }
}

impl Construct for HttpRoute {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        "HTTPRoute"
    }

    fn api_objects(&self) -> Result<Vec<ApiObject>> {
        Ok(vec![self.object.clone()])
    }
}
