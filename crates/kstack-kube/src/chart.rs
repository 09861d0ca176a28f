//! Charts and the construct tree
//!
//! A [`Chart`] is a named unit deployed into one namespace. It owns a flat list of
//! [`Construct`]s, each of which may own children and a [`HookTable`]. Synthesis walks the
//! tree, collects every [`ApiObject`] and stamps the chart's labels and namespace on them.

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::info;

use crate::error::{KubeError, Result};
use crate::hooks::{HookClass, HookOptions, HookPhase, HookTable};
use crate::object::{ApiObject, to_yaml};

/// Label identifying every object of a chart
pub const SCOPE_LABEL: &str = "k8s.chart.scope";

/// A node of the construct tree
pub trait Construct: Send + Sync {
    fn id(&self) -> &str;

    /// Display name of the construct type
    fn type_name(&self) -> &str {
        "Construct"
    }

    /// Objects emitted by this construct itself, children excluded
    fn api_objects(&self) -> Result<Vec<ApiObject>> {
        Ok(Vec::new())
    }

    fn children(&self) -> &[Box<dyn Construct>] {
        &[]
    }

    fn hooks(&self) -> Option<&HookTable> {
        None
    }

    fn hook_class(&self) -> HookClass {
        HookClass::Regular
    }
}

/// Run `phase` over a construct subtree, children before their parent
pub fn run_tree_hooks<'a>(
    construct: &'a dyn Construct,
    phase: HookPhase,
    options: &'a HookOptions,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for child in construct.children() {
            run_tree_hooks(child.as_ref(), phase, options).await?;
        }
        if options.runs(construct.hook_class())
            && let Some(hooks) = construct.hooks()
        {
            hooks.run(construct.id(), phase).await?;
        }
        Ok(())
    })
}

/// Depth-first objects of a subtree, parent first
fn collect_objects(construct: &dyn Construct, out: &mut Vec<ApiObject>) -> Result<()> {
    out.extend(construct.api_objects()?);
    for child in construct.children() {
        collect_objects(child.as_ref(), out)?;
    }
    Ok(())
}

/// A named, namespaced group of constructs deployed together
pub struct Chart {
    id: String,
    namespace: String,
    type_name: String,
    labels: BTreeMap<String, String>,
    constructs: Vec<Box<dyn Construct>>,
    hooks: HookTable,
}

impl Chart {
    pub fn new(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        let id = id.into();
        let namespace = namespace.into();
        let mut labels = BTreeMap::new();
        labels.insert(SCOPE_LABEL.to_string(), format!("{}-{}", namespace, id));

        Self {
            id,
            namespace,
            type_name: "Chart".to_string(),
            labels,
            constructs: Vec::new(),
            hooks: HookTable::new(),
        }
    }

    /// Set the type name shown by `kstack list`
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Extra label applied to every object; the scope label cannot be replaced
    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key != SCOPE_LABEL {
            self.labels.insert(key, value.into());
        }
    }

    /// Label selector matching every object of this chart
    pub fn selector(&self) -> String {
        format!("{}={}-{}", SCOPE_LABEL, self.namespace, self.id)
    }

    /// Deterministic name for a resource of this chart
    pub fn resolve(&self, name: &str) -> String {
        format!("{}-{}", self.id, name)
    }

    /// Name of the apply-set tracking this chart's objects
    pub fn applyset(&self) -> String {
        format!("configmaps/{}-{}", self.namespace, self.id)
    }

    /// Attach a construct; ids are unique within the chart
    pub fn add(&mut self, construct: impl Construct + 'static) -> Result<()> {
        self.add_boxed(Box::new(construct))
    }

    pub fn add_boxed(&mut self, construct: Box<dyn Construct>) -> Result<()> {
        if self.constructs.iter().any(|c| c.id() == construct.id()) {
            return Err(KubeError::DuplicateConstruct {
                parent: self.id.clone(),
                id: construct.id().to_string(),
            });
        }
        self.constructs.push(construct);
        Ok(())
    }

    pub fn construct(&self, id: &str) -> Option<&dyn Construct> {
        self.constructs
            .iter()
            .find(|c| c.id() == id)
            .map(|c| c.as_ref())
    }

    pub fn constructs(&self) -> &[Box<dyn Construct>] {
        &self.constructs
    }

    /// Register a hook on the chart itself
    pub fn add_hook<F, Fut>(&mut self, phase: HookPhase, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.add(phase, callback);
    }

    /// Run `phase` on every nested construct, then on the chart
    pub async fn run_hook(&self, phase: HookPhase, options: &HookOptions) -> Result<()> {
        info!(chart = %self.id, %phase, "running hooks");
        run_tree_hooks(self, phase, options).await
    }

    /// All objects of the chart with labels and namespace applied
    pub fn synth(&self) -> Result<Vec<ApiObject>> {
        let mut objects = Vec::new();
        for construct in &self.constructs {
            collect_objects(construct.as_ref(), &mut objects)?;
        }

        for object in &mut objects {
            for (key, value) in &self.labels {
                object.insert_label(key, value);
            }
            if !object.is_cluster_scoped() && object.namespace().is_none() {
                object.set_namespace(&self.namespace);
            }
        }
        Ok(objects)
    }

    /// Multi-document YAML of [`synth`](Self::synth)
    pub fn synth_yaml(&self) -> Result<String> {
        to_yaml(&self.synth()?)
    }
}

impl Construct for Chart {
    fn id(&self) -> &str {
        &self.id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn children(&self) -> &[Box<dyn Construct>] {
        &self.constructs
    }

    fn hooks(&self) -> Option<&HookTable> {
        Some(&self.hooks)
    }
}

impl std::fmt::Debug for Chart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.constructs.iter().map(|c| c.id()).collect();
        f.debug_struct("Chart")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("constructs", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Construct with a logging hook for every phase and optional children
    struct Node {
        id: String,
        class: HookClass,
        hooks: HookTable,
        children: Vec<Box<dyn Construct>>,
        objects: Vec<ApiObject>,
    }

    impl Node {
        fn new(id: &str, log: &Log) -> Self {
            let mut hooks = HookTable::new();
            for phase in HookPhase::ALL {
                let log = Arc::clone(log);
                let entry = format!("{}:{}", id, phase);
                hooks.add(phase, move || {
                    let log = Arc::clone(&log);
                    let entry = entry.clone();
                    async move {
                        log.lock().unwrap().push(entry);
                        Ok(())
                    }
                });
            }
            Self {
                id: id.to_string(),
                class: HookClass::Regular,
                hooks,
                children: Vec::new(),
                objects: Vec::new(),
            }
        }

        fn child(mut self, child: Node) -> Self {
            self.children.push(Box::new(child));
            self
        }

        fn object(mut self, value: serde_json::Value) -> Self {
            self.objects.push(ApiObject::from_value(value).unwrap());
            self
        }
    }

    impl Construct for Node {
        fn id(&self) -> &str {
            &self.id
        }

        fn api_objects(&self) -> Result<Vec<ApiObject>> {
            Ok(self.objects.clone())
        }

        fn children(&self) -> &[Box<dyn Construct>] {
            &self.children
        }

        fn hooks(&self) -> Option<&HookTable> {
            Some(&self.hooks)
        }

        fn hook_class(&self) -> HookClass {
            self.class
        }
    }

    fn logged_chart(log: &Log) -> Chart {
        let mut chart = Chart::new("web", "dev");
        chart
            .add(Node::new("a", log).child(Node::new("a1", log)))
            .unwrap();
        chart.add(Node::new("b", log)).unwrap();
        let chart_log = Arc::clone(log);
        chart.add_hook(HookPhase::PreDeploy, move || {
            let log = Arc::clone(&chart_log);
            async move {
                log.lock().unwrap().push("web:pre:deploy".to_string());
                Ok(())
            }
        });
        chart
    }

    #[test]
    fn test_naming() {
        let chart = Chart::new("web", "dev");
        assert_eq!(chart.resolve("api"), "web-api");
        assert_eq!(chart.selector(), "k8s.chart.scope=dev-web");
        assert_eq!(chart.applyset(), "configmaps/dev-web");
        assert_eq!(chart.labels()[SCOPE_LABEL], "dev-web");
        assert_eq!(chart.type_name(), "Chart");
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let log = Log::default();
        let mut chart = Chart::new("web", "dev");
        chart.add(Node::new("a", &log)).unwrap();

        let err = chart.add(Node::new("a", &log)).unwrap_err();
        assert!(matches!(err, KubeError::DuplicateConstruct { ref id, .. } if id == "a"));
    }

    #[tokio::test]
    async fn test_hooks_run_children_before_self() {
        let log = Log::default();
        let chart = logged_chart(&log);

        chart
            .run_hook(HookPhase::PreDeploy, &HookOptions::default())
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a1:pre:deploy", "a:pre:deploy", "b:pre:deploy", "web:pre:deploy"]
        );
    }

    #[tokio::test]
    async fn test_image_build_constructs_can_be_skipped() {
        let log = Log::default();
        let mut chart = Chart::new("web", "dev");
        let mut image = Node::new("image", &log);
        image.class = HookClass::ImageBuild;
        chart.add(image).unwrap();
        chart.add(Node::new("app", &log)).unwrap();

        let options = HookOptions {
            skip_image_builds: true,
        };
        chart.run_hook(HookPhase::PreDeploy, &options).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["app:pre:deploy"]);
    }

    #[test]
    fn test_synth_stamps_labels_and_namespace() {
        let log = Log::default();
        let mut chart = Chart::new("web", "dev");
        chart.add_label("team", "platform");
        chart
            .add(
                Node::new("a", &log)
                    .object(json!({ "apiVersion": "v1", "kind": "Service", "metadata": { "name": "svc" } }))
                    .object(json!({ "apiVersion": "v1", "kind": "Namespace", "metadata": { "name": "extra" } }))
                    .child(Node::new("a1", &log).object(json!({
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": { "name": "cm", "namespace": "other" }
                    }))),
            )
            .unwrap();

        let objects = chart.synth().unwrap();
        let names: Vec<_> = objects.iter().filter_map(ApiObject::name).collect();
        assert_eq!(names, vec!["svc", "extra", "cm"]);

        assert_eq!(objects[0].namespace(), Some("dev"));
        assert_eq!(objects[1].namespace(), None);
        assert_eq!(objects[2].namespace(), Some("other"));
        for object in &objects {
            assert_eq!(object.label(SCOPE_LABEL), Some("dev-web"));
            assert_eq!(object.label("team"), Some("platform"));
        }
    }
}
