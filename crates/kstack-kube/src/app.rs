//! Chart lifecycle: build, deploy, diff and delete
//!
//! Every command walks the selected charts in order. For each chart the `pre:` hooks run across
//! its construct tree, the external step runs (`kubectl` or a file write), then the `post:`
//! hooks. The first failure stops the command.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::chart::{Chart, Construct};
use crate::error::{KubeError, Result};
use crate::hooks::{HookOptions, Operation};
use crate::kubectl::Kubectl;
use crate::retry::{TrialConfig, run_with_trials};

/// Default directory for synthesized manifests
pub const DEFAULT_OUT_DIR: &str = ".kstack";

/// `--include` / `--exclude` chart selection
///
/// Exclusion wins; an empty include list selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl ChartFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// From comma separated id lists; empty items are ignored
    pub fn parse(include: &str, exclude: &str) -> Self {
        let split = |list: &str| {
            list.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect()
        };
        Self::new(split(include), split(exclude))
    }

    pub fn matches(&self, id: &str) -> bool {
        if self.exclude.iter().any(|e| e == id) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|i| i == id)
    }
}

/// Options for [`App::deploy`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    /// Delete the chart namespace before applying
    pub fresh: bool,
    /// Do not run image build hooks
    pub skip_image_builds: bool,
}

impl DeployOptions {
    fn hook_options(&self) -> HookOptions {
        HookOptions {
            skip_image_builds: self.skip_image_builds,
        }
    }
}

/// One row of `kstack list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub namespace: String,
}

/// The set of charts managed by the CLI
pub struct App {
    charts: Vec<Chart>,
    kubectl: Kubectl,
    out_dir: PathBuf,
    trials: TrialConfig,
}

impl App {
    pub fn new(kubectl: Kubectl, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            charts: Vec::new(),
            kubectl,
            out_dir: out_dir.into(),
            trials: TrialConfig::default(),
        }
    }

    pub fn with_trials(mut self, trials: TrialConfig) -> Self {
        self.trials = trials;
        self
    }

    /// Register a chart; ids are unique within the app
    pub fn add(&mut self, chart: Chart) -> Result<()> {
        if self.charts.iter().any(|c| c.id() == chart.id()) {
            return Err(KubeError::DuplicateConstruct {
                parent: "app".to_string(),
                id: chart.id().to_string(),
            });
        }
        self.charts.push(chart);
        Ok(())
    }

    pub fn charts(&self) -> &[Chart] {
        &self.charts
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Charts selected by `filter`, in registration order
    pub fn select(&self, filter: &ChartFilter) -> Vec<&Chart> {
        self.charts.iter().filter(|c| filter.matches(c.id())).collect()
    }

    pub fn list(&self, filter: &ChartFilter) -> Vec<ChartSummary> {
        self.select(filter)
            .into_iter()
            .map(|chart| ChartSummary {
                id: chart.id().to_string(),
                type_name: chart.type_name().to_string(),
                namespace: chart.namespace().to_string(),
            })
            .collect()
    }

    /// Path of the manifest written for `chart`
    pub fn artifact_path(&self, chart: &Chart) -> PathBuf {
        self.out_dir.join(format!("{}.yaml", chart.id()))
    }

    /// Write the manifest of every selected chart
    pub async fn build(&self, filter: &ChartFilter) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for chart in self.select(filter) {
            self.build_chart(chart, &HookOptions::default()).await?;
            written.push(self.artifact_path(chart));
        }
        Ok(written)
    }

    pub async fn deploy(&self, filter: &ChartFilter, options: &DeployOptions) -> Result<()> {
        for chart in self.select(filter) {
            self.deploy_chart(chart, options).await?;
        }
        Ok(())
    }

    pub async fn diff(&self, filter: &ChartFilter) -> Result<()> {
        for chart in self.select(filter) {
            self.diff_chart(chart).await?;
        }
        Ok(())
    }

    pub async fn delete(&self, filter: &ChartFilter) -> Result<()> {
        for chart in self.select(filter) {
            self.delete_chart(chart, &HookOptions::default()).await?;
        }
        Ok(())
    }

    async fn build_chart(&self, chart: &Chart, hooks: &HookOptions) -> Result<String> {
        let path = self.artifact_path(chart);
        info!(chart = %chart.id(), path = %path.display(), "building chart");

        tokio::fs::create_dir_all(&self.out_dir).await?;
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        chart.run_hook(Operation::Build.pre(), hooks).await?;
        let manifest = chart.synth_yaml()?;
        tokio::fs::write(&path, &manifest).await?;
        chart.run_hook(Operation::Build.post(), hooks).await?;
        Ok(manifest)
    }

    async fn deploy_chart(&self, chart: &Chart, options: &DeployOptions) -> Result<()> {
        let hooks = options.hook_options();
        let manifest = self.build_chart(chart, &hooks).await?;

        info!(chart = %chart.id(), namespace = %chart.namespace(), "deploying chart");
        chart.run_hook(Operation::Deploy.pre(), &hooks).await?;
        if options.fresh {
            self.delete_chart(chart, &hooks).await?;
        }

        self.kubectl.ensure_namespace(chart.namespace()).await?;
        let applyset = chart.applyset();
        let operation = format!("apply {}", chart.id());
        run_with_trials(&self.trials, &operation, |attempt| {
            if attempt > 1 {
                info!(chart = %chart.id(), attempt, "retrying apply");
            }
            self.kubectl.apply(chart.namespace(), &applyset, &manifest)
        })
        .await?;

        chart.run_hook(Operation::Deploy.post(), &hooks).await
    }

    async fn diff_chart(&self, chart: &Chart) -> Result<()> {
        let hooks = HookOptions::default();
        let manifest = self.build_chart(chart, &hooks).await?;

        info!(chart = %chart.id(), "diffing chart");
        chart.run_hook(Operation::Diff.pre(), &hooks).await?;
        self.kubectl.diff(chart.namespace(), &manifest).await?;
        chart.run_hook(Operation::Diff.post(), &hooks).await
    }

    async fn delete_chart(&self, chart: &Chart, hooks: &HookOptions) -> Result<()> {
        info!(chart = %chart.id(), namespace = %chart.namespace(), "deleting chart");
        chart.run_hook(Operation::Delete.pre(), hooks).await?;
        self.kubectl.delete_namespace(chart.namespace()).await?;
        chart.run_hook(Operation::Delete.post(), hooks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::Resource;
    use crate::hooks::HookPhase;
    use kstack_core::{CommandOutput, MockRunner};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn chart(id: &str) -> Chart {
        let mut chart = Chart::new(id, format!("ns-{}", id));
        let config = Resource::raw(
            &chart,
            "settings",
            json!({ "apiVersion": "v1", "kind": "ConfigMap", "data": { "A": "1" } }),
        )
        .unwrap();
        chart.add(config).unwrap();
        chart
    }

    fn app(runner: &MockRunner, dir: &Path, ids: &[&str]) -> App {
        let mut app = App::new(Kubectl::new(Arc::new(runner.clone())), dir);
        for id in ids {
            app.add(chart(id)).unwrap();
        }
        app
    }

    /// Tracks whether the namespace exists across get/create/delete
    fn namespace_runner() -> MockRunner {
        let exists = Arc::new(AtomicBool::new(true));
        MockRunner::with_handler(move |cmd| {
            if cmd.args_start_with(&["delete", "namespace"]) {
                exists.store(false, Ordering::SeqCst);
            } else if cmd.args_start_with(&["create", "namespace"]) {
                exists.store(true, Ordering::SeqCst);
            } else if cmd.args_start_with(&["get", "namespace"]) && !exists.load(Ordering::SeqCst) {
                return CommandOutput::failed(1, "NotFound");
            }
            CommandOutput::ok("")
        })
    }

    fn positions(lines: &[String], needle: &str) -> Vec<usize> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| *line == needle)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_filter() {
        let filter = ChartFilter::parse("a,b", "b");
        assert!(filter.matches("a"));
        assert!(!filter.matches("b"));
        assert!(!filter.matches("c"));

        let all = ChartFilter::parse("", ",");
        assert!(all.matches("anything"));
    }

    #[test]
    fn test_list_with_exclude() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&MockRunner::new(), dir.path(), &["a", "b", "c"]);

        let listed = app.list(&ChartFilter::parse("", "a,b"));
        assert_eq!(
            listed,
            vec![ChartSummary {
                id: "c".to_string(),
                type_name: "Chart".to_string(),
                namespace: "ns-c".to_string(),
            }]
        );
    }

    #[test]
    fn test_duplicate_chart_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(&MockRunner::new(), dir.path(), &["a"]);
        assert!(app.add(chart("a")).is_err());
    }

    #[tokio::test]
    async fn test_build_writes_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let runner = MockRunner::new();
        let app = app(&runner, &out, &["a", "b"]);
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("a.yaml"), "stale").unwrap();

        let written = app.build(&ChartFilter::parse("a", "")).await.unwrap();

        assert_eq!(written, vec![out.join("a.yaml")]);
        let manifest = std::fs::read_to_string(out.join("a.yaml")).unwrap();
        assert!(manifest.contains("name: a-settings"));
        assert!(manifest.contains("namespace: ns-a"));
        assert!(manifest.contains("k8s.chart.scope: ns-a-a"));
        assert!(!out.join("b.yaml").exists());
        // building never touches the cluster
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        let app = app(&runner, dir.path(), &["a"]);

        app.deploy(&ChartFilter::default(), &DeployOptions::default())
            .await
            .unwrap();

        assert_eq!(
            runner.call_lines(),
            vec![
                "kubectl get namespace ns-a",
                "KUBECTL_APPLYSET=true kubectl apply --prune -n=ns-a --applyset=configmaps/ns-a-a -f -",
            ]
        );
        let applied = runner.calls()[1].stdin.clone().unwrap();
        assert_eq!(applied, std::fs::read_to_string(dir.path().join("a.yaml")).unwrap());
    }

    #[tokio::test]
    async fn test_fresh_deploy_deletes_before_creating_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let runner = namespace_runner();
        let app = app(&runner, dir.path(), &["a"]);

        app.deploy(
            &ChartFilter::default(),
            &DeployOptions {
                fresh: true,
                skip_image_builds: false,
            },
        )
        .await
        .unwrap();

        let lines = runner.call_lines();
        let deletes = positions(&lines, "kubectl delete namespace ns-a --wait --ignore-not-found");
        let creates = positions(&lines, "kubectl create namespace ns-a");
        assert_eq!(deletes.len(), 1);
        assert_eq!(creates.len(), 1);
        assert!(deletes[0] < creates[0]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_apply_is_retried_once_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let applies = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&applies);
        let runner = MockRunner::with_handler(move |cmd| {
            if cmd.args_start_with(&["apply"]) && counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return CommandOutput::failed(1, "no matches for kind \"Gateway\"");
            }
            CommandOutput::ok("")
        });
        let app = app(&runner, dir.path(), &["a"]);
        let start = tokio::time::Instant::now();

        app.deploy(&ChartFilter::default(), &DeployOptions::default())
            .await
            .unwrap();

        assert_eq!(applies.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_apply_gives_up_after_three_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::with_handler(|cmd| {
            if cmd.args_start_with(&["apply"]) {
                CommandOutput::failed(1, "webhook unavailable")
            } else {
                CommandOutput::ok("")
            }
        });
        let app = app(&runner, dir.path(), &["a"]);

        let err = app
            .deploy(&ChartFilter::default(), &DeployOptions::default())
            .await
            .unwrap_err();

        assert_eq!(runner.count("kubectl", &["apply"]), 3);
        assert_eq!(err.command_exit_code(), Some(1));
        assert!(err.to_string().contains("webhook unavailable"));
    }

    #[tokio::test]
    async fn test_hooks_wrap_external_steps() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut chart = chart("a");
        for phase in HookPhase::ALL {
            let log = Arc::clone(&log);
            let runner = runner.clone();
            chart.add_hook(phase, move || {
                let log = Arc::clone(&log);
                let calls = runner.calls().len();
                async move {
                    log.lock().unwrap().push(format!("{} after {} commands", phase, calls));
                    Ok(())
                }
            });
        }
        let mut app = App::new(Kubectl::new(Arc::new(runner.clone())), dir.path());
        app.add(chart).unwrap();

        app.diff(&ChartFilter::default()).await.unwrap();
        app.delete(&ChartFilter::default()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "pre:build after 0 commands",
                "post:build after 0 commands",
                "pre:diff after 0 commands",
                "post:diff after 1 commands",
                "pre:delete after 1 commands",
                "post:delete after 2 commands",
            ]
        );
        assert_eq!(
            runner.call_lines(),
            vec![
                "kubectl diff --prune -n=ns-a -f -",
                "kubectl delete namespace ns-a --wait --ignore-not-found",
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_hook_stops_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockRunner::new();
        let mut failing = chart("a");
        failing.add_hook(HookPhase::PreDeploy, || async {
            Err(KubeError::InvalidManifest("bad".to_string()))
        });
        let mut app = App::new(Kubectl::new(Arc::new(runner.clone())), dir.path());
        app.add(failing).unwrap();
        app.add(chart("b")).unwrap();

        let err = app
            .deploy(&ChartFilter::default(), &DeployOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, KubeError::HookFailed { phase: HookPhase::PreDeploy, .. }));
        assert!(runner.calls().is_empty());
        assert!(!dir.path().join("b.yaml").exists());
    }
}
