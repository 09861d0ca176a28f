//! Thin wrapper over the `kubectl` CLI
//!
//! Reconciliation, pruning and diffing stay with `kubectl`; this module only builds the
//! invocations and interprets their output.

use kstack_core::{CommandOutput, CommandRunner, ShellCommand};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// `kubectl` invocations for one cluster context
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
}

impl Kubectl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    fn command() -> ShellCommand {
        ShellCommand::new("kubectl")
    }

    pub async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let output = self
            .runner
            .output(&Self::command().args(["get", "namespace", namespace]))
            .await?;
        Ok(output.success())
    }

    /// Create the namespace unless it already exists
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        if !self.namespace_exists(namespace).await? {
            info!(namespace, "creating namespace");
            self.runner
                .run(&Self::command().args(["create", "namespace", namespace]))
                .await?;
        }
        Ok(())
    }

    /// Delete the namespace and wait until everything in it is gone
    pub async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.runner
            .run(&Self::command().args([
                "delete",
                "namespace",
                namespace,
                "--wait",
                "--ignore-not-found",
            ]))
            .await?;
        Ok(())
    }

    /// Apply a manifest as an apply-set, pruning objects no longer present
    pub async fn apply(&self, namespace: &str, applyset: &str, manifest: &str) -> Result<()> {
        let command = Self::command()
            .env("KUBECTL_APPLYSET", "true")
            .args(["apply", "--prune"])
            .arg(format!("-n={}", namespace))
            .arg(format!("--applyset={}", applyset))
            .args(["-f", "-"])
            .stdin(manifest)
            .inherit_stdout();
        self.runner.run(&command).await?;
        Ok(())
    }

    /// Show what applying the manifest would change
    ///
    /// `kubectl diff` exits non-zero when differences exist, so any exit status is accepted.
    pub async fn diff(&self, namespace: &str, manifest: &str) -> Result<CommandOutput> {
        let command = Self::command()
            .args(["diff", "--prune"])
            .arg(format!("-n={}", namespace))
            .args(["-f", "-"])
            .stdin(manifest)
            .allow_failure()
            .inherit_stdout();
        Ok(self.runner.run(&command).await?)
    }

    /// Fetch one object as JSON; `None` when it does not exist
    pub async fn get_json(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Value>> {
        let mut command = Self::command().args(["get", kind, name]);
        if let Some(namespace) = namespace {
            command = command.arg(format!("-n={}", namespace));
        }
        let command = command.args(["-o", "json"]);

        let output = self.runner.output(&command).await?;
        if !output.success() && output.stderr.contains("NotFound") {
            return Ok(None);
        }
        let output = into_checked(command, output)?;
        Ok(Some(serde_json::from_str(&output.stdout)?))
    }

    /// First external IP of a `LoadBalancer` service in `namespace`
    pub async fn load_balancer_ip(&self, namespace: &str) -> Result<Option<String>> {
        let output = self
            .runner
            .run(
                &Self::command()
                    .args(["get", "services"])
                    .arg(format!("-n={}", namespace))
                    .args(["-o", "json"]),
            )
            .await?;
        let services: Value = serde_json::from_str(&output.stdout)?;

        let ip = services["items"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|svc| svc["spec"]["type"] == "LoadBalancer")
            .flat_map(|svc| {
                svc["status"]["loadBalancer"]["ingress"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
            })
            .find_map(|ingress| ingress["ip"].as_str().map(str::to_string));
        Ok(ip)
    }
}

fn into_checked(command: ShellCommand, output: CommandOutput) -> Result<CommandOutput> {
    if output.success() {
        return Ok(output);
    }
    Err(kstack_core::CoreError::CommandFailed {
        command: command.to_string(),
        code: output.code,
        stderr: output.stderr.trim_end().to_string(),
    }
    .into())
}
