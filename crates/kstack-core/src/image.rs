//! Docker image build definitions

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

use crate::error::Result;
use crate::exec::{CommandRunner, ShellCommand};

/// Target platform for a multi-platform build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform(String);

impl Platform {
    pub fn linux_amd64() -> Self {
        Self("linux/amd64".to_string())
    }

    pub fn linux_arm64() -> Self {
        Self("linux/arm64".to_string())
    }

    pub fn custom(platform: impl Into<String>) -> Self {
        Self(platform.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image built with `docker buildx` and pushed to a registry
#[derive(Debug, Clone)]
pub struct DockerImage {
    name: String,
    tag: String,
    context: PathBuf,
    file: Option<PathBuf>,
    target: Option<String>,
    platforms: Vec<Platform>,
    build_args: BTreeMap<String, String>,
    /// Additional `name -> tag` pairs applied to the same build
    extra_tags: BTreeMap<String, String>,
}

impl DockerImage {
    pub fn new(name: impl Into<String>, tag: impl Into<String>, context: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            context: context.into(),
            file: None,
            target: None,
            platforms: Vec::new(),
            build_args: BTreeMap::new(),
            extra_tags: BTreeMap::new(),
        }
    }

    pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platforms.push(platform);
        self
    }

    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    pub fn extra_tag(mut self, name: impl Into<String>, tag: impl Into<String>) -> Self {
        self.extra_tags.insert(name.into(), tag.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `name:tag`, as referenced from pod specs
    pub fn name_tag(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    pub fn build_command(&self) -> ShellCommand {
        let mut cmd = ShellCommand::new("docker").args(["buildx", "build"]);
        if let Some(file) = &self.file {
            cmd = cmd.arg("--file").arg(file.display().to_string());
        }
        if let Some(target) = &self.target {
            cmd = cmd.arg("--target").arg(target);
        }
        if !self.platforms.is_empty() {
            let platforms: Vec<&str> = self.platforms.iter().map(Platform::as_str).collect();
            cmd = cmd.arg("--platform").arg(platforms.join(","));
        }
        for (key, value) in &self.build_args {
            cmd = cmd.arg("--build-arg").arg(format!("{}={}", key, value));
        }

        let mut tags = self.extra_tags.clone();
        tags.insert(self.name.clone(), self.tag.clone());
        for (name, tag) in &tags {
            cmd = cmd.arg("--tag").arg(format!("{}:{}", name, tag));
        }

        cmd.arg(self.context.display().to_string()).inherit_stdout()
    }

    pub fn push_command(&self) -> ShellCommand {
        ShellCommand::new("docker")
            .args(["image", "push"])
            .arg(self.name_tag())
            .inherit_stdout()
    }

    pub async fn build(&self, runner: &dyn CommandRunner) -> Result<()> {
        info!(image = %self.name_tag(), "building image");
        runner.run(&self.build_command()).await?;
        Ok(())
    }

    pub async fn push(&self, runner: &dyn CommandRunner) -> Result<()> {
        info!(image = %self.name_tag(), "pushing image");
        runner.run(&self.push_command()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockRunner;

    #[test]
    fn test_minimal_build_command() {
        let image = DockerImage::new("acme/api", "latest", "./app");
        assert_eq!(
            image.build_command().to_string(),
            "docker buildx build --tag acme/api:latest ./app"
        );
    }

    #[test]
    fn test_full_build_command() {
        let image = DockerImage::new("acme/api", "1.2.0", "./app")
            .file("./app/Dockerfile.prod")
            .target("runtime")
            .platform(Platform::linux_amd64())
            .platform(Platform::linux_arm64())
            .build_arg("NODE_ENV", "production")
            .extra_tag("ghcr.io/acme/api", "1.2.0");

        assert_eq!(
            image.build_command().args,
            vec![
                "buildx",
                "build",
                "--file",
                "./app/Dockerfile.prod",
                "--target",
                "runtime",
                "--platform",
                "linux/amd64,linux/arm64",
                "--build-arg",
                "NODE_ENV=production",
                "--tag",
                "acme/api:1.2.0",
                "--tag",
                "ghcr.io/acme/api:1.2.0",
                "./app",
            ]
        );
    }

    #[tokio::test]
    async fn test_build_then_push() {
        let runner = MockRunner::new();
        let image = DockerImage::new("acme/api", "dev", ".");
        image.build(&runner).await.unwrap();
        image.push(&runner).await.unwrap();

        assert_eq!(
            runner.call_lines(),
            vec![
                "docker buildx build --tag acme/api:dev .",
                "docker image push acme/api:dev",
            ]
        );
    }
}
