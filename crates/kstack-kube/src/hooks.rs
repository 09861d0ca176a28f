//! Lifecycle hooks
//!
//! Every construct may own a [`HookTable`]: callbacks registered per [`HookPhase`] and run in
//! registration order when the chart goes through that phase. Phases are a closed set, one
//! `pre`/`post` pair per [`Operation`].

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use tracing::debug;

use crate::error::{KubeError, Result};

/// Chart operation driven by the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Build,
    Deploy,
    Diff,
    Delete,
}

impl Operation {
    pub fn pre(self) -> HookPhase {
        match self {
            Operation::Build => HookPhase::PreBuild,
            Operation::Deploy => HookPhase::PreDeploy,
            Operation::Diff => HookPhase::PreDiff,
            Operation::Delete => HookPhase::PreDelete,
        }
    }

    pub fn post(self) -> HookPhase {
        match self {
            Operation::Build => HookPhase::PostBuild,
            Operation::Deploy => HookPhase::PostDeploy,
            Operation::Diff => HookPhase::PostDiff,
            Operation::Delete => HookPhase::PostDelete,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Build => "build",
            Operation::Deploy => "deploy",
            Operation::Diff => "diff",
            Operation::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

/// Hook execution phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPhase {
    /// Before the chart is synthesized to disk
    PreBuild,
    /// After the manifest file was written
    PostBuild,
    /// After build, before anything reaches the cluster
    PreDeploy,
    /// After the manifest was applied
    PostDeploy,
    PreDiff,
    PostDiff,
    /// Before the chart namespace is deleted
    PreDelete,
    /// After the chart namespace is gone
    PostDelete,
}

impl HookPhase {
    pub const ALL: [HookPhase; 8] = [
        HookPhase::PreBuild,
        HookPhase::PostBuild,
        HookPhase::PreDeploy,
        HookPhase::PostDeploy,
        HookPhase::PreDiff,
        HookPhase::PostDiff,
        HookPhase::PreDelete,
        HookPhase::PostDelete,
    ];

    /// Is this a "pre" phase (before the operation)?
    pub fn is_pre(&self) -> bool {
        matches!(
            self,
            HookPhase::PreBuild | HookPhase::PreDeploy | HookPhase::PreDiff | HookPhase::PreDelete
        )
    }

    pub fn operation(&self) -> Operation {
        match self {
            HookPhase::PreBuild | HookPhase::PostBuild => Operation::Build,
            HookPhase::PreDeploy | HookPhase::PostDeploy => Operation::Deploy,
            HookPhase::PreDiff | HookPhase::PostDiff => Operation::Diff,
            HookPhase::PreDelete | HookPhase::PostDelete => Operation::Delete,
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = if self.is_pre() { "pre" } else { "post" };
        write!(f, "{}:{}", when, self.operation())
    }
}

impl FromStr for HookPhase {
    type Err = KubeError;

    fn from_str(s: &str) -> Result<Self> {
        HookPhase::ALL
            .into_iter()
            .find(|phase| phase.to_string() == s)
            .ok_or_else(|| KubeError::InvalidManifest(format!("unknown hook phase '{}'", s)))
    }
}

/// How a construct's hooks are treated by option flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookClass {
    #[default]
    Regular,
    /// Builds and pushes container images; skipped with `--skip-image-builds`
    ImageBuild,
}

/// Options applied while running hooks across a construct tree
#[derive(Debug, Clone, Copy, Default)]
pub struct HookOptions {
    pub skip_image_builds: bool,
}

impl HookOptions {
    pub fn runs(&self, class: HookClass) -> bool {
        !(self.skip_image_builds && class == HookClass::ImageBuild)
    }
}

type HookCallback = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Per-construct registry of lifecycle callbacks
#[derive(Default)]
pub struct HookTable {
    hooks: BTreeMap<HookPhase, Vec<HookCallback>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback to `phase`
    pub fn add<F, Fut>(&mut self, phase: HookPhase, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks
            .entry(phase)
            .or_default()
            .push(Box::new(move || Box::pin(callback())));
    }

    /// Number of callbacks registered for `phase`
    pub fn len(&self, phase: HookPhase) -> usize {
        self.hooks.get(&phase).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.values().all(Vec::is_empty)
    }

    /// Run the callbacks of `phase` one after another
    ///
    /// The first failure stops the phase and is reported against `owner`.
    pub async fn run(&self, owner: &str, phase: HookPhase) -> Result<()> {
        let Some(callbacks) = self.hooks.get(&phase) else {
            return Ok(());
        };

        for (index, callback) in callbacks.iter().enumerate() {
            debug!(construct = owner, %phase, index, "running hook");
            callback().await.map_err(|e| KubeError::HookFailed {
                construct: owner.to_string(),
                phase,
                source: Box::new(e),
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<String, usize> = self
            .hooks
            .iter()
            .map(|(phase, callbacks)| (phase.to_string(), callbacks.len()))
            .collect();
        f.debug_struct("HookTable").field("hooks", &counts).finish()
    }
}
