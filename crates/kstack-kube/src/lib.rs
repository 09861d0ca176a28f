//! kstack Kube - Kubernetes side of kstack
//!
//! This crate provides:
//! - **Construct tree**: `Chart`s owning constructs (raw objects, Helm releases, included
//!   manifests, Gateway API routes, image builds) synthesized into one manifest per chart
//! - **Hooks**: Per-construct `pre:`/`post:` callbacks for build, deploy, diff and delete
//! - **Lifecycle**: `App` drives `kubectl` apply-sets, diffs and namespace deletion with retries
//! - **Configuration**: ConfigMap/Secret storage for `ScopedConfig` and env-source export
//! - **DNS**: Cloudflare records for the stack's hostnames

pub mod app;
pub mod chart;
pub mod config_adapter;
pub mod constructs;
pub mod dns;
pub mod env_source;
pub mod error;
pub mod hooks;
pub mod kubectl;
pub mod object;
pub mod retry;

pub use app::{App, ChartFilter, ChartSummary, DEFAULT_OUT_DIR, DeployOptions};
pub use chart::{Chart, Construct, SCOPE_LABEL};
pub use config_adapter::{ConfigKind, KubeConfigAdapter};
pub use dns::{CloudflareClient, DnsRecord, UpsertOutcome};
pub use env_source::env_source;
pub use error::{KubeError, Result};
pub use hooks::{HookClass, HookOptions, HookPhase, HookTable, Operation};
pub use kubectl::Kubectl;
pub use object::ApiObject;
pub use retry::{TrialConfig, run_with_trials};
