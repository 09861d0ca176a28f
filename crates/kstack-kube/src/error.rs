//! Error types for kstack-kube

use kstack_core::CoreError;
use thiserror::Error;

use crate::hooks::HookPhase;

/// Result type for kstack-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while building or operating on charts
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Configuration, process or IO failure from the core crate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Two siblings share an id
    #[error("construct '{id}' already exists in '{parent}'")]
    DuplicateConstruct { parent: String, id: String },

    /// A hook callback failed; remaining hooks of the phase were not run
    #[error("{phase} hook of '{construct}' failed: {source}")]
    HookFailed {
        construct: String,
        phase: HookPhase,
        #[source]
        source: Box<KubeError>,
    },

    /// Route refers to a listener the gateway does not declare
    #[error("{listener} is not a registered listener for {gateway}")]
    UnknownListener { gateway: String, listener: String },

    /// Lazily loaded construct used before its pre:build hook ran
    #[error("'{id}' has not been loaded yet (its pre:build hook has not run)")]
    NotLoaded { id: String },

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No `LoadBalancer` service in the namespace has an address yet
    #[error("no load balancer address in namespace '{namespace}'")]
    NoLoadBalancer { namespace: String },

    /// DNS provider rejected a request
    #[error("DNS provider error: {0}")]
    Dns(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Exit code of the external command at the root of this error, if any
    pub fn command_exit_code(&self) -> Option<i32> {
        match self {
            KubeError::Core(e) => e.command_exit_code(),
            KubeError::HookFailed { source, .. } => source.command_exit_code(),
            _ => None,
        }
    }

    /// Is this (or the error behind a failed hook) a configuration problem?
    pub fn is_config(&self) -> bool {
        match self {
            KubeError::Core(e) => e.is_config(),
            KubeError::HookFailed { source, .. } => source.is_config(),
            _ => false,
        }
    }
}
