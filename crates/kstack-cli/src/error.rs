//! CLI error types with exit code handling
//!
//! Library errors are flattened into a [`CliError`] whose variant decides the process exit code.

use kstack_core::CoreError;
use kstack_kube::KubeError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Missing environment variable, config key or invalid setting
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(kstack::cli::config),
        help("required: KSTACK_DOMAIN, KSTACK_CERT_EMAIL, KSTACK_ENV, CLOUDFLARE_API_TOKEN, CLOUDFLARE_ZONE_ID")
    )]
    Config { message: String },

    /// An external tool (kubectl, helm, docker) exited unsuccessfully
    #[error("{message}")]
    #[diagnostic(code(kstack::cli::command))]
    Command { message: String, code: i32 },

    /// Bad command line input, e.g. an unreadable values file
    #[error("Invalid input: {message}")]
    #[diagnostic(code(kstack::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(kstack::cli::io))]
    Io { message: String },

    /// Anything else raised while building or deploying charts
    #[error("{message}")]
    #[diagnostic(code(kstack::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Command { code, .. } => *code,
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } | CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        let message = err.to_string();
        if let Some(code) = err.command_exit_code().filter(|c| *c != 0) {
            return CliError::Command { message, code };
        }
        if err.is_config() {
            return CliError::Config { message };
        }
        match err {
            KubeError::InvalidManifest(_) => CliError::Input {
                message,
                help: Some("check the manifests pulled in by Include and Helm charts".to_string()),
            },
            KubeError::Io(_) => CliError::Io { message },
            _ => CliError::Other { message },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        KubeError::from(err).into()
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Other {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
