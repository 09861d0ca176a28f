//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{name} not defined in process env")]
    MissingEnv { name: String },

    #[error("{key} not found in config values")]
    MissingKey { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// An external command exited unsuccessfully; `stderr` is kept verbatim
    #[error("`{command}` failed: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Failure inside a config storage backend that is not about the values themselves
    #[error("Config storage failed: {0}")]
    Adapter(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Exit code of the external command behind this error, if any
    pub fn command_exit_code(&self) -> Option<i32> {
        match self {
            CoreError::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }

    /// Is this a configuration problem (missing env var, missing key, bad value)?
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CoreError::MissingEnv { .. }
                | CoreError::MissingKey { .. }
                | CoreError::InvalidValue { .. }
                | CoreError::InvalidConfig { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
