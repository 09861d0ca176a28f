//! kstack Core - cluster-independent building blocks
//!
//! This crate provides the foundational types used throughout kstack:
//! - `ScopedConfig`: Layered key/value configuration over pluggable adapters
//! - `Domain`: Hostname scoping for routes and certificates
//! - `DockerImage`: Image build/push definitions
//! - `CommandRunner`: The seam through which every external tool is invoked
//! - `StackEnv`: Required settings from the process environment

pub mod config;
pub mod domain;
pub mod env;
pub mod error;
pub mod exec;
pub mod image;

pub use config::{
    ConfigAdapter, ConfigValue, ConfigValues, FileConfigAdapter, MemoryConfigAdapter, ScopedConfig,
};
pub use domain::Domain;
pub use env::StackEnv;
pub use error::{CoreError, Result};
pub use exec::{CommandOutput, CommandRunner, MockRunner, ProcessRunner, ShellCommand};
pub use image::{DockerImage, Platform};
