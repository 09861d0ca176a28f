//! CLI commands

pub mod build;
pub mod config;
pub mod delete;
pub mod deploy;
pub mod diff;
pub mod list;
