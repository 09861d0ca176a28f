//! Config commands - read and replace scopes of the stack configuration

use console::style;
use kstack_core::{ConfigValue, ProcessRunner};
use kstack_kube::Kubectl;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CliError, Result};
use crate::stacks;

fn scope_label(scope: &str) -> &str {
    if scope.trim().is_empty() { "<root>" } else { scope }
}

/// Print the merged values of `scope` as JSON, or as `KEY=value` lines
pub async fn show(scope: &str, env_format: bool) -> Result<()> {
    let kubectl = Kubectl::new(Arc::new(ProcessRunner));
    let config = stacks::scoped(&stacks::root_config(&kubectl), scope);

    if env_format {
        print!("{}", config.to_env().await?);
    } else {
        let values = config.to_json().await?;
        println!("{}", serde_json::to_string_pretty(&values)?);
    }
    Ok(())
}

/// Replace the own values of `scope` with the JSON object in `file`
///
/// Non-string values are stored as JSON text.
pub async fn put(scope: &str, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file).map_err(|e| {
        CliError::input_with_help(
            format!("cannot read {}: {}", file.display(), e),
            "pass a JSON file holding one object of config values",
        )
    })?;
    let values: BTreeMap<String, ConfigValue> = serde_json::from_str(&content).map_err(|e| {
        CliError::input_with_help(
            format!("{} is not a JSON object: {}", file.display(), e),
            "expected e.g. {\"DATABASE_URL\": \"postgres://...\", \"FEATURES\": [\"a\"]}",
        )
    })?;

    let kubectl = Kubectl::new(Arc::new(ProcessRunner));
    let config = stacks::scoped(&stacks::root_config(&kubectl), scope);

    println!(
        "{} Writing {} key(s) to config scope {}",
        style("→").blue().bold(),
        values.len(),
        style(scope_label(scope)).cyan()
    );
    config.put_json(values).await?;
    println!("{} Saved", style("✓").green().bold());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_rejects_non_object_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("values.json");
        std::fs::write(&file, "[1, 2]").unwrap();

        let err = put("dev.app", &file).await.unwrap_err();
        assert_eq!(err.exit_code(), crate::exit_codes::USAGE_ERROR);
    }

    #[tokio::test]
    async fn test_put_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = put("dev.app", &dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }

    #[test]
    fn test_root_scope_label() {
        assert_eq!(scope_label(""), "<root>");
        assert_eq!(scope_label("dev"), "dev");
    }
}
