//! Deploy command - build then apply each chart to the cluster

use console::style;
use kstack_kube::{ChartFilter, DeployOptions};
use std::path::Path;

use crate::error::Result;
use crate::stacks::{self, ConfigSource};

/// Run the deploy command
pub async fn run(out_dir: &Path, filter: &ChartFilter, options: DeployOptions) -> Result<()> {
    let app = stacks::load(out_dir, ConfigSource::Cluster).await?;
    let selected: Vec<String> = app
        .list(filter)
        .into_iter()
        .map(|chart| format!("{} ({})", chart.id, chart.namespace))
        .collect();

    println!(
        "{} Deploying {}",
        style("→").blue().bold(),
        style(selected.join(", ")).cyan()
    );
    if options.fresh {
        println!(
            "{} --fresh: chart namespaces are deleted before applying",
            style("⚠").yellow()
        );
    }
    if options.skip_image_builds {
        println!("  Image builds skipped");
    }

    app.deploy(filter, &options).await?;

    println!("{} Deployed", style("✓").green().bold());
    Ok(())
}
