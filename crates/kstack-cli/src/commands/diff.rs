//! Diff command - compare synthesized manifests with the cluster

use console::style;
use kstack_kube::ChartFilter;
use std::path::Path;

use crate::error::Result;
use crate::stacks::{self, ConfigSource};

/// Run the diff command
pub async fn run(out_dir: &Path, filter: &ChartFilter) -> Result<()> {
    let app = stacks::load(out_dir, ConfigSource::Cluster).await?;

    println!("{} Comparing charts with the cluster", style("→").blue().bold());
    app.diff(filter).await?;

    Ok(())
}
