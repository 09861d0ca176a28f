//! Delete command - remove chart namespaces from the cluster

use console::style;
use kstack_kube::ChartFilter;
use std::path::Path;

use crate::error::Result;
use crate::stacks::{self, ConfigSource};

/// Run the delete command
pub async fn run(out_dir: &Path, filter: &ChartFilter) -> Result<()> {
    let app = stacks::load(out_dir, ConfigSource::Empty).await?;

    for chart in app.list(filter) {
        println!(
            "{} Deleting chart {} (namespace {})",
            style("→").blue().bold(),
            style(&chart.id).cyan(),
            style(&chart.namespace).yellow()
        );
    }
    app.delete(filter).await?;

    println!("{} Deleted", style("✓").green().bold());
    Ok(())
}
