//! Build command - synthesize one manifest per chart

use console::style;
use kstack_kube::ChartFilter;
use std::path::Path;

use crate::error::Result;
use crate::stacks::{self, ConfigSource};

/// Run the build command
pub async fn run(out_dir: &Path, filter: &ChartFilter) -> Result<()> {
    let app = stacks::load(out_dir, ConfigSource::Cluster).await?;

    println!(
        "{} Building charts into {}",
        style("→").blue().bold(),
        style(out_dir.display()).cyan()
    );

    let written = app.build(filter).await?;
    for path in &written {
        println!("  {} {}", style("✓").green(), path.display());
    }
    if written.is_empty() {
        println!("{} No charts match the selection", style("!").yellow());
    }

    Ok(())
}
