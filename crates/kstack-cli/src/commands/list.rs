//! List command - show the charts of the stack

use console::style;
use kstack_kube::{ChartFilter, ChartSummary};
use std::path::Path;

use crate::error::Result;
use crate::stacks::{self, ConfigSource};

/// Run the list command
pub async fn run(out_dir: &Path, filter: &ChartFilter, output_json: bool) -> Result<()> {
    let app = stacks::load(out_dir, ConfigSource::Empty).await?;
    let charts = app.list(filter);

    if output_json {
        let json = serde_json::to_string_pretty(&charts)?;
        println!("{}", json);
        return Ok(());
    }

    if charts.is_empty() {
        println!("No charts match the selection");
        return Ok(());
    }

    print_table(&charts);
    Ok(())
}

fn print_table(charts: &[ChartSummary]) {
    println!(
        "{:<20} {:<20} {:<20}",
        style("ID").bold(),
        style("TYPE").bold(),
        style("NAMESPACE").bold()
    );

    for chart in charts {
        println!(
            "{:<20} {:<20} {:<20}",
            style(&chart.id).cyan(),
            chart.type_name,
            style(&chart.namespace).yellow()
        );
    }
}
