//! kstack CLI - declare, build and deploy Kubernetes stacks

use clap::{Args, Parser, Subcommand};
use kstack_kube::{ChartFilter, DEFAULT_OUT_DIR, DeployOptions};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod exit_codes;
mod stacks;

use error::Result;

#[derive(Parser)]
#[command(name = "kstack")]
#[command(version)]
#[command(about = "Declare, build and deploy Kubernetes stacks", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Directory for synthesized manifests
    #[arg(long, global = true, env = "KSTACK_OUT_DIR", default_value = DEFAULT_OUT_DIR)]
    out_dir: PathBuf,
}

/// Chart selection shared by the lifecycle commands
#[derive(Args, Debug, Clone, Default)]
struct Selection {
    /// Only these chart ids (comma separated)
    #[arg(long, default_value = "")]
    include: String,

    /// Skip these chart ids (comma separated); wins over --include
    #[arg(long, default_value = "")]
    exclude: String,
}

impl Selection {
    fn filter(&self) -> ChartFilter {
        ChartFilter::parse(&self.include, &self.exclude)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the charts of the stack
    List {
        #[command(flatten)]
        selection: Selection,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Synthesize one manifest per chart into the output directory
    #[command(alias = "synth")]
    Build {
        #[command(flatten)]
        selection: Selection,
    },

    /// Build, then apply each chart to the cluster
    #[command(alias = "apply")]
    Deploy {
        #[command(flatten)]
        selection: Selection,

        /// Delete each chart's namespace before applying
        #[arg(long)]
        fresh: bool,

        /// Do not build or push container images
        #[arg(long)]
        skip_image_builds: bool,
    },

    /// Show what a deploy would change
    Diff {
        #[command(flatten)]
        selection: Selection,
    },

    /// Delete each chart's namespace
    Delete {
        #[command(flatten)]
        selection: Selection,
    },

    /// Read or replace the stack configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the merged values of a scope (dotted path, e.g. `dev.app`; root when omitted)
    Show {
        #[arg(default_value = "")]
        scope: String,

        /// Print `KEY=value` lines instead of JSON
        #[arg(long)]
        env: bool,
    },

    /// Replace the values of a scope with a JSON object read from a file
    Put {
        /// Dotted scope path; `""` for the root
        scope: String,

        /// JSON file holding the new values
        file: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let out_dir = cli.out_dir;

    match cli.command {
        Commands::List { selection, json } => {
            commands::list::run(&out_dir, &selection.filter(), json).await
        }

        Commands::Build { selection } => commands::build::run(&out_dir, &selection.filter()).await,

        Commands::Deploy {
            selection,
            fresh,
            skip_image_builds,
        } => {
            let options = DeployOptions {
                fresh,
                skip_image_builds,
            };
            commands::deploy::run(&out_dir, &selection.filter(), options).await
        }

        Commands::Diff { selection } => commands::diff::run(&out_dir, &selection.filter()).await,

        Commands::Delete { selection } => {
            commands::delete::run(&out_dir, &selection.filter()).await
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show { scope, env } => commands::config::show(&scope, env).await,
            ConfigCommands::Put { scope, file } => commands::config::put(&scope, &file).await,
        },
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
