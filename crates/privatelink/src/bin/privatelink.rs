//! Privatelink CLI - synthesize and inspect the private-link topology.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use privatelink::{build_stack, Plan, PlanDiff, ResourceGraph, StackConfig};

/// Privatelink CLI - declare two networks bridged by a private endpoint service.
#[derive(Parser)]
#[command(name = "privatelink")]
#[command(about = "Synthesize the private-link network topology for a reconciler")]
struct Cli {
    /// Stack configuration file (YAML or JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Stack identifier.
    #[arg(long, global = true, default_value = "private-link")]
    stack_id: String,

    /// Deployment region (or set `STACK_REGION` env var).
    #[arg(long, global = true, env = "STACK_REGION")]
    region: Option<String>,

    /// Deployment account (or set `STACK_ACCOUNT` env var).
    #[arg(long, global = true, env = "STACK_ACCOUNT")]
    account: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the stack and emit its plan.
    Synth {
        /// Write `<stack-id>.plan.json` into this directory instead of printing.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Output format when printing.
        #[arg(long, value_enum, default_value = "json")]
        format: Format,
    },

    /// Build the stack and report whether it is structurally valid.
    Validate,

    /// Print the order in which resources must be created.
    Order,

    /// Compare the stack against a previously synthesized plan.
    Diff {
        /// Plan file to compare against.
        #[arg(long)]
        against: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<StackConfig> {
    let mut config = match &cli.config {
        Some(path) => StackConfig::load(path)?,
        None => StackConfig::default(),
    };
    if let Some(region) = &cli.region {
        config = config.with_region(region);
    }
    if let Some(account) = &cli.account {
        config = config.with_account(account);
    }
    Ok(config)
}

fn build(cli: &Cli) -> Result<ResourceGraph> {
    let config = load_config(cli)?;
    build_stack(&cli.stack_id, &config)
        .with_context(|| format!("Stack '{}' is not valid", cli.stack_id))
}

fn synth(graph: &ResourceGraph, out: Option<&Path>, format: Format) -> Result<()> {
    let plan = Plan::from_graph(graph);
    if let Some(out) = out {
        let path = plan.save(out)?;
        println!("{}", path.display());
        return Ok(());
    }
    let rendered = match format {
        Format::Json => plan.to_json().context("Failed to render plan as JSON")?,
        Format::Yaml => plan.to_yaml().context("Failed to render plan as YAML")?,
    };
    println!("{rendered}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let graph = build(&cli)?;

    match &cli.command {
        Commands::Synth { out, format } => synth(&graph, out.as_deref(), *format)?,
        Commands::Validate => {
            info!(stack = graph.stack_id(), "Declaration is valid");
            println!(
                "✅ {}: {} resources, no structural errors",
                graph.stack_id(),
                graph.resources().len()
            );
        }
        Commands::Order => {
            for (step, id) in graph.apply_order().iter().enumerate() {
                let kind = graph.get(id).map(|r| r.kind().to_string()).unwrap_or_default();
                println!("{:>2}. {id} ({kind})", step + 1);
            }
        }
        Commands::Diff { against } => {
            let old = Plan::load(against)?;
            let diff = PlanDiff::between(&old, &Plan::from_graph(&graph));
            print!("{diff}");
        }
    }

    Ok(())
}
