use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use oplog_connector::{render_tree, replay_lines, ViewConfig};
use oplog_hierarchy::{TreeBuilder, TreeMode};
use oplog_state::FlowAggregator;

/// Print the operation history recorded in a log of operation events.
#[derive(Parser, Debug)]
#[command(name = "oplog-view", version, about)]
struct Cli {
    /// JSON-lines file of operation events; stdin when omitted
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Group by day only, as in a single plan's view
    #[arg(long)]
    plan_view: bool,

    /// Expand every node
    #[arg(long)]
    all: bool,

    /// Emit the tree as JSON
    #[arg(long)]
    json: bool,

    /// Config file (default: <config dir>/oplog-view/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only auto-expand this instance's history
    #[arg(long)]
    instance: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = ViewConfig::load_or_default(cli.config.as_deref()).context("loading config")?;
    let mode = if cli.plan_view {
        TreeMode::PlanScoped
    } else {
        TreeMode::RepoScoped
    };

    let reader: Box<dyn BufRead> = match &cli.events {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let mut aggregator = FlowAggregator::default();
    replay_lines(&mut aggregator, reader).context("reading events")?;

    let mut options = config.tree_options(mode);
    if cli.instance.is_some() {
        options.expand_instance = cli.instance;
    }
    let tree = TreeBuilder::new(mode)
        .with_options(options)
        .build(&aggregator.flows());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else if tree.is_empty() {
        println!("No operations.");
    } else {
        for line in render_tree(&tree, cli.all) {
            println!("{line}");
        }
    }
    Ok(())
}
